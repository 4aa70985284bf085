// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ncsdecomp
//!
//! A decompiler for NWScript bytecode (NCS), the compiled script format of the Aurora and
//! Odyssey engines. `ncsdecomp` reconstructs an expression tree from a decoded instruction
//! stream: subroutines with inferred signatures, typed local and global variables, engine
//! routine calls, conditional jumps and deferred actions.
//!
//! ## Features
//!
//! - **🧮 Stack simulation** - Symbolic replay of the 4-byte-frame stack machine
//! - **🧩 Signature inference** - Subroutine inputs and outputs recovered from frame access
//! - **🌐 Globals detection** - Variables below the `SAVEBP` boundary marked program-wide
//! - **🛡️ Fault tolerant** - A malformed block degrades to an empty block, never a panic
//! - **📝 Pcode input** - Parse textual pcode listings or assemble programs in code
//!
//! ## Quick Start
//!
//! ```rust
//! use ncsdecomp::prelude::*;
//!
//! let mut routines = RoutineTable::new();
//! routines.add(RoutineDecl::new("PrintString", VariableType::Void, vec![VariableType::String]));
//!
//! let program = PcodeReader::parse(
//!     "hello.ncs",
//!     "CONSTS \"Hello\"\nACTION PrintString, 1\nRETN\n",
//!     &routines,
//! )?;
//!
//! let tree = ExpressionTree::from_program(&program, &routines)?;
//! for function in tree.functions() {
//!     println!("{} @ {:08x}: {} statements", function.name(), function.offset(), tree.statements(function).len());
//! }
//! # Ok::<(), ncsdecomp::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`script`] - Instructions, programs, routine tables, pcode reader and assembler
//! - [`decompiler`] - Stack simulation and expression tree construction
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Decompilation itself only fails for
//! internal errors; malformed bytecode is logged through the [`log`] facade and yields empty
//! blocks:
//!
//! ```rust,no_run
//! use ncsdecomp::{Error, script::{PcodeReader, RoutineTable}};
//!
//! match PcodeReader::from_file("k_act_com41.ncs.pcode".as_ref(), &RoutineTable::new()) {
//!     Ok(program) => println!("{} bytes of code", program.length()),
//!     Err(Error::UndefinedLabel(label)) => println!("Missing label: {label}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use ncsdecomp::prelude::*;
///
/// let program = ScriptProgram::new("empty");
/// let tree = ExpressionTree::from_program(&program, &RoutineTable::new())?;
/// assert_eq!(tree.function_count(), 1);
/// # Ok::<(), ncsdecomp::Error>(())
/// ```
pub mod prelude;

/// NWScript program model: instructions, programs and engine routines.
///
/// # Key Types
///
/// - [`script::Instruction`] - A decoded instruction with its offset and operand
/// - [`script::ScriptProgram`] - Instructions indexed by offset
/// - [`script::Routines`] - Lookup of engine routine signatures by index
///
/// # Examples
///
/// ```rust
/// use ncsdecomp::script::{InstructionType, ProgramAssembler};
///
/// let mut asm = ProgramAssembler::new();
/// asm.consti(1).jz("end").consti(2).label("end").retn();
/// let program = asm.finish("jump")?;
///
/// let jz = program.get_instruction(19).ok_or(ncsdecomp::Error::InvalidArgument("jz".into()))?;
/// assert_eq!(jz.ins_type, InstructionType::Jz);
/// assert_eq!(jz.jump_target(), Some(31));
/// # Ok::<(), ncsdecomp::Error>(())
/// ```
pub mod script;

/// Stack-simulating decompiler producing an [`decompiler::ExpressionTree`].
pub mod decompiler;

/// `ncsdecomp` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ncsdecomp` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use decompiler::{DecompilerConfig, ExpressionTree};
pub use script::{PcodeReader, ProgramAssembler, ScriptProgram};
