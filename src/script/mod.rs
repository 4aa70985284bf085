//! NWScript program model.
//!
//! This module holds everything the decompiler consumes: decoded instructions, the program
//! that orders them, and the routine table that describes engine calls. It also provides two
//! ways of producing programs without an NCS decoder: the [`PcodeReader`] for textual listings
//! and the [`ProgramAssembler`] for building bytecode in code.
//!
//! # Key Components
//!
//! - [`Instruction`] / [`InstructionType`] / [`Operand`] - Decoded instructions
//! - [`ScriptProgram`] - Offset-indexed instruction sequence
//! - [`Routines`] / [`RoutineTable`] / [`RoutineDecl`] - Engine routine signatures
//! - [`VariableType`] - Value types of the virtual machine
//! - [`PcodeReader`] - Pcode listing parser
//! - [`ProgramAssembler`] - Fluent bytecode builder

mod assembler;
mod instruction;
mod pcode;
mod program;
mod routines;
mod types;

pub use assembler::ProgramAssembler;
pub use instruction::{Instruction, InstructionFlags, InstructionType, Operand};
pub use pcode::PcodeReader;
pub use program::ScriptProgram;
pub use routines::{RoutineDecl, RoutineTable, Routines};
pub use types::VariableType;

/// Offset of the first instruction in every compiled script.
///
/// NCS files start with the 8-byte `NCS V1.0` signature followed by a 5-byte record holding the
/// program size, so code begins at byte 13.
pub const PROGRAM_START: u32 = 13;
