//! NWScript bytecode decompiler.
//!
//! This module turns a [`ScriptProgram`](crate::script::ScriptProgram) into an
//! [`ExpressionTree`]: a set of [`Function`]s whose bodies are blocks of expression statements,
//! all stored in one arena and linked by [`ExprId`] handles.
//!
//! # Architecture
//!
//! Decompilation is a symbolic replay of the stack machine. Every value pushed by the bytecode
//! becomes a [`ParameterExpression`] occupying a slot of a [`SimulatedStack`]; instructions
//! that compute values emit an assignment to a fresh parameter, and instructions that move
//! values between slots emit assignments between existing parameters. The replay state of one
//! control-flow path is a [`DecompilationContext`], which is forked at every branch.
//!
//! - Jumps queue their target on the current subroutine's work-list and are decompiled after
//!   the subroutine body, lowest offset first, each target exactly once.
//! - Calls recurse into the callee on first sight and infer its inputs and outputs from the
//!   caller frames it touches.
//! - A failure inside one block leaves an empty block in its place.
//!
//! # Key Components
//!
//! - [`ExpressionTree`] - Entry point and result of a decompilation
//! - [`Expression`] / [`ExpressionKind`] - Arena nodes
//! - [`Function`] - Recovered subroutine with signature and body
//! - [`DecompilationContext`] / [`SimulatedStack`] - Per-path replay state
//! - [`DecompilerConfig`] - Tunables
//!
//! # Examples
//!
//! ```rust
//! use ncsdecomp::prelude::*;
//!
//! let mut asm = ProgramAssembler::new();
//! asm.rsadd(VariableType::Int)
//!     .jsr("main")
//!     .retn()
//!     .label("main")
//!     .consti(1)
//!     .cpdownsp(-8, 4)
//!     .movsp(-4)
//!     .retn();
//! let program = asm.finish("sc_example")?;
//!
//! let tree = ExpressionTree::from_program(&program, &RoutineTable::new())?;
//! let main = tree.functions().next().ok_or(Error::InvalidArgument("no main".into()))?;
//! assert_eq!(main.name(), "StartingConditional");
//! assert_eq!(main.outputs().len(), 1);
//! # Ok::<(), ncsdecomp::Error>(())
//! ```

mod builder;
mod config;
mod context;
mod expression;
mod function;
mod hoist;
mod stack;
mod tree;

pub use config::DecompilerConfig;
pub use context::{CallFrame, DecompilationContext};
pub use expression::{
    BinaryOp, BlockExpression, ConstantValue, ExprId, Expression, ExpressionKind, Locality,
    ParameterExpression, UnaryOp,
};
pub use function::{Function, FunctionArgument, FunctionId};
pub use stack::{SimulatedStack, StackFrame};
pub use tree::{ExpressionTree, ENTRY_FUNCTION_NAME};
