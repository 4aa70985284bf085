//! # ncsdecomp Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ncsdecomp library. Import this module to get quick access to everything needed
//! to load a program and decompile it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ncsdecomp operations
pub use crate::Error;

/// The result type used throughout ncsdecomp
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Decoded instructions and their classification
pub use crate::script::{Instruction, InstructionFlags, InstructionType, Operand};

/// Offset-indexed instruction sequence and the offset of its first instruction
pub use crate::script::{ScriptProgram, PROGRAM_START};

/// Value types of the virtual machine
pub use crate::script::VariableType;

/// Engine routine signatures
pub use crate::script::{RoutineDecl, RoutineTable, Routines};

// ================================================================================================
// Program Sources
// ================================================================================================

/// Textual pcode listing parser
pub use crate::script::PcodeReader;

/// Fluent bytecode builder
pub use crate::script::ProgramAssembler;

// ================================================================================================
// Decompiler
// ================================================================================================

/// Main entry point and its configuration
pub use crate::decompiler::{DecompilerConfig, ExpressionTree};

/// Expression arena nodes
pub use crate::decompiler::{
    BinaryOp, BlockExpression, ConstantValue, ExprId, Expression, ExpressionKind, Locality,
    ParameterExpression, UnaryOp,
};

/// Recovered subroutines
pub use crate::decompiler::{Function, FunctionArgument, FunctionId};
