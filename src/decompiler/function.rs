use std::fmt;

use crate::{decompiler::ExprId, script::VariableType};

/// Handle to a function in the tree's function arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(usize);

impl FunctionId {
    /// Creates a handle from an arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A typed argument slot of a subroutine, addressed relative to the caller's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionArgument {
    /// Value type of the slot
    pub variable_type: VariableType,
    /// Frame index relative to the caller's stack size at the call
    pub stack_offset: i32,
}

impl FunctionArgument {
    /// Creates an argument.
    #[must_use]
    pub fn new(variable_type: VariableType, stack_offset: i32) -> Self {
        Self {
            variable_type,
            stack_offset,
        }
    }
}

/// A subroutine recovered from the bytecode.
///
/// Functions are created when a `JSR` first reaches their entry offset. Their signature is
/// inferred from the caller frames they read (inputs) and write (outputs), and their return
/// type from a value left on the stack by `RETN` in the entry function.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    offset: u32,
    inputs: Vec<FunctionArgument>,
    outputs: Vec<FunctionArgument>,
    return_type: VariableType,
    block: Option<ExprId>,
}

impl Function {
    /// Creates an unnamed function with no body yet.
    #[must_use]
    pub fn new(offset: u32) -> Self {
        Self {
            name: String::new(),
            offset,
            inputs: Vec::new(),
            outputs: Vec::new(),
            return_type: VariableType::Void,
            block: None,
        }
    }

    /// Inferred name, empty if no naming rule applied.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Caller frames read by the function, ordered by stack offset.
    #[must_use]
    pub fn inputs(&self) -> &[FunctionArgument] {
        &self.inputs
    }

    /// Caller frames written by the function, ordered by stack offset.
    #[must_use]
    pub fn outputs(&self) -> &[FunctionArgument] {
        &self.outputs
    }

    /// Inferred return type.
    #[must_use]
    pub fn return_type(&self) -> VariableType {
        self.return_type
    }

    /// Root block. `None` only while the body is still being decompiled.
    #[must_use]
    pub fn block(&self) -> Option<ExprId> {
        self.block
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_return_type(&mut self, return_type: VariableType) {
        self.return_type = return_type;
    }

    pub(crate) fn set_block(&mut self, block: ExprId) {
        self.block = Some(block);
    }

    pub(crate) fn set_signature(
        &mut self,
        inputs: Vec<FunctionArgument>,
        outputs: Vec<FunctionArgument>,
    ) {
        self.inputs = inputs;
        self.outputs = outputs;
    }
}
