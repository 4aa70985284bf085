//! Expression tree nodes.
//!
//! All expressions of one decompilation live in a single arena owned by the resulting
//! [`ExpressionTree`](crate::decompiler::ExpressionTree) and refer to each other through
//! [`ExprId`] handles. Nodes are never copied or removed once allocated: later instructions
//! rewrite *which* handle a stack slot holds, and the only in-place mutations are the one-way
//! locality upgrade of a parameter and the declaration marker on assignments.

use std::fmt;

use strum::Display;

use crate::{decompiler::FunctionId, script::VariableType};

/// Handle to an expression in the tree's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

impl ExprId {
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

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Where a parameter's storage lives relative to the function that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum Locality {
    /// Block-scoped value owned by the current function.
    #[default]
    Local,
    /// Program-wide variable below the `SAVEBP` boundary.
    Global,
    /// Value read from the caller's frame.
    Input,
    /// Value written back into the caller's frame.
    Output,
}

/// A typed storage slot: a local, global, input or output variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterExpression {
    /// Value type
    pub variable_type: VariableType,
    /// Storage class
    pub locality: Locality,
    /// For inputs and outputs, the frame index relative to the stack size on function entry.
    /// Always negative for arguments passed by the caller.
    pub stack_offset: i32,
    /// Name suffix distinguishing related slots (`x`/`y`/`z` vector components, copy index)
    pub suffix: String,
}

impl ParameterExpression {
    /// A fresh local of the given type.
    #[must_use]
    pub fn local(variable_type: VariableType) -> Self {
        Self {
            variable_type,
            locality: Locality::Local,
            stack_offset: 0,
            suffix: String::new(),
        }
    }

    /// A reference to a caller frame at `stack_offset`.
    #[must_use]
    pub fn argument(variable_type: VariableType, locality: Locality, stack_offset: i32) -> Self {
        Self {
            variable_type,
            locality,
            stack_offset,
            suffix: String::new(),
        }
    }

    /// Sets the name suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Promotes a local to a global.
    ///
    /// Locality only ever moves away from [`Locality::Local`], so parameters that are already
    /// global, input or output are left alone.
    ///
    /// # Returns
    ///
    /// `true` if the locality changed.
    pub fn mark_global(&mut self) -> bool {
        if self.locality == Locality::Local {
            self.locality = Locality::Global;
            true
        } else {
            false
        }
    }
}

/// Immediate value of a `CONSTx` instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// Integer constant
    Int(i32),
    /// Float constant
    Float(f32),
    /// String constant
    String(String),
    /// Object id constant
    Object(u32),
}

impl ConstantValue {
    /// Type of the constant.
    #[must_use]
    pub fn variable_type(&self) -> VariableType {
        match self {
            ConstantValue::Int(_) => VariableType::Int,
            ConstantValue::Float(_) => VariableType::Float,
            ConstantValue::String(_) => VariableType::String,
            ConstantValue::Object(_) => VariableType::Object,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(value) => write!(f, "{value}"),
            ConstantValue::Float(value) => write!(f, "{value:?}"),
            ConstantValue::String(value) => write!(f, "\"{value}\""),
            ConstantValue::Object(id) => write!(f, "object({id})"),
        }
    }
}

/// Single-operand operators.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOp {
    Negate,
    OnesComplement,
    Not,
    Increment,
    Decrement,
}

/// Two-operand operators, including assignment.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LogicalAnd,
    LogicalOr,
    BitwiseOr,
    BitwiseExclusiveOr,
    BitwiseAnd,
    Equal,
    NotEqual,
    GreaterThanOrEqual,
    GreaterThan,
    LessThan,
    LessThanOrEqual,
    LeftShift,
    RightShift,
    RightShiftUnsigned,
}

/// An ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockExpression {
    /// Statements in execution order
    pub expressions: Vec<ExprId>,
}

impl BlockExpression {
    /// Appends a statement.
    pub fn append(&mut self, expression: ExprId) {
        self.expressions.push(expression);
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    /// Returns `true` if the block has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// Iterates the statements in order.
    pub fn iter(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.expressions.iter().copied()
    }
}

/// The variant payload of an [`Expression`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// Jump target marker.
    Label,
    /// Unconditional jump to a `Label`.
    Goto {
        /// The target label
        label: ExprId,
    },
    /// Function return, with the returned parameter for the entry function.
    Return {
        /// Returned value, if any
        value: Option<ExprId>,
    },
    /// Variable slot.
    Parameter(ParameterExpression),
    /// Literal.
    Constant(ConstantValue),
    /// Unary operation.
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: ExprId,
    },
    /// Binary operation or assignment.
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand, the destination of an assignment
        left: ExprId,
        /// Right operand
        right: ExprId,
        /// Set on assignments whose left parameter is declared by this statement
        declare_left: bool,
    },
    /// Vector built from three float parameters.
    Vector {
        /// The `x`, `y` and `z` components
        components: [ExprId; 3],
    },
    /// Component access on a vector parameter.
    VectorIndex {
        /// The vector
        vector: ExprId,
        /// 0, 1 or 2
        index: u8,
    },
    /// Engine routine call.
    Action {
        /// Routine index
        routine: u16,
        /// Arguments in declaration order
        arguments: Vec<ExprId>,
    },
    /// Subroutine call.
    Call {
        /// The called function
        function: FunctionId,
        /// Input arguments followed by output arguments
        arguments: Vec<ExprId>,
    },
    /// Statement list.
    Block(BlockExpression),
    /// Conditional branch.
    Conditional {
        /// Test expression
        test: ExprId,
        /// Block executed when the test holds
        if_true: ExprId,
        /// Block executed otherwise. Decompiled conditionals leave this empty because the
        /// fall-through path continues in the enclosing block.
        if_false: Option<ExprId>,
    },
}

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Byte offset of the instruction that produced the node
    pub offset: u32,
    /// Node payload
    pub kind: ExpressionKind,
}

impl Expression {
    /// Creates a node.
    #[must_use]
    pub fn new(offset: u32, kind: ExpressionKind) -> Self {
        Self { offset, kind }
    }

    /// The parameter payload, if this is a parameter.
    #[must_use]
    pub fn as_parameter(&self) -> Option<&ParameterExpression> {
        match &self.kind {
            ExpressionKind::Parameter(param) => Some(param),
            _ => None,
        }
    }

    /// Mutable parameter payload, if this is a parameter.
    pub fn as_parameter_mut(&mut self) -> Option<&mut ParameterExpression> {
        match &mut self.kind {
            ExpressionKind::Parameter(param) => Some(param),
            _ => None,
        }
    }

    /// The block payload, if this is a block.
    #[must_use]
    pub fn as_block(&self) -> Option<&BlockExpression> {
        match &self.kind {
            ExpressionKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Returns `true` for an assignment whose destination is `param`.
    #[must_use]
    pub fn is_assignment_to(&self, param: ExprId) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Binary {
                op: BinaryOp::Assign,
                left,
                ..
            } if left == param
        )
    }

    /// Short name of the node kind, for summaries and logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExpressionKind::Label => "label",
            ExpressionKind::Goto { .. } => "goto",
            ExpressionKind::Return { .. } => "return",
            ExpressionKind::Parameter(_) => "parameter",
            ExpressionKind::Constant(_) => "constant",
            ExpressionKind::Unary { .. } => "unary",
            ExpressionKind::Binary {
                op: BinaryOp::Assign,
                ..
            } => "assign",
            ExpressionKind::Binary { .. } => "binary",
            ExpressionKind::Vector { .. } => "vector",
            ExpressionKind::VectorIndex { .. } => "vector-index",
            ExpressionKind::Action { .. } => "action",
            ExpressionKind::Call { .. } => "call",
            ExpressionKind::Block(_) => "block",
            ExpressionKind::Conditional { .. } => "conditional",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locality_upgrade_is_one_way() {
        let mut param = ParameterExpression::local(VariableType::Int);
        assert!(param.mark_global());
        assert_eq!(param.locality, Locality::Global);
        assert!(!param.mark_global());

        let mut input = ParameterExpression::argument(VariableType::Int, Locality::Input, -1);
        assert!(!input.mark_global());
        assert_eq!(input.locality, Locality::Input);
    }

    #[test]
    fn assignment_detection() {
        let param = ExprId::new(0);
        let assign = Expression::new(
            13,
            ExpressionKind::Binary {
                op: BinaryOp::Assign,
                left: param,
                right: ExprId::new(1),
                declare_left: false,
            },
        );
        assert!(assign.is_assignment_to(param));
        assert!(!assign.is_assignment_to(ExprId::new(1)));
        assert_eq!(assign.kind_name(), "assign");
        assert_eq!(format!("{param:?}"), "e0");
    }

    #[test]
    fn constant_types() {
        assert_eq!(ConstantValue::Float(1.0).variable_type(), VariableType::Float);
        assert_eq!(
            ConstantValue::String("a".into()).variable_type(),
            VariableType::String
        );
        assert_eq!(ConstantValue::Object(7).to_string(), "object(7)");
    }
}
