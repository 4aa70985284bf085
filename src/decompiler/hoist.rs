//! Declaration hoisting.
//!
//! The block decompiler emits every new variable as a standalone `Parameter` statement,
//! usually followed immediately by the assignment that initializes it:
//!
//! ```text
//! int e4;
//! e4 = 5;
//! ```
//!
//! This pass folds each such pair into the assignment by setting its `declare_left` flag and
//! dropping the standalone declaration, which printers render as `int e4 = 5;`.

use crate::decompiler::{Expression, ExpressionKind, ExprId};

/// Merges adjacent `(Parameter p, Assign p := ...)` statement pairs in place.
///
/// # Arguments
///
/// * `expressions` - The expression arena the statements point into
/// * `statements` - Statements of one block
///
/// # Returns
///
/// The number of declarations merged.
pub(crate) fn hoist_declarations(expressions: &mut [Expression], statements: &mut Vec<ExprId>) -> usize {
    let mut merged = 0;
    let mut i = 0;
    while i + 1 < statements.len() {
        let param = statements[i];
        let assign = statements[i + 1];

        let is_param = matches!(
            expressions.get(param.index()).map(|e| &e.kind),
            Some(ExpressionKind::Parameter(_))
        );
        let assigns_param = expressions
            .get(assign.index())
            .is_some_and(|e| e.is_assignment_to(param));

        if !is_param || !assigns_param {
            i += 1;
            continue;
        }

        if let Some(ExpressionKind::Binary { declare_left, .. }) =
            expressions.get_mut(assign.index()).map(|e| &mut e.kind)
        {
            *declare_left = true;
        }
        statements.remove(i);
        merged += 1;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decompiler::{BinaryOp, ConstantValue, ParameterExpression},
        script::VariableType,
    };

    fn arena() -> Vec<Expression> {
        vec![
            // e0: int param, e1: const, e2: e0 = e1, e3: float param, e4: e0 = e1 again
            Expression::new(13, ExpressionKind::Parameter(ParameterExpression::local(VariableType::Int))),
            Expression::new(13, ExpressionKind::Constant(ConstantValue::Int(5))),
            Expression::new(
                13,
                ExpressionKind::Binary {
                    op: BinaryOp::Assign,
                    left: ExprId::new(0),
                    right: ExprId::new(1),
                    declare_left: false,
                },
            ),
            Expression::new(19, ExpressionKind::Parameter(ParameterExpression::local(VariableType::Float))),
            Expression::new(
                21,
                ExpressionKind::Binary {
                    op: BinaryOp::Assign,
                    left: ExprId::new(0),
                    right: ExprId::new(1),
                    declare_left: false,
                },
            ),
        ]
    }

    #[test]
    fn merges_declaration_with_initializer() {
        let mut expressions = arena();
        let mut statements = vec![ExprId::new(0), ExprId::new(2)];

        assert_eq!(hoist_declarations(&mut expressions, &mut statements), 1);
        assert_eq!(statements, vec![ExprId::new(2)]);
        assert!(matches!(
            expressions[2].kind,
            ExpressionKind::Binary {
                declare_left: true,
                ..
            }
        ));
    }

    #[test]
    fn leaves_unrelated_pairs_alone() {
        let mut expressions = arena();
        // float param followed by an assignment to the int param
        let mut statements = vec![ExprId::new(3), ExprId::new(4), ExprId::new(0)];

        assert_eq!(hoist_declarations(&mut expressions, &mut statements), 0);
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn handles_trivial_blocks() {
        let mut expressions = arena();
        let mut empty = Vec::new();
        assert_eq!(hoist_declarations(&mut expressions, &mut empty), 0);

        let mut single = vec![ExprId::new(0)];
        assert_eq!(hoist_declarations(&mut expressions, &mut single), 0);
        assert_eq!(single.len(), 1);
    }
}
