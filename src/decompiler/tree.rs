//! The decompiled expression tree of a whole program.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    decompiler::{
        builder::BlockDecompiler, BlockExpression, DecompilationContext, DecompilerConfig, ExprId,
        Expression, ExpressionKind, Function, FunctionId, Locality, ParameterExpression,
    },
    script::{Routines, ScriptProgram},
    Result,
};

/// Name of the synthetic function at the entry offset.
pub const ENTRY_FUNCTION_NAME: &str = "_start";

/// A program decompiled into functions over one expression arena.
///
/// Functions are ordered by descending offset with the entry function `_start` last, which
/// places callees before their callers in a typical compiled script. Every expression handle
/// reachable from a function block resolves in [`ExpressionTree::expression`].
///
/// # Examples
///
/// ```rust
/// use ncsdecomp::prelude::*;
///
/// let mut asm = ProgramAssembler::new();
/// asm.consti(5).retn();
/// let program = asm.finish("five")?;
///
/// let tree = ExpressionTree::from_program(&program, &RoutineTable::new())?;
/// assert_eq!(tree.entry().name(), "_start");
/// assert_eq!(tree.entry().return_type(), VariableType::Int);
/// # Ok::<(), ncsdecomp::Error>(())
/// ```
#[derive(Debug)]
pub struct ExpressionTree {
    expressions: Vec<Expression>,
    functions: Vec<Function>,
    offsets: BTreeMap<u32, FunctionId>,
    order: Vec<FunctionId>,
    globals: BTreeSet<ExprId>,
    entry: FunctionId,
}

impl ExpressionTree {
    /// Decompiles `program` with the default [`DecompilerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error only for non-recoverable failures; malformed blocks decompile to
    /// empty blocks and are logged.
    pub fn from_program(program: &ScriptProgram, routines: &dyn Routines) -> Result<Self> {
        Self::from_program_with_config(program, routines, &DecompilerConfig::default())
    }

    /// Decompiles `program`.
    ///
    /// # Arguments
    ///
    /// * `program` - The instructions to decompile
    /// * `routines` - Signatures of the engine routines called through `ACTION`
    /// * `config` - Decompiler settings
    ///
    /// # Errors
    ///
    /// Returns an error only for non-recoverable failures; malformed blocks decompile to
    /// empty blocks and are logged.
    pub fn from_program_with_config(
        program: &ScriptProgram,
        routines: &dyn Routines,
        config: &DecompilerConfig,
    ) -> Result<Self> {
        debug!("Decompiling {} ({} instructions)", program.name(), program.instructions().len());

        let mut decompiler = BlockDecompiler::new(program, routines, config);
        decompiler.register_labels();

        let entry = decompiler.add_function(config.entry_offset);
        if let Some(function) = decompiler.function_mut(entry) {
            function.set_name(ENTRY_FUNCTION_NAME);
        }

        let signature = decompiler.push_signature();
        let mut ctx = DecompilationContext::new(entry, signature);
        let block = decompiler.decompile_safely(config.entry_offset, &mut ctx)?;
        if config.drain_entry_branches {
            decompiler.drain_branches(signature, block)?;
        }
        if let Some(function) = decompiler.function_mut(entry) {
            function.set_block(block);
        }

        let (expressions, functions, offsets) = decompiler.finish();
        let globals = expressions
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.as_parameter()
                    .is_some_and(|p| p.locality == Locality::Global)
            })
            .map(|(i, _)| ExprId::new(i))
            .collect();
        let order = offsets
            .values()
            .rev()
            .copied()
            .filter(|&id| id != entry)
            .chain(std::iter::once(entry))
            .collect();

        debug!(
            "Decompiled {} into {} function(s), {} expression(s)",
            program.name(),
            functions.len(),
            expressions.len()
        );

        Ok(Self {
            expressions,
            functions,
            offsets,
            order,
            globals,
            entry,
        })
    }

    /// Functions in output order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.functions.get(id.index()))
    }

    /// Function handles in output order.
    #[must_use]
    pub fn function_ids(&self) -> &[FunctionId] {
        &self.order
    }

    /// Number of functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Resolves a function handle.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    /// The function starting at `offset`.
    #[must_use]
    pub fn function_at(&self, offset: u32) -> Option<&Function> {
        self.offsets.get(&offset).and_then(|&id| self.function(id))
    }

    /// The synthetic entry function `_start`.
    #[must_use]
    pub fn entry(&self) -> &Function {
        &self.functions[self.entry.index()]
    }

    /// Handle of the entry function.
    #[must_use]
    pub fn entry_id(&self) -> FunctionId {
        self.entry
    }

    /// Resolves an expression handle.
    #[must_use]
    pub fn expression(&self, id: ExprId) -> Option<&Expression> {
        self.expressions.get(id.index())
    }

    /// The whole expression arena, in allocation order.
    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    /// Resolves a parameter handle.
    #[must_use]
    pub fn parameter(&self, id: ExprId) -> Option<&ParameterExpression> {
        self.expression(id).and_then(Expression::as_parameter)
    }

    /// Resolves a block handle.
    #[must_use]
    pub fn block(&self, id: ExprId) -> Option<&BlockExpression> {
        self.expression(id).and_then(Expression::as_block)
    }

    /// Top-level statements of `function`, empty if it has no body.
    #[must_use]
    pub fn statements(&self, function: &Function) -> &[ExprId] {
        function
            .block()
            .and_then(|block| self.block(block))
            .map_or(&[][..], |block| block.expressions.as_slice())
    }

    /// Parameters marked global by `SAVEBP`.
    #[must_use]
    pub fn globals(&self) -> &BTreeSet<ExprId> {
        &self.globals
    }

    /// Counts the expressions of each kind, keyed by [`Expression::kind_name`].
    #[must_use]
    pub fn kind_histogram(&self) -> BTreeMap<&'static str, usize> {
        let mut histogram = BTreeMap::new();
        for expression in &self.expressions {
            *histogram.entry(expression.kind_name()).or_insert(0) += 1;
        }
        histogram
    }

    /// Whether any statement of `function`'s root block is a `Call` to `callee`.
    #[must_use]
    pub fn calls(&self, function: &Function, callee: FunctionId) -> bool {
        self.statements(function).iter().any(|&id| {
            matches!(
                self.expression(id).map(|e| &e.kind),
                Some(ExpressionKind::Call { function, .. }) if *function == callee
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ProgramAssembler, RoutineTable, VariableType};

    #[test]
    fn empty_program_has_only_entry() -> Result<()> {
        let program = ScriptProgram::new("empty");
        let tree = ExpressionTree::from_program(&program, &RoutineTable::new())?;

        assert_eq!(tree.function_count(), 1);
        assert_eq!(tree.entry().name(), ENTRY_FUNCTION_NAME);
        assert_eq!(tree.entry().return_type(), VariableType::Void);
        assert!(tree.statements(tree.entry()).is_empty());
        assert!(tree.globals().is_empty());
        Ok(())
    }

    #[test]
    fn functions_ordered_descending_with_entry_last() -> Result<()> {
        let mut asm = ProgramAssembler::new();
        asm.jsr("low")
            .jsr("high")
            .retn()
            .label("low")
            .retn()
            .label("high")
            .retn();
        let program = asm.finish("order")?;
        let config = DecompilerConfig::default().with_infer_function_names(false);
        let tree =
            ExpressionTree::from_program_with_config(&program, &RoutineTable::new(), &config)?;

        // jsr@13, jsr@19, retn@25, low@27, high@29
        let offsets: Vec<u32> = tree.functions().map(Function::offset).collect();
        assert_eq!(offsets, vec![29, 27, 13]);
        assert_eq!(tree.function_at(27).map(Function::name), Some(""));
        assert!(tree.calls(tree.entry(), tree.function_ids()[1]));
        Ok(())
    }
}
