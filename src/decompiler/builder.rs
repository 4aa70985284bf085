//! Block decompiler and instruction dispatcher.
//!
//! [`BlockDecompiler`] walks instructions from a start offset, replaying their stack effects on
//! a [`DecompilationContext`] and emitting expression nodes into a shared arena, until a `RETN`,
//! an unconditional `JMP` or the end of the program terminates the block.
//!
//! # Control flow
//!
//! Jumps do not recurse. A jump target is queued, with a fork of the current context, on the
//! work-list of the subroutine being decompiled and processed after that subroutine's body;
//! the resulting statements are appended to the subroutine's root block. Subroutine calls
//! (`JSR`) recurse immediately the first time a target is reached, so a function's signature
//! is known by the time its first call expression is built.
//!
//! # Recovery
//!
//! [`BlockDecompiler::decompile_safely`] turns a recoverable failure inside one block (see
//! [`Error::is_recoverable`]) into an empty block and logs it, so one malformed path degrades
//! the output instead of aborting the whole program.

use std::collections::{BTreeMap, HashMap};

use log::{debug, error, trace};

use crate::{
    decompiler::{
        context::SignatureFrame, hoist::hoist_declarations, BinaryOp, BlockExpression,
        ConstantValue, DecompilationContext, DecompilerConfig, ExprId, Expression, ExpressionKind,
        Function, FunctionArgument, FunctionId, Locality, ParameterExpression, StackFrame, UnaryOp,
    },
    script::{Instruction, InstructionFlags, InstructionType, Operand, Routines, ScriptProgram, VariableType},
    Error, Result,
};

/// Operand layout of the vector arithmetic instructions.
#[derive(Clone, Copy)]
enum VectorOperands {
    /// `ADDVV`, `SUBVV`
    VectorVector,
    /// `MULVF`, `DIVVF`
    VectorFloat,
    /// `MULFV`, `DIVFV`
    FloatVector,
}

/// Shared state of one decompilation run.
///
/// Everything here is shared by all forks of the [`DecompilationContext`]: the expression
/// arena, the label table, the discovered functions and the stack of signature frames of the
/// subroutines currently being decompiled.
pub(crate) struct BlockDecompiler<'p> {
    program: &'p ScriptProgram,
    routines: &'p dyn Routines,
    config: &'p DecompilerConfig,
    expressions: Vec<Expression>,
    functions: Vec<Function>,
    function_offsets: BTreeMap<u32, FunctionId>,
    labels: HashMap<u32, ExprId>,
    signatures: Vec<SignatureFrame>,
}

impl<'p> BlockDecompiler<'p> {
    pub(crate) fn new(
        program: &'p ScriptProgram,
        routines: &'p dyn Routines,
        config: &'p DecompilerConfig,
    ) -> Self {
        Self {
            program,
            routines,
            config,
            expressions: Vec::new(),
            functions: Vec::new(),
            function_offsets: BTreeMap::new(),
            labels: HashMap::new(),
            signatures: Vec::new(),
        }
    }

    /// Allocates one `Label` per jump and `STORE_STATE` target.
    ///
    /// Must run before any block is decompiled: a forward jump's target block does not exist
    /// yet when the `Goto` referencing it is built.
    pub(crate) fn register_labels(&mut self) {
        let program = self.program;
        for ins in program.instructions() {
            if !ins.ins_type.has_label_target() {
                continue;
            }
            let Some(target) = ins.jump_target() else {
                continue;
            };
            if !self.labels.contains_key(&target) {
                let label = self.alloc(target, ExpressionKind::Label);
                self.labels.insert(target, label);
            }
        }
    }

    /// Registers a function at `offset`.
    pub(crate) fn add_function(&mut self, offset: u32) -> FunctionId {
        let id = FunctionId::new(self.functions.len());
        self.functions.push(Function::new(offset));
        self.function_offsets.insert(offset, id);
        id
    }

    pub(crate) fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.index())
    }

    /// Opens a signature frame for a subroutine and returns its index.
    pub(crate) fn push_signature(&mut self) -> usize {
        self.signatures.push(SignatureFrame::default());
        self.signatures.len() - 1
    }

    /// Consumes the decompiler, returning the expression arena, the function arena and the
    /// offset index of the functions.
    pub(crate) fn finish(self) -> (Vec<Expression>, Vec<Function>, BTreeMap<u32, FunctionId>) {
        (self.expressions, self.functions, self.function_offsets)
    }

    fn alloc(&mut self, offset: u32, kind: ExpressionKind) -> ExprId {
        let id = ExprId::new(self.expressions.len());
        self.expressions.push(Expression::new(offset, kind));
        id
    }

    /// Decompiles the block at `start`, substituting an empty block on recoverable failure.
    ///
    /// # Errors
    ///
    /// Only non-recoverable errors are returned.
    pub(crate) fn decompile_safely(
        &mut self,
        start: u32,
        ctx: &mut DecompilationContext,
    ) -> Result<ExprId> {
        match self.decompile(start, ctx) {
            Ok(block) => Ok(block),
            Err(e) if e.is_recoverable() => {
                error!("Block decompilation failed at {start:08x}: {e}");
                Ok(self.alloc(start, ExpressionKind::Block(BlockExpression::default())))
            }
            Err(e) => Err(e),
        }
    }

    /// Decompiles every branch queued on signature frame `signature`, lowest offset first,
    /// appending the statements of each to `block`. Branches queued while draining are
    /// processed as well.
    pub(crate) fn drain_branches(&mut self, signature: usize, block: ExprId) -> Result<()> {
        loop {
            let Some((offset, mut branch)) = self
                .signatures
                .get_mut(signature)
                .and_then(SignatureFrame::next_pending)
            else {
                break;
            };

            let branch_block = self.decompile_safely(offset, &mut branch)?;
            let statements = self
                .expressions
                .get(branch_block.index())
                .and_then(Expression::as_block)
                .map(|b| b.expressions.clone())
                .unwrap_or_default();
            if let Some(ExpressionKind::Block(target)) =
                self.expressions.get_mut(block.index()).map(|e| &mut e.kind)
            {
                target.expressions.extend(statements);
            }
        }
        Ok(())
    }

    fn decompile(&mut self, start: u32, ctx: &mut DecompilationContext) -> Result<ExprId> {
        debug!("Begin decompiling block at {start:08x}");

        if ctx.call_depth() > self.config.max_call_depth {
            return Err(Error::RecursionLimit(self.config.max_call_depth));
        }

        let program = self.program;
        let mut block = BlockExpression::default();
        let mut offset = start;
        while offset < program.length() {
            if let Some(&label) = self.labels.get(&offset) {
                block.append(label);
            }

            let ins = program
                .get_instruction(offset)
                .ok_or_else(|| validation_error!(offset, "No instruction at offset {:08x}", offset))?;
            if ins.next_offset <= offset {
                return Err(validation_error!(offset, "Instruction does not advance"));
            }
            trace!("Decompiling instruction {ins}");

            self.step(ins, ctx, &mut block)?;
            if ins.ins_type.flags().contains(InstructionFlags::TERMINATOR) {
                break;
            }
            offset = ins.next_offset;
        }

        if self.config.hoist_declarations {
            hoist_declarations(&mut self.expressions, &mut block.expressions);
        }

        debug!("End decompiling block at {start:08x}");
        Ok(self.alloc(start, ExpressionKind::Block(block)))
    }

    fn step(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        use InstructionType as T;

        match ins.ins_type {
            T::Nop | T::Nop2 | T::RestoreBp => {}
            T::Retn => self.retn(ins, ctx, block)?,
            T::Jmp => self.jump(ins, ctx, block)?,
            T::Jsr => self.call(ins, ctx, block)?,
            T::Jz | T::Jnz => self.conditional_jump(ins, ctx, block)?,
            T::RsAddI
            | T::RsAddF
            | T::RsAddS
            | T::RsAddO
            | T::RsAddEff
            | T::RsAddEvt
            | T::RsAddLoc
            | T::RsAddTal => {
                let param = self.alloc(
                    ins.offset,
                    ExpressionKind::Parameter(ParameterExpression::local(reserved_type(ins)?)),
                );
                block.append(param);
                ctx.push_local(param);
            }
            T::ConstI | T::ConstF | T::ConstS | T::ConstO => {
                let value = constant_value(ins)?;
                let variable_type = value.variable_type();
                let constant = self.alloc(ins.offset, ExpressionKind::Constant(value));
                let param =
                    self.define(ins.offset, ParameterExpression::local(variable_type), constant, block);
                ctx.push_local(param);
            }
            T::Action => self.action(ins, ctx, block)?,
            T::CpDownSp | T::CpDownBp => self.copy_down(ins, ctx, block)?,
            T::CpTopSp | T::CpTopBp => self.copy_top(ins, ctx, block)?,
            T::MovSp => {
                let stack_offset = match ins.operand {
                    Operand::StackOffset(stack_offset) => stack_offset,
                    _ => return Err(malformed_operand(ins)),
                };
                if stack_offset > 0 {
                    return Err(validation_error!(
                        ins.offset,
                        "Positive stack offsets are not supported: {}",
                        stack_offset
                    ));
                }
                let count = frame_count(stack_offset.unsigned_abs());
                ctx.stack.pop_n(count, ins.offset)?;
            }
            T::NegI | T::NegF | T::CompI | T::NotI => self.unary(ins, ctx, block)?,
            T::AddVV | T::SubVV => {
                self.vector_arithmetic(ins, ctx, block, VectorOperands::VectorVector)?;
            }
            T::MulVF | T::DivVF => {
                self.vector_arithmetic(ins, ctx, block, VectorOperands::VectorFloat)?;
            }
            T::MulFV | T::DivFV => {
                self.vector_arithmetic(ins, ctx, block, VectorOperands::FloatVector)?;
            }
            T::EqualTT | T::NEqualTT => self.tuple_comparison(ins, ctx, block)?,
            T::StoreState => self.store_state(ins, ctx)?,
            T::SaveBp => {
                ctx.num_globals = ctx.stack.len();
                for frame in ctx.stack.frames() {
                    if let Some(param) = self
                        .expressions
                        .get_mut(frame.param.index())
                        .and_then(Expression::as_parameter_mut)
                    {
                        param.mark_global();
                    }
                }
            }
            T::DecISp | T::IncISp | T::DecIBp | T::IncIBp => self.increment(ins, ctx, block)?,
            T::Destruct => self.destruct(ins, ctx)?,
            other => match binary_operator(other) {
                Some((op, result_type)) => self.binary(ins, ctx, block, op, result_type)?,
                None => {
                    return Err(Error::NotImplemented {
                        offset: ins.offset,
                        instruction: other.to_string(),
                    })
                }
            },
        }

        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Arena helpers
    // ---------------------------------------------------------------------------------------

    fn parameter(&self, id: ExprId, offset: u32) -> Result<&ParameterExpression> {
        self.expressions
            .get(id.index())
            .and_then(Expression::as_parameter)
            .ok_or_else(|| validation_error!(offset, "Stack slot {} does not hold a parameter", id))
    }

    fn parameter_type(&self, id: ExprId, offset: u32) -> Result<VariableType> {
        Ok(self.parameter(id, offset)?.variable_type)
    }

    fn assign(&mut self, offset: u32, left: ExprId, right: ExprId) -> ExprId {
        self.alloc(
            offset,
            ExpressionKind::Binary {
                op: BinaryOp::Assign,
                left,
                right,
                declare_left: false,
            },
        )
    }

    /// Emits `param; param = value;` and returns the parameter.
    fn define(
        &mut self,
        offset: u32,
        param: ParameterExpression,
        value: ExprId,
        block: &mut BlockExpression,
    ) -> ExprId {
        let param = self.alloc(offset, ExpressionKind::Parameter(param));
        block.append(param);
        let assign = self.assign(offset, param, value);
        block.append(assign);
        param
    }

    fn label(&self, target: u32, offset: u32) -> Result<ExprId> {
        self.labels
            .get(&target)
            .copied()
            .ok_or_else(|| validation_error!(offset, "No label at jump target {:08x}", target))
    }

    fn schedule(&mut self, target: u32, ctx: &DecompilationContext) {
        if let Some(signature) = self.signatures.get_mut(ctx.signature) {
            signature.schedule(target, ctx);
        }
    }

    /// Returns the parameter through which the innermost call accesses `frame`.
    ///
    /// Frames allocated by the current function and global frames are accessed directly.
    /// Anything else belongs to a caller and is reached through a fresh `Input` or `Output`
    /// parameter; the first access at each caller offset is recorded in the signature.
    fn access_frame(
        &mut self,
        offset: u32,
        ctx: &DecompilationContext,
        frame: StackFrame,
        index: usize,
        locality: Locality,
    ) -> Result<ExprId> {
        let call = ctx.top_call();
        let param = self.parameter(frame.param, offset)?;
        if frame.allocated_by == call.function || param.locality == Locality::Global {
            return Ok(frame.param);
        }
        let variable_type = param.variable_type;
        let stack_offset = relative_offset(index, call.stack_size_on_enter, offset)?;

        if let Some(signature) = self.signatures.get_mut(ctx.signature) {
            let recorded = match locality {
                Locality::Input => &mut signature.inputs,
                _ => &mut signature.outputs,
            };
            recorded.entry(stack_offset).or_insert(frame.param);
        }

        Ok(self.alloc(
            offset,
            ExpressionKind::Parameter(ParameterExpression::argument(
                variable_type,
                locality,
                stack_offset,
            )),
        ))
    }

    fn frame_at(ctx: &DecompilationContext, index: usize, offset: u32) -> Result<StackFrame> {
        ctx.stack.get(index).copied().ok_or_else(|| {
            validation_error!(
                offset,
                "Out of bounds stack access: {} (stack size {})",
                index,
                ctx.stack.len()
            )
        })
    }

    fn pop_vector(ctx: &mut DecompilationContext, offset: u32) -> Result<[ExprId; 3]> {
        match ctx.stack.pop_n(3, offset)?.as_slice() {
            [x, y, z] => Ok([x.param, y.param, z.param]),
            _ => Err(validation_error!(offset, "Stack underflow")),
        }
    }

    fn compose_vector(&mut self, offset: u32, components: [ExprId; 3]) -> Result<ExprId> {
        for component in components {
            if self.parameter_type(component, offset)? != VariableType::Float {
                return Err(validation_error!(offset, "Cannot compose a vector of non-floats"));
            }
        }
        Ok(self.alloc(offset, ExpressionKind::Vector { components }))
    }

    fn vector_component(
        &mut self,
        offset: u32,
        vector: ExprId,
        index: u8,
        suffix: &str,
        block: &mut BlockExpression,
    ) -> ExprId {
        let element = self.alloc(offset, ExpressionKind::VectorIndex { vector, index });
        self.define(
            offset,
            ParameterExpression::local(VariableType::Float).with_suffix(suffix),
            element,
            block,
        )
    }

    fn decompose_vector(
        &mut self,
        offset: u32,
        vector: ExprId,
        block: &mut BlockExpression,
    ) -> [ExprId; 3] {
        let x = self.vector_component(offset, vector, 0, "x", block);
        let y = self.vector_component(offset, vector, 1, "y", block);
        let z = self.vector_component(offset, vector, 2, "z", block);
        [x, y, z]
    }

    // ---------------------------------------------------------------------------------------
    // Control flow
    // ---------------------------------------------------------------------------------------

    fn retn(
        &mut self,
        ins: &Instruction,
        ctx: &DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let mut value = None;
        if ctx.call_depth() == 1 {
            if let Some(frame) = ctx.stack.top() {
                let return_type = self.parameter_type(frame.param, ins.offset)?;
                value = Some(frame.param);
                if let Some(function) = self.function_mut(ctx.top_call().function) {
                    function.set_return_type(return_type);
                }
            }
        }
        let ret = self.alloc(ins.offset, ExpressionKind::Return { value });
        block.append(ret);
        Ok(())
    }

    fn jump(
        &mut self,
        ins: &Instruction,
        ctx: &DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let target = jump_target(ins)?;
        let label = self.label(target, ins.offset)?;
        let goto = self.alloc(ins.offset, ExpressionKind::Goto { label });
        block.append(goto);
        self.schedule(target, ctx);
        Ok(())
    }

    fn conditional_jump(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let target = jump_target(ins)?;
        let label = self.label(target, ins.offset)?;
        let value = ctx.stack.pop(ins.offset)?.param;

        let zero = self.alloc(ins.offset, ExpressionKind::Constant(ConstantValue::Int(0)));
        let op = if ins.ins_type == InstructionType::Jz {
            BinaryOp::Equal
        } else {
            BinaryOp::NotEqual
        };
        let test = self.alloc(
            ins.offset,
            ExpressionKind::Binary {
                op,
                left: value,
                right: zero,
                declare_left: false,
            },
        );
        let goto = self.alloc(ins.offset, ExpressionKind::Goto { label });
        let if_true = self.alloc(
            ins.offset,
            ExpressionKind::Block(BlockExpression {
                expressions: vec![goto],
            }),
        );
        let conditional = self.alloc(
            ins.offset,
            ExpressionKind::Conditional {
                test,
                if_true,
                if_false: None,
            },
        );
        block.append(conditional);

        self.schedule(target, ctx);
        Ok(())
    }

    fn call(
        &mut self,
        ins: &Instruction,
        ctx: &DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let target = jump_target(ins)?;
        let function = match self.function_offsets.get(&target) {
            Some(&function) => function,
            None => self.discover_function(target, ctx)?,
        };

        let mut arguments = Vec::new();
        if let Some(callee) = self.functions.get(function.index()) {
            for argument in callee.inputs().iter().chain(callee.outputs()) {
                let index = relative_index(ctx.stack.len(), argument.stack_offset)
                    .filter(|&index| index < ctx.stack.len())
                    .ok_or_else(|| {
                        validation_error!(
                            ins.offset,
                            "Call argument at stack offset {} is out of bounds",
                            argument.stack_offset
                        )
                    })?;
                arguments.push(Self::frame_at(ctx, index, ins.offset)?.param);
            }
        }

        let call = self.alloc(ins.offset, ExpressionKind::Call { function, arguments });
        block.append(call);
        Ok(())
    }

    /// Decompiles a subroutine reached for the first time, drains its branches and infers its
    /// signature and name.
    fn discover_function(&mut self, target: u32, ctx: &DecompilationContext) -> Result<FunctionId> {
        let function = self.add_function(target);
        let signature = self.push_signature();
        let mut sub = ctx.enter(function, signature);
        debug!(
            "Discovered subroutine at {target:08x} (call depth {})",
            sub.call_depth()
        );

        let block = self.decompile_safely(target, &mut sub)?;
        self.drain_branches(signature, block)?;

        let frame = self
            .signatures
            .split_off(signature)
            .into_iter()
            .next()
            .unwrap_or_default();
        let inputs = self.arguments(&frame.inputs);
        let outputs = self.arguments(&frame.outputs);

        let name = if self.config.infer_function_names {
            infer_name(
                sub.call_depth(),
                sub.num_globals,
                ctx.num_globals,
                !outputs.is_empty(),
            )
        } else {
            None
        };

        if let Some(decl) = self.function_mut(function) {
            decl.set_block(block);
            decl.set_signature(inputs, outputs);
            if let Some(name) = name {
                debug!("Subroutine at {target:08x} is '{name}'");
                decl.set_name(name);
            }
        }
        Ok(function)
    }

    fn arguments(&self, recorded: &BTreeMap<i32, ExprId>) -> Vec<FunctionArgument> {
        recorded
            .iter()
            .map(|(&stack_offset, &param)| {
                let variable_type = self
                    .expressions
                    .get(param.index())
                    .and_then(Expression::as_parameter)
                    .map_or(VariableType::Void, |p| p.variable_type);
                FunctionArgument::new(variable_type, stack_offset)
            })
            .collect()
    }

    fn store_state(&mut self, ins: &Instruction, ctx: &mut DecompilationContext) -> Result<()> {
        let target = jump_target(ins)?;
        self.schedule(target, ctx);

        let label = self.label(target, ins.offset)?;
        let goto = self.alloc(ins.offset, ExpressionKind::Goto { label });
        let deferred = self.alloc(
            ins.offset,
            ExpressionKind::Block(BlockExpression {
                expressions: vec![goto],
            }),
        );
        ctx.saved_action = Some(deferred);
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Engine routines
    // ---------------------------------------------------------------------------------------

    fn action(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let (routine_index, arg_count) = match ins.operand {
            Operand::Action { routine, arg_count } => (routine, arg_count),
            _ => return Err(malformed_operand(ins)),
        };
        let routines = self.routines;
        let routine = routines
            .get(routine_index)
            .ok_or_else(|| validation_error!(ins.offset, "Unknown routine {}", routine_index))?;

        let mut arguments = Vec::with_capacity(usize::from(arg_count));
        for i in 0..usize::from(arg_count) {
            let argument_type = routine.argument_type(i).ok_or_else(|| {
                validation_error!(ins.offset, "Routine {} has no argument {}", routine.name, i)
            })?;
            let argument = match argument_type {
                VariableType::Vector => {
                    let components = Self::pop_vector(ctx, ins.offset)?;
                    self.compose_vector(ins.offset, components)?
                }
                VariableType::Action => ctx.saved_action.ok_or_else(|| {
                    validation_error!(
                        ins.offset,
                        "Unable to extract action argument {} of {}",
                        i,
                        routine.name
                    )
                })?,
                _ => ctx.stack.pop(ins.offset)?.param,
            };
            arguments.push(argument);
        }

        let action = self.alloc(
            ins.offset,
            ExpressionKind::Action {
                routine: routine_index,
                arguments,
            },
        );

        match routine.return_type {
            VariableType::Void => block.append(action),
            VariableType::Vector => {
                let result = self.define(
                    ins.offset,
                    ParameterExpression::local(VariableType::Vector),
                    action,
                    block,
                );
                for component in self.decompose_vector(ins.offset, result, block) {
                    ctx.push_local(component);
                }
            }
            return_type => {
                let result =
                    self.define(ins.offset, ParameterExpression::local(return_type), action, block);
                ctx.push_local(result);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Frame traffic
    // ---------------------------------------------------------------------------------------

    fn copy_down(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let (stack_offset, size) = stack_copy_operand(ins)?;
        let count = frame_count(u32::from(size));
        let stack_size = ctx.stack.len();
        let start = ctx.stack.resolve(frame_base(ins, ctx), stack_offset, ins.offset)?;
        if start + count > stack_size {
            return Err(validation_error!(
                ins.offset,
                "Out of bounds stack access: {} frames at {} (stack size {})",
                count,
                start,
                stack_size
            ));
        }

        for i in 0..count {
            let destination_index = start + count - 1 - i;
            let destination = Self::frame_at(ctx, destination_index, ins.offset)?;
            let source = Self::frame_at(ctx, stack_size - 1 - i, ins.offset)?;

            let left = self.access_frame(
                ins.offset,
                ctx,
                destination,
                destination_index,
                Locality::Output,
            )?;
            let assign = self.assign(ins.offset, left, source.param);
            block.append(assign);

            ctx.stack.set(
                destination_index,
                StackFrame::new(source.param, destination.allocated_by),
                ins.offset,
            )?;
        }
        Ok(())
    }

    fn copy_top(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let (stack_offset, size) = stack_copy_operand(ins)?;
        let count = frame_count(u32::from(size));
        let stack_size = ctx.stack.len();
        let start = ctx.stack.resolve(frame_base(ins, ctx), stack_offset, ins.offset)?;
        if start + count > stack_size {
            return Err(validation_error!(
                ins.offset,
                "Out of bounds stack access: {} frames at {} (stack size {})",
                count,
                start,
                stack_size
            ));
        }

        for i in 0..count {
            let index = start + i;
            let frame = Self::frame_at(ctx, index, ins.offset)?;
            let source = self.access_frame(ins.offset, ctx, frame, index, Locality::Input)?;
            let variable_type = self.parameter_type(source, ins.offset)?;

            let copy = self.define(
                ins.offset,
                ParameterExpression::local(variable_type).with_suffix(i.to_string()),
                source,
                block,
            );
            ctx.push_local(copy);
        }
        Ok(())
    }

    fn increment(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let stack_offset = match ins.operand {
            Operand::StackOffset(stack_offset) => stack_offset,
            _ => return Err(malformed_operand(ins)),
        };
        let index = ctx.stack.resolve(frame_base(ins, ctx), stack_offset, ins.offset)?;
        let frame = Self::frame_at(ctx, index, ins.offset)?;
        let operand = self.access_frame(ins.offset, ctx, frame, index, Locality::Output)?;

        let op = match ins.ins_type {
            InstructionType::DecISp | InstructionType::DecIBp => UnaryOp::Decrement,
            _ => UnaryOp::Increment,
        };
        let unary = self.alloc(ins.offset, ExpressionKind::Unary { op, operand });
        block.append(unary);
        Ok(())
    }

    fn destruct(&mut self, ins: &Instruction, ctx: &mut DecompilationContext) -> Result<()> {
        let (size, stack_offset, size_no_destroy) = match ins.operand {
            Operand::Destruct {
                size,
                stack_offset,
                size_no_destroy,
            } => (size, stack_offset, size_no_destroy),
            _ => return Err(malformed_operand(ins)),
        };
        let count = frame_count(u32::from(size));
        let kept = frame_count(u32::from(size_no_destroy));
        let stack_size = ctx.stack.len();
        if count > stack_size {
            return Err(validation_error!(
                ins.offset,
                "Stack underflow: cannot destroy {} of {} frames",
                count,
                stack_size
            ));
        }

        let removed_from = stack_size - count;
        let kept_frames = relative_index(removed_from, stack_offset / 4)
            .filter(|&from| from >= removed_from && from + kept <= stack_size)
            .and_then(|from| ctx.stack.frames().get(from..from + kept))
            .map(<[StackFrame]>::to_vec)
            .ok_or_else(|| {
                validation_error!(
                    ins.offset,
                    "Preserved span at {} of {} frames lies outside the destroyed frames",
                    stack_offset,
                    kept
                )
            })?;

        ctx.stack.truncate(removed_from);
        ctx.stack.extend(kept_frames);
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------------------------------

    fn unary(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let operand = ctx.stack.pop(ins.offset)?.param;
        let variable_type = self.parameter_type(operand, ins.offset)?;
        let op = match ins.ins_type {
            InstructionType::CompI => UnaryOp::OnesComplement,
            InstructionType::NotI => UnaryOp::Not,
            _ => UnaryOp::Negate,
        };
        let unary = self.alloc(ins.offset, ExpressionKind::Unary { op, operand });
        let result = self.define(ins.offset, ParameterExpression::local(variable_type), unary, block);
        ctx.push_local(result);
        Ok(())
    }

    fn binary(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
        op: BinaryOp,
        result_type: VariableType,
    ) -> Result<()> {
        let right = ctx.stack.pop(ins.offset)?.param;
        let left = ctx.stack.pop(ins.offset)?.param;
        let binary = self.alloc(
            ins.offset,
            ExpressionKind::Binary {
                op,
                left,
                right,
                declare_left: false,
            },
        );
        let result = self.define(ins.offset, ParameterExpression::local(result_type), binary, block);
        ctx.push_local(result);
        Ok(())
    }

    fn vector_arithmetic(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
        operands: VectorOperands,
    ) -> Result<()> {
        let (left, right) = match operands {
            VectorOperands::VectorVector => {
                let right = Self::pop_vector(ctx, ins.offset)?;
                let right = self.compose_vector(ins.offset, right)?;
                let left = Self::pop_vector(ctx, ins.offset)?;
                (self.compose_vector(ins.offset, left)?, right)
            }
            VectorOperands::VectorFloat => {
                let right = ctx.stack.pop(ins.offset)?.param;
                let left = Self::pop_vector(ctx, ins.offset)?;
                (self.compose_vector(ins.offset, left)?, right)
            }
            VectorOperands::FloatVector => {
                let right = Self::pop_vector(ctx, ins.offset)?;
                let right = self.compose_vector(ins.offset, right)?;
                (ctx.stack.pop(ins.offset)?.param, right)
            }
        };

        let op = match ins.ins_type {
            InstructionType::AddVV => BinaryOp::Add,
            InstructionType::SubVV => BinaryOp::Subtract,
            InstructionType::MulVF | InstructionType::MulFV => BinaryOp::Multiply,
            _ => BinaryOp::Divide,
        };
        let binary = self.alloc(
            ins.offset,
            ExpressionKind::Binary {
                op,
                left,
                right,
                declare_left: false,
            },
        );
        let result = self.define(
            ins.offset,
            ParameterExpression::local(VariableType::Vector),
            binary,
            block,
        );
        for component in self.decompose_vector(ins.offset, result, block) {
            ctx.push_local(component);
        }
        Ok(())
    }

    /// `EQUALTT`/`NEQUALTT`: compares two equally sized tuples frame by frame.
    ///
    /// The result is seeded with the first pairwise comparison and every further pair is
    /// folded in with `&&` (equality) or `||` (inequality). All pairs are always evaluated.
    fn tuple_comparison(
        &mut self,
        ins: &Instruction,
        ctx: &mut DecompilationContext,
        block: &mut BlockExpression,
    ) -> Result<()> {
        let size = match ins.operand {
            Operand::Size(size) => size,
            _ => return Err(malformed_operand(ins)),
        };
        let count = frame_count(u32::from(size));
        if count == 0 {
            return Err(validation_error!(ins.offset, "Tuple comparison of zero frames"));
        }
        let right = ctx.stack.pop_n(count, ins.offset)?;
        let left = ctx.stack.pop_n(count, ins.offset)?;

        let (compare, fold) = if ins.ins_type == InstructionType::EqualTT {
            (BinaryOp::Equal, BinaryOp::LogicalAnd)
        } else {
            (BinaryOp::NotEqual, BinaryOp::LogicalOr)
        };

        let result = self.alloc(
            ins.offset,
            ExpressionKind::Parameter(ParameterExpression::local(VariableType::Int)),
        );
        block.append(result);

        for (i, (l, r)) in left.iter().zip(&right).enumerate() {
            let comparison = self.alloc(
                ins.offset,
                ExpressionKind::Binary {
                    op: compare,
                    left: l.param,
                    right: r.param,
                    declare_left: false,
                },
            );
            let value = if i == 0 {
                comparison
            } else {
                self.alloc(
                    ins.offset,
                    ExpressionKind::Binary {
                        op: fold,
                        left: result,
                        right: comparison,
                        declare_left: false,
                    },
                )
            };
            let assign = self.assign(ins.offset, result, value);
            block.append(assign);
        }

        ctx.push_local(result);
        Ok(())
    }
}

/// Name of a newly decompiled subroutine, from how deep it was called and whether globals were
/// set up around it.
///
/// Compiled scripts with globals call `_globals` from the entry stub, and `_globals` calls the
/// script's main function after `SAVEBP`; scripts without globals call the main function
/// directly. Main functions that write back into the caller's frame return a value and are
/// conditional scripts. This is a heuristic and can misname unusual but valid programs.
fn infer_name(
    depth: usize,
    callee_globals: usize,
    caller_globals: usize,
    has_outputs: bool,
) -> Option<&'static str> {
    let is_main = match depth {
        2 if callee_globals > 0 => return Some("_globals"),
        2 => true,
        3 => caller_globals > 0,
        _ => false,
    };
    is_main.then_some(if has_outputs { "StartingConditional" } else { "main" })
}

/// Operator and result type of the scalar binary instructions.
fn binary_operator(ins_type: InstructionType) -> Option<(BinaryOp, VariableType)> {
    use InstructionType as T;
    use VariableType::{Float, Int};

    let operator = match ins_type {
        T::AddII => (BinaryOp::Add, Int),
        T::AddIF | T::AddFI | T::AddFF => (BinaryOp::Add, Float),
        T::AddSS => (BinaryOp::Add, VariableType::String),
        T::SubII => (BinaryOp::Subtract, Int),
        T::SubIF | T::SubFI | T::SubFF => (BinaryOp::Subtract, Float),
        T::MulII => (BinaryOp::Multiply, Int),
        T::MulIF | T::MulFI | T::MulFF => (BinaryOp::Multiply, Float),
        T::DivII => (BinaryOp::Divide, Int),
        T::DivIF | T::DivFI | T::DivFF => (BinaryOp::Divide, Float),
        T::ModII => (BinaryOp::Modulo, Int),
        T::LogAndII => (BinaryOp::LogicalAnd, Int),
        T::LogOrII => (BinaryOp::LogicalOr, Int),
        T::IncOrII => (BinaryOp::BitwiseOr, Int),
        T::ExcOrII => (BinaryOp::BitwiseExclusiveOr, Int),
        T::BoolAndII => (BinaryOp::BitwiseAnd, Int),
        T::EqualII
        | T::EqualFF
        | T::EqualSS
        | T::EqualOO
        | T::EqualEffEff
        | T::EqualEvtEvt
        | T::EqualLocLoc
        | T::EqualTalTal => (BinaryOp::Equal, Int),
        T::NEqualII
        | T::NEqualFF
        | T::NEqualSS
        | T::NEqualOO
        | T::NEqualEffEff
        | T::NEqualEvtEvt
        | T::NEqualLocLoc
        | T::NEqualTalTal => (BinaryOp::NotEqual, Int),
        T::GeqII | T::GeqFF => (BinaryOp::GreaterThanOrEqual, Int),
        T::GtII | T::GtFF => (BinaryOp::GreaterThan, Int),
        T::LtII | T::LtFF => (BinaryOp::LessThan, Int),
        T::LeqII | T::LeqFF => (BinaryOp::LessThanOrEqual, Int),
        T::ShLeftII => (BinaryOp::LeftShift, Int),
        T::ShRightII => (BinaryOp::RightShift, Int),
        T::UShRightII => (BinaryOp::RightShiftUnsigned, Int),
        _ => return None,
    };
    Some(operator)
}

/// Type of the slot reserved by an `RSADDx` instruction.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for any other instruction.
pub(crate) fn reserved_type(ins: &Instruction) -> Result<VariableType> {
    use InstructionType as T;
    match ins.ins_type {
        T::RsAddI => Ok(VariableType::Int),
        T::RsAddF => Ok(VariableType::Float),
        T::RsAddS => Ok(VariableType::String),
        T::RsAddO => Ok(VariableType::Object),
        T::RsAddEff => Ok(VariableType::Effect),
        T::RsAddEvt => Ok(VariableType::Event),
        T::RsAddLoc => Ok(VariableType::Location),
        T::RsAddTal => Ok(VariableType::Talent),
        other => Err(Error::InvalidArgument(format!(
            "Instruction is not of RSADDx type: {other}"
        ))),
    }
}

/// Immediate value of a `CONSTx` instruction.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for any other instruction, and a validation error if the
/// operand does not match the instruction.
pub(crate) fn constant_value(ins: &Instruction) -> Result<ConstantValue> {
    use InstructionType as T;
    let value = match ins.ins_type {
        T::ConstI => ins.int_value().map(ConstantValue::Int),
        T::ConstF => ins.float_value().map(ConstantValue::Float),
        T::ConstS => ins
            .string_value()
            .map(|value| ConstantValue::String(value.to_string())),
        T::ConstO => ins.object_id().map(ConstantValue::Object),
        other => {
            return Err(Error::InvalidArgument(format!(
                "Instruction is not of CONSTx type: {other}"
            )))
        }
    };
    value.ok_or_else(|| malformed_operand(ins))
}

fn malformed_operand(ins: &Instruction) -> Error {
    validation_error!(
        ins.offset,
        "Unexpected operand for {}: {:?}",
        ins.ins_type,
        ins.operand
    )
}

fn jump_target(ins: &Instruction) -> Result<u32> {
    ins.jump_target()
        .ok_or_else(|| validation_error!(ins.offset, "Jump target outside the program"))
}

fn stack_copy_operand(ins: &Instruction) -> Result<(i32, u16)> {
    match ins.operand {
        Operand::StackCopy { stack_offset, size } => Ok((stack_offset, size)),
        _ => Err(malformed_operand(ins)),
    }
}

/// Number of whole 4-byte frames in `bytes`.
fn frame_count(bytes: u32) -> usize {
    usize::try_from(bytes / 4).unwrap_or(usize::MAX)
}

/// Base index that a negative stack offset of `ins` is relative to.
fn frame_base(ins: &Instruction, ctx: &DecompilationContext) -> usize {
    if ins.ins_type.flags().contains(InstructionFlags::BASE_RELATIVE) {
        ctx.num_globals
    } else {
        ctx.stack.len()
    }
}

/// `base + delta`, if it is a valid index.
fn relative_index(base: usize, delta: i32) -> Option<usize> {
    let index = i64::try_from(base).ok()? + i64::from(delta);
    usize::try_from(index).ok()
}

/// `index - base` as a signed frame offset.
fn relative_offset(index: usize, base: usize, offset: u32) -> Result<i32> {
    let index = i64::try_from(index).ok();
    let base = i64::try_from(base).ok();
    index
        .zip(base)
        .and_then(|(index, base)| i32::try_from(index - base).ok())
        .ok_or_else(|| validation_error!(offset, "Stack offset does not fit in 32 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ProgramAssembler;

    #[test]
    fn naming_heuristic() {
        assert_eq!(infer_name(2, 0, 0, false), Some("main"));
        assert_eq!(infer_name(2, 0, 0, true), Some("StartingConditional"));
        assert_eq!(infer_name(2, 3, 0, false), Some("_globals"));
        assert_eq!(infer_name(3, 0, 2, false), Some("main"));
        assert_eq!(infer_name(3, 0, 0, false), None);
        assert_eq!(infer_name(4, 0, 2, false), None);
    }

    #[test]
    fn binary_result_types() {
        use InstructionType as T;
        assert_eq!(binary_operator(T::AddIF), Some((BinaryOp::Add, VariableType::Float)));
        assert_eq!(binary_operator(T::DivFI), Some((BinaryOp::Divide, VariableType::Float)));
        assert_eq!(binary_operator(T::ModII), Some((BinaryOp::Modulo, VariableType::Int)));
        assert_eq!(
            binary_operator(T::AddSS),
            Some((BinaryOp::Add, VariableType::String))
        );
        assert_eq!(
            binary_operator(T::GtFF),
            Some((BinaryOp::GreaterThan, VariableType::Int))
        );
        assert_eq!(binary_operator(T::AddVV), None);
        assert_eq!(binary_operator(T::EqualTT), None);
        assert_eq!(binary_operator(T::Jmp), None);
    }

    #[test]
    fn helpers_reject_foreign_instructions() {
        let rsadd = Instruction::new(InstructionType::RsAddI, 13, Operand::None);
        let consti = Instruction::new(InstructionType::ConstI, 13, Operand::Int(4));
        let bad_consti = Instruction::new(InstructionType::ConstI, 13, Operand::None);

        assert!(matches!(constant_value(&rsadd), Err(Error::InvalidArgument(_))));
        assert!(matches!(reserved_type(&consti), Err(Error::InvalidArgument(_))));
        assert!(matches!(constant_value(&consti), Ok(ConstantValue::Int(4))));
        assert!(matches!(
            constant_value(&bad_consti),
            Err(Error::Validation { offset: 13, .. })
        ));
        assert!(!Error::InvalidArgument(String::new()).is_recoverable());
    }

    #[test]
    fn offsets_relative_to_entry() {
        assert_eq!(relative_index(4, -1), Some(3));
        assert_eq!(relative_index(1, -2), None);
        assert!(matches!(relative_offset(1, 3, 0), Ok(-2)));
        assert!(matches!(relative_offset(5, 3, 0), Ok(2)));
    }

    #[test]
    fn labels_cover_every_target() -> Result<()> {
        let mut asm = ProgramAssembler::new();
        asm.consti(1)
            .jz("a")
            .consti(1)
            .jnz("a")
            .store_state(0, 0)
            .jmp("b")
            .label("a")
            .nop()
            .label("b")
            .retn();
        let program = asm.finish("labels")?;
        let config = DecompilerConfig::default();
        let routines = crate::script::RoutineTable::new();

        let mut decompiler = BlockDecompiler::new(&program, &routines, &config);
        decompiler.register_labels();
        let (expressions, _, _) = decompiler.finish();

        let mut offsets: Vec<u32> = expressions
            .iter()
            .filter(|e| matches!(e.kind, ExpressionKind::Label))
            .map(|e| e.offset)
            .collect();
        offsets.sort_unstable();
        // STORE_STATE @37 resumes at 53, "a" = 53, "b" = 55
        assert_eq!(offsets, vec![53, 55]);
        Ok(())
    }
}
