//! Per-branch decompilation state.
//!
//! A [`DecompilationContext`] is the state of one control-flow path: the simulated stack, the
//! chain of active subroutine calls, the globals boundary and the captured `STORE_STATE`
//! block. Whenever the bytecode creates a second path (a conditional or unconditional jump, a
//! `STORE_STATE`, or a `JSR` into a new subroutine) the context is *forked*.
//!
//! # Fork semantics
//!
//! | State                                   | On fork       |
//! |-----------------------------------------|---------------|
//! | simulated stack, call stack             | deep copy     |
//! | globals boundary, saved action          | copied value  |
//! | signature frame (inputs/outputs/branches) | shared by index |
//! | expression arena, labels, functions     | shared        |
//!
//! The shared parts live in the block decompiler itself, so every path contributes to one
//! arena and one function table while stack mutations on one path are never visible on another.

use std::collections::{BTreeMap, BTreeSet};

use crate::decompiler::{ExprId, FunctionId, SimulatedStack, StackFrame};

/// An active subroutine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// The called function
    pub function: FunctionId,
    /// Stack size when the call was entered; caller frames lie below it
    pub stack_size_on_enter: usize,
}

/// State of one control-flow path.
#[derive(Debug, Clone)]
pub struct DecompilationContext {
    pub(crate) stack: SimulatedStack,
    root: CallFrame,
    calls: Vec<CallFrame>,
    pub(crate) signature: usize,
    pub(crate) num_globals: usize,
    pub(crate) saved_action: Option<ExprId>,
}

impl DecompilationContext {
    /// Creates the context of the synthetic entry function.
    pub(crate) fn new(entry: FunctionId, signature: usize) -> Self {
        Self {
            stack: SimulatedStack::new(),
            root: CallFrame {
                function: entry,
                stack_size_on_enter: 0,
            },
            calls: Vec::new(),
            signature,
            num_globals: 0,
            saved_action: None,
        }
    }

    /// Copies this path so that a second path can continue independently.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Forks into a call of `function`, whose signature is collected in `signature`.
    pub(crate) fn enter(&self, function: FunctionId, signature: usize) -> Self {
        let mut sub = self.fork();
        sub.calls.push(CallFrame {
            function,
            stack_size_on_enter: self.stack.len(),
        });
        sub.signature = signature;
        sub
    }

    /// The simulated stack.
    #[must_use]
    pub fn stack(&self) -> &SimulatedStack {
        &self.stack
    }

    /// The innermost active call.
    #[must_use]
    pub fn top_call(&self) -> CallFrame {
        self.calls.last().copied().unwrap_or(self.root)
    }

    /// Number of active calls, counting the entry function.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.calls.len() + 1
    }

    /// Number of frames below the globals boundary set by `SAVEBP`.
    #[must_use]
    pub fn num_globals(&self) -> usize {
        self.num_globals
    }

    /// Block captured by the last `STORE_STATE`.
    #[must_use]
    pub fn saved_action(&self) -> Option<ExprId> {
        self.saved_action
    }

    /// Pushes a parameter allocated by the innermost call.
    pub(crate) fn push_local(&mut self, param: ExprId) {
        let function = self.top_call().function;
        self.stack.push(StackFrame::new(param, function));
    }
}

/// Signature discovery and branch work-list of one subroutine being decompiled.
///
/// Keys of `inputs` and `outputs` are frame indices relative to the stack size on entry; each
/// offset is recorded once, with the first caller parameter seen there.
#[derive(Debug, Default)]
pub(crate) struct SignatureFrame {
    pub(crate) inputs: BTreeMap<i32, ExprId>,
    pub(crate) outputs: BTreeMap<i32, ExprId>,
    pending: BTreeMap<u32, DecompilationContext>,
    scheduled: BTreeSet<u32>,
}

impl SignatureFrame {
    /// Queues a fork of `ctx` for decompilation at `target`, unless that target was already
    /// scheduled for this subroutine.
    pub(crate) fn schedule(&mut self, target: u32, ctx: &DecompilationContext) -> bool {
        if !self.scheduled.insert(target) {
            return false;
        }
        self.pending.insert(target, ctx.fork());
        true
    }

    /// Takes the pending branch with the lowest offset.
    pub(crate) fn next_pending(&mut self) -> Option<(u32, DecompilationContext)> {
        self.pending.pop_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_diverges_stack() {
        let mut ctx = DecompilationContext::new(FunctionId::new(0), 0);
        ctx.push_local(ExprId::new(1));

        let mut fork = ctx.fork();
        fork.push_local(ExprId::new(2));

        assert_eq!(ctx.stack().len(), 1);
        assert_eq!(fork.stack().len(), 2);
    }

    #[test]
    fn enter_records_call_frame() {
        let mut ctx = DecompilationContext::new(FunctionId::new(0), 0);
        ctx.push_local(ExprId::new(1));
        ctx.push_local(ExprId::new(2));

        let mut sub = ctx.enter(FunctionId::new(1), 1);
        assert_eq!(sub.call_depth(), 2);
        assert_eq!(
            sub.top_call(),
            CallFrame {
                function: FunctionId::new(1),
                stack_size_on_enter: 2
            }
        );
        sub.push_local(ExprId::new(3));
        assert_eq!(
            sub.stack().top().map(|f| f.allocated_by),
            Some(FunctionId::new(1))
        );
        assert_eq!(ctx.call_depth(), 1);
        assert_eq!(ctx.top_call().function, FunctionId::new(0));
    }

    #[test]
    fn branches_are_scheduled_once() {
        let ctx = DecompilationContext::new(FunctionId::new(0), 0);
        let mut frame = SignatureFrame::default();

        assert!(frame.schedule(0x40, &ctx));
        assert!(frame.schedule(0x20, &ctx));
        assert!(!frame.schedule(0x40, &ctx));

        assert_eq!(frame.next_pending().map(|(o, _)| o), Some(0x20));
        assert_eq!(frame.next_pending().map(|(o, _)| o), Some(0x40));
        assert!(!frame.schedule(0x20, &ctx));
        assert!(frame.next_pending().is_none());
    }
}
