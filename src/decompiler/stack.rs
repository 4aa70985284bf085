//! Stack-frame simulator.
//!
//! The NWScript virtual machine passes every value through an evaluation stack of 4-byte
//! frames. The decompiler never executes the bytecode; it replays the stack effects of each
//! instruction on a [`SimulatedStack`] whose slots hold the parameter expression currently
//! occupying the frame, together with the function that allocated it.
//!
//! The allocating function is what reveals subroutine signatures: when a function reads or
//! writes a frame it did not allocate, that frame must belong to a caller and therefore becomes
//! an input or output argument.
//!
//! # Example
//!
//! ```text
//! RSADDI          // [p0]
//! CONSTI 5        // [p0, p1]        p1 = 5
//! CPDOWNSP -8, 4  // [p1, p1]        p0 = p1
//! MOVSP -4        // [p1]
//! ```

use crate::{
    decompiler::{ExprId, FunctionId},
    Result,
};

/// One simulated 4-byte slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Parameter expression currently stored in the slot
    pub param: ExprId,
    /// Function whose body allocated the slot
    pub allocated_by: FunctionId,
}

impl StackFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(param: ExprId, allocated_by: FunctionId) -> Self {
        Self {
            param,
            allocated_by,
        }
    }
}

/// Abstract evaluation stack, bottom first.
///
/// Cloning the stack is how a decompilation context forks at a branch: both paths continue
/// from the same frames but never observe each other's pushes and pops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStack {
    frames: Vec<StackFrame>,
}

impl SimulatedStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if the stack holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All frames, bottom first.
    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// The top frame.
    #[must_use]
    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// The frame at an absolute index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StackFrame> {
        self.frames.get(index)
    }

    /// Pushes a frame.
    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Replaces the frame at an absolute index.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `index` is out of bounds.
    pub fn set(&mut self, index: usize, frame: StackFrame, offset: u32) -> Result<()> {
        let len = self.frames.len();
        let slot = self.frames.get_mut(index).ok_or_else(|| {
            validation_error!(
                offset,
                "Out of bounds stack access: {} (stack size {})",
                index,
                len
            )
        })?;
        *slot = frame;
        Ok(())
    }

    /// Pops the top frame.
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset of the instruction, for error reporting
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stack is empty.
    pub fn pop(&mut self, offset: u32) -> Result<StackFrame> {
        self.frames
            .pop()
            .ok_or_else(|| validation_error!(offset, "Stack underflow"))
    }

    /// Pops `n` frames, returning them deepest first.
    ///
    /// # Errors
    ///
    /// Returns a validation error, leaving the stack untouched, if fewer than `n` frames are
    /// present.
    pub fn pop_n(&mut self, n: usize, offset: u32) -> Result<Vec<StackFrame>> {
        if n > self.frames.len() {
            return Err(validation_error!(
                offset,
                "Stack underflow: cannot pop {} of {} frames",
                n,
                self.frames.len()
            ));
        }
        let at = self.frames.len() - n;
        Ok(self.frames.split_off(at))
    }

    /// Shrinks the stack to `len` frames.
    pub fn truncate(&mut self, len: usize) {
        self.frames.truncate(len);
    }

    /// Pushes frames in order.
    pub fn extend(&mut self, frames: impl IntoIterator<Item = StackFrame>) {
        self.frames.extend(frames);
    }

    /// Converts a negative byte offset relative to `base` into an absolute frame index.
    ///
    /// `base` is the stack size for stack-pointer relative addressing and the globals boundary
    /// for base-pointer relative addressing. The frame must currently exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `stack_offset` is not negative or the resulting index is
    /// outside the stack.
    pub fn resolve(&self, base: usize, stack_offset: i32, offset: u32) -> Result<usize> {
        if stack_offset >= 0 {
            return Err(validation_error!(
                offset,
                "Non-negative stack offsets are not supported: {}",
                stack_offset
            ));
        }
        let index = i64::try_from(base).unwrap_or(i64::MAX) + i64::from(stack_offset / 4);
        match usize::try_from(index) {
            Ok(index) if index < self.frames.len() => Ok(index),
            _ => Err(validation_error!(
                offset,
                "Out of bounds stack access: {} (stack size {})",
                index,
                self.frames.len()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(i: usize) -> StackFrame {
        StackFrame::new(ExprId::new(i), FunctionId::new(0))
    }

    #[test]
    fn pop_n_is_deepest_first() -> Result<()> {
        let mut stack = SimulatedStack::new();
        stack.extend((0..4).map(frame));

        let popped = stack.pop_n(3, 0)?;
        assert_eq!(popped, vec![frame(1), frame(2), frame(3)]);
        assert_eq!(stack.frames(), &[frame(0)]);
        Ok(())
    }

    #[test]
    fn underflow_is_a_validation_error() {
        let mut stack = SimulatedStack::new();
        stack.push(frame(0));
        assert!(stack.pop_n(2, 0x20).is_err());
        assert_eq!(stack.len(), 1);
        assert!(stack.pop(0x20).is_ok());
        assert!(matches!(
            stack.pop(0x22),
            Err(crate::Error::Validation { offset: 0x22, .. })
        ));
    }

    #[test]
    fn resolve_relative_offsets() -> Result<()> {
        let mut stack = SimulatedStack::new();
        stack.extend((0..3).map(frame));

        assert_eq!(stack.resolve(stack.len(), -4, 0)?, 2);
        assert_eq!(stack.resolve(stack.len(), -12, 0)?, 0);
        assert_eq!(stack.resolve(2, -4, 0)?, 1);
        assert!(stack.resolve(stack.len(), -16, 0).is_err());
        assert!(stack.resolve(stack.len(), 0, 0).is_err());
        assert!(stack.resolve(stack.len(), 4, 0).is_err());
        Ok(())
    }

    #[test]
    fn set_replaces_in_place() -> Result<()> {
        let mut stack = SimulatedStack::new();
        stack.extend((0..2).map(frame));
        stack.set(0, frame(9), 0)?;
        assert_eq!(stack.get(0), Some(&frame(9)));
        assert!(stack.set(5, frame(9), 0).is_err());
        Ok(())
    }
}
