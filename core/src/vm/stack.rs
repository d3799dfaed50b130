//! file: core/src/vm/stack.rs
//! description: the call-stack manager.

use super::error::{EngineFatal, VmError};
use super::frame::CallFrame;

#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        CallStack { frames: Vec::new(), max_depth }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: CallFrame) -> Result<(), VmError> {
        if self.frames.len() >= self.max_depth {
            return Err(EngineFatal::CallDepthExceeded(self.max_depth).into());
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Result<&CallFrame, VmError> {
        self.frames.last().ok_or_else(|| EngineFatal::StackCorruption("no active frame".into()).into())
    }

    pub fn top_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        self.frames.last_mut().ok_or_else(|| EngineFatal::StackCorruption("no active frame".into()).into())
    }

    /// Frames from the innermost outwards.
    pub fn iter_rev(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter().rev()
    }

    pub fn get(&self, i: usize) -> Option<&CallFrame> {
        self.frames.get(i)
    }

    /// Drop every frame above `len`.
    pub fn truncate(&mut self, len: usize) {
        self.frames.truncate(len);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
