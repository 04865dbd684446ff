// Runtime stack of lexical frames

use crate::runtime::error::RuntimeErrorKind;
use crate::runtime::reference::ValueCell;
use std::rc::Rc;

/// One lexical scope instance: a `let` block or a function invocation.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Fresh cells for the names the scope binds, in declaration order.
    pub locals: Vec<ValueCell>,
    /// Cells captured by the closure whose body is executing.
    pub captures: Rc<[ValueCell]>,
    /// Set on frames that begin a function region (calls and pre-seeded frames).
    pub boundary: bool,
}

impl Frame {
    pub fn new(locals: Vec<ValueCell>, captures: Rc<[ValueCell]>, boundary: bool) -> Self {
        Frame {
            locals,
            captures,
            boundary,
        }
    }
}

/// The frame chain of one logical thread of evaluation.
///
/// Never shared between launched tasks; captured cells are what they share.
#[derive(Debug, Default)]
pub struct RuntimeStack {
    frames: Vec<Frame>,
}

impl RuntimeStack {
    pub fn new() -> Self {
        RuntimeStack { frames: Vec::new() }
    }

    /// A stack holding one pre-seeded boundary frame, matching
    /// `CompileEnv::with_frame` at compile time.
    pub fn with_frame(cells: Vec<ValueCell>) -> Self {
        RuntimeStack {
            frames: vec![Frame::new(cells, Rc::from(Vec::new()), true)],
        }
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        RuntimeStack { frames }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Result<Frame, RuntimeErrorKind> {
        self.frames
            .pop()
            .ok_or_else(|| RuntimeErrorKind::StackCorrupted("pop of an empty stack".to_string()))
    }

    /// Captures visible from the top frame.
    pub fn captures(&self) -> Rc<[ValueCell]> {
        self.frames
            .last()
            .map(|frame| frame.captures.clone())
            .unwrap_or_else(|| Rc::from(Vec::new()))
    }

    /// Absolute index of the frame `depth` levels below the top.
    pub fn absolute(&self, depth: usize) -> Result<usize, RuntimeErrorKind> {
        self.frames
            .len()
            .checked_sub(depth + 1)
            .ok_or_else(|| {
                RuntimeErrorKind::StackCorrupted(format!(
                    "frame depth {} exceeds stack of {}",
                    depth,
                    self.frames.len()
                ))
            })
    }

    pub fn slot(&self, frame: usize, slot: usize) -> Result<&ValueCell, RuntimeErrorKind> {
        self.frames
            .get(frame)
            .and_then(|f| f.locals.get(slot))
            .ok_or_else(|| {
                RuntimeErrorKind::StackCorrupted(format!("no slot {} in frame {}", slot, frame))
            })
    }

    pub fn local(&self, depth: usize, index: usize) -> Result<&ValueCell, RuntimeErrorKind> {
        self.slot(self.absolute(depth)?, index)
    }

    pub fn capture(&self, index: usize) -> Result<&ValueCell, RuntimeErrorKind> {
        self.frames
            .last()
            .and_then(|frame| frame.captures.get(index))
            .ok_or_else(|| RuntimeErrorKind::StackCorrupted(format!("no capture {}", index)))
    }

    /// Copies the frames of the current function region, from the nearest
    /// boundary frame to the top.
    pub fn snapshot(&self) -> Vec<Frame> {
        let start = self
            .frames
            .iter()
            .rposition(|frame| frame.boundary)
            .unwrap_or(0);
        self.frames[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::values::Value;

    #[test]
    fn test_depth_addresses_from_top() {
        let mut stack = RuntimeStack::with_frame(vec![ValueCell::new(Value::number(1.0))]);
        stack.push(Frame::new(
            vec![ValueCell::new(Value::number(2.0))],
            stack.captures(),
            false,
        ));
        assert_eq!(stack.local(0, 0).unwrap().get(), Value::number(2.0));
        assert_eq!(stack.local(1, 0).unwrap().get(), Value::number(1.0));
        assert!(stack.local(2, 0).is_err());
    }

    #[test]
    fn test_snapshot_starts_at_boundary() {
        let mut stack = RuntimeStack::with_frame(vec![]);
        stack.push(Frame::new(vec![], Rc::from(Vec::new()), true));
        stack.push(Frame::new(vec![], Rc::from(Vec::new()), false));
        assert_eq!(stack.snapshot().len(), 2);
    }

    #[test]
    fn test_pop_empty_stack_is_an_error() {
        let mut stack = RuntimeStack::new();
        assert!(matches!(
            stack.pop(),
            Err(RuntimeErrorKind::StackCorrupted(_))
        ));
    }
}
