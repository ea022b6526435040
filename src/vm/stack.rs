use std::rc::Rc;

use crate::types::MethodInfo;
use crate::value::Value;
use crate::vm::VmError;

/// Identifies one frame activation within a context.
///
/// Ids are never reused, so holding a `FrameId` across calls stays meaningful
/// even after the frame itself is popped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

pub struct Frame {
    pub method: Rc<MethodInfo>,
    /// First slot of this frame's locals window within the shared value buffer.
    pub base: usize,
    pub id: FrameId,
}

impl Frame {
    /// First slot of this frame's operand stack. Pops below this underflow.
    pub fn floor(&self) -> usize {
        self.base + self.method.max_locals
    }
}

/// The call stack of one thread: a frame list over a single shared value
/// buffer holding every frame's locals and operand stack.
pub struct CallStack {
    frames: Vec<Frame>,
    values: Vec<Value>,
    next_frame_id: u64,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            frames: vec![],
            values: vec![],
            next_frame_id: 1,
        }
    }

    /// Pushes a frame for `method`, consuming the top `consumes` slots of the
    /// caller's operand stack as the callee's leading locals.
    ///
    /// Violating `consumes <= stack length` is a fatal interpreter bug, not a
    /// guest-visible error.
    pub fn push_frame(&mut self, method: Rc<MethodInfo>, consumes: usize) -> FrameId {
        // since arguments are set up on the stack in order for a call and consumed by the callee
        // we can take advantage of the existing stack space and just window our base over them
        //
        // before:
        // ─────────────┬─────────────────────────────────────┐
        //              │                                     │
        //    caller's  │   caller's       (args set up       │
        //    locals    │   stack           here at the top)  │
        //              │                                     │
        // ─────────────┴─────────────────────────────────────┘
        //
        // after:
        // ─────────────┬──────────────┬──────────────────────┬───────────────────────┬──────
        //              │              │                      │                       │
        //    caller's  │   caller's   │   callee's           │   callee's  (inited   │  callee's  (starts
        //    locals    │   stack      │   arguments          │   locals     empty)   │  stack      empty)
        //              │              │                      │                       │
        // ─────────────┴──────────────┴──────────────────────┴───────────────────────┴──────
        let Some(base) = self.values.len().checked_sub(consumes) else {
            panic!(
                "not enough values on stack! expected {} arguments, found {}",
                consumes,
                self.values.len()
            )
        };
        let floor = base + method.max_locals;
        if self.values.len() < floor {
            self.values.resize(floor, Value::Uninit);
        }

        let id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;
        self.frames.push(Frame { method, base, id });
        id
    }

    /// Pops the current frame and discards its whole window, arguments
    /// included. Returns the id of the newly exposed frame, if any.
    pub fn pop_frame(&mut self) -> Result<Option<FrameId>, VmError> {
        let frame = self.frames.pop().ok_or(VmError::NoFrame)?;
        self.values.truncate(frame.base);
        Ok(self.frames.last().map(|f| f.id))
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total slots in use across all frames.
    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), VmError> {
        if self.frames.is_empty() {
            return Err(VmError::NoFrame);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pushes a two-slot value: the value itself, then its padding slot.
    pub fn push_wide(&mut self, value: Value) -> Result<(), VmError> {
        self.push_value(value)?;
        self.push_value(Value::Uninit)
    }

    pub fn pop_value(&mut self) -> Result<Value, VmError> {
        let frame = self.frames.last().ok_or(VmError::NoFrame)?;
        if self.values.len() <= frame.floor() {
            return Err(VmError::StackUnderflow);
        }
        // the floor check guarantees a value is present
        Ok(self.values.pop().unwrap_or(Value::Uninit))
    }

    pub fn peek_value(&self) -> Result<&Value, VmError> {
        let frame = self.frames.last().ok_or(VmError::NoFrame)?;
        if self.values.len() <= frame.floor() {
            return Err(VmError::StackUnderflow);
        }
        Ok(&self.values[self.values.len() - 1])
    }

    pub fn local(&self, index: usize) -> Result<&Value, VmError> {
        let frame = self.frames.last().ok_or(VmError::NoFrame)?;
        if index >= frame.method.max_locals {
            return Err(VmError::LocalOutOfBounds {
                index,
                max_locals: frame.method.max_locals,
            });
        }
        Ok(&self.values[frame.base + index])
    }

    pub fn set_local(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        let frame = self.frames.last().ok_or(VmError::NoFrame)?;
        if index >= frame.method.max_locals {
            return Err(VmError::LocalOutOfBounds {
                index,
                max_locals: frame.method.max_locals,
            });
        }
        self.values[frame.base + index] = value;
        Ok(())
    }

    /// Reads a slot by absolute position in the value buffer.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}
