use thiserror::Error;

#[macro_use]
pub mod macros;
pub mod context;
pub mod dispatch;
pub mod exceptions;
pub mod stack;
pub mod state;
pub mod sync;
pub mod threading;
pub mod tracer;

pub use context::{ExecutionContext, RunEnd};
pub use dispatch::{Dispatcher, Op, ScriptedDispatcher};
pub use stack::{CallStack, Frame, FrameId};
pub use state::SharedState;
pub use sync::{Monitor, MonitorExit, MonitorTable};
pub use threading::{Scheduler, Task, ThreadId};
pub use tracer::Tracer;

/// Outcome of executing one operation in a context.
///
/// Dispatchers return `Reentered` when the operation replaced or added frames
/// and the current instruction must not advance, and `Suspended` when the
/// thread blocked on a monitor and must leave the run queue until woken.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    Completed,
    Reentered,
    Suspended,
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("class already defined: {0}")]
    DuplicateClass(String),
    #[error("method not found: {class}.{name}{descriptor}")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("no frame on the call stack")]
    NoFrame,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("local index {index} out of bounds for {max_locals} locals")]
    LocalOutOfBounds { index: usize, max_locals: usize },
    #[error("malformed descriptor: {0}")]
    BadDescriptor(String),
    #[error("bad constant pool access: {0}")]
    BadConstantPool(String),
    #[error("static field read before initialization: {0}")]
    StaticsNotReady(String),
    #[error("step budget exhausted after {0} steps")]
    StepBudgetExhausted(u64),
    #[error("script for thread {thread} is empty but {frames} frames remain")]
    ScriptStuck { thread: u64, frames: usize },
    #[error("unknown thread: {0}")]
    UnknownThread(u64),
    #[error("unknown object: {0}")]
    UnknownObject(String),
}
