use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::types::MethodInfo;
use crate::value::Value;
use crate::vm::context::ExecutionContext;
use crate::vm::dispatch::Dispatcher;
use crate::vm::state::SharedState;
use crate::vm::tracer::Tracer;
use crate::vm::{StepResult, VmError};

/// Identifies one guest thread. Thread ID 0 is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

/// Work queued for the scheduler to pick up between steps.
///
/// Monitor releases do not transfer control directly; they defer a `Resume`
/// per waiter and the releasing thread keeps running its step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    Resume(ThreadId),
}

/// Cooperative round-robin scheduler over all execution contexts.
///
/// All guest threads share one OS thread. A context leaves the run queue only
/// by suspending on a monitor or by running out of frames; suspended contexts
/// rejoin when a [`Task::Resume`] for them is drained. Wake tasks are drained
/// in FIFO order ahead of each scheduling round, so threads woken by one
/// release retry their acquisition in the order they originally queued.
pub struct Scheduler {
    shared: Rc<SharedState>,
    contexts: HashMap<ThreadId, ExecutionContext>,
    run_queue: VecDeque<ThreadId>,
    next_thread_id: u64,
}

impl Scheduler {
    pub fn new(shared: Rc<SharedState>) -> Self {
        Self {
            shared,
            contexts: HashMap::new(),
            run_queue: VecDeque::new(),
            next_thread_id: 1,
        }
    }

    /// Creates a runnable context with an entry frame for `method`, its
    /// arguments already stored in the leading locals.
    pub fn spawn(&mut self, method: Rc<MethodInfo>, args: Vec<Value>) -> Result<ThreadId, VmError> {
        let thread = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;

        let mut context = ExecutionContext::new(thread, Rc::clone(&self.shared));
        context.push_frame(method, 0);
        let mut slot = 0;
        for arg in args {
            let wide = arg.is_wide();
            context.set_local(slot, arg)?;
            slot += if wide { 2 } else { 1 };
        }

        vm_msg!(self, "spawned thread {}", thread.0);
        self.contexts.insert(thread, context);
        self.run_queue.push_back(thread);
        Ok(thread)
    }

    pub fn context(&self, thread: ThreadId) -> Result<&ExecutionContext, VmError> {
        self.contexts
            .get(&thread)
            .ok_or(VmError::UnknownThread(thread.0))
    }

    pub fn context_mut(&mut self, thread: ThreadId) -> Result<&mut ExecutionContext, VmError> {
        self.contexts
            .get_mut(&thread)
            .ok_or(VmError::UnknownThread(thread.0))
    }

    /// Runs queued threads round-robin until every thread has either finished
    /// or suspended with no pending wake. Returns the number of steps taken.
    ///
    /// A `budget` bounds the total step count; exceeding it is an error, which
    /// keeps scripting mistakes from looping forever.
    pub fn run_until_idle<D: Dispatcher>(
        &mut self,
        dispatcher: &mut D,
        budget: Option<u64>,
    ) -> Result<u64, VmError> {
        let mut steps = 0u64;
        loop {
            self.drain_tasks();
            let Some(thread) = self.run_queue.pop_front() else {
                break;
            };
            let context = self
                .contexts
                .get_mut(&thread)
                .ok_or(VmError::UnknownThread(thread.0))?;
            if context.frame_count() == 0 {
                continue;
            }

            if let Some(limit) = budget {
                if steps >= limit {
                    return Err(VmError::StepBudgetExhausted(limit));
                }
            }
            steps += 1;

            match dispatcher.step(context)? {
                // waits for a Task::Resume
                StepResult::Suspended => {}
                StepResult::Completed | StepResult::Reentered => {
                    if context.frame_count() > 0 {
                        self.run_queue.push_back(thread);
                    }
                }
            }
        }
        vm_msg!(self, "idle after {} steps", steps);
        Ok(steps)
    }

    fn drain_tasks(&mut self) {
        // collect first: processing may want the task queue again
        let tasks: Vec<Task> = self.shared.tasks.borrow_mut().drain(..).collect();
        for task in tasks {
            match task {
                Task::Resume(thread) => {
                    if self.shared.tracer.is_enabled() {
                        self.shared.tracer.trace_wake(0, &format!("thread {}", thread.0));
                    }
                    self.run_queue.push_back(thread);
                }
            }
        }
    }

    pub fn tracer_enabled(&self) -> bool {
        self.shared.tracer.is_enabled()
    }

    pub fn tracer(&self) -> &Tracer {
        &self.shared.tracer
    }

    pub fn indent(&self) -> usize {
        0
    }
}
