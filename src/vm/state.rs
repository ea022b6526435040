use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::resolve::ClassRegistry;
use crate::value::object::ObjectId;
use crate::vm::sync::MonitorTable;
use crate::vm::threading::Task;
use crate::vm::tracer::Tracer;

/// State shared by every execution context of a VM instance.
///
/// The VM is cooperatively scheduled on one OS thread, so shared pieces use
/// `RefCell` and `Cell` rather than locks. Borrows are short-lived: nothing
/// here is held across a dispatcher step.
pub struct SharedState {
    pub registry: ClassRegistry,
    pub monitors: RefCell<MonitorTable>,
    pub tasks: RefCell<VecDeque<Task>>,
    pub tracer: Tracer,
    next_object_id: Cell<u64>,
}

impl SharedState {
    pub fn new(registry: ClassRegistry) -> Rc<Self> {
        Rc::new(Self {
            registry,
            monitors: RefCell::new(MonitorTable::new()),
            tasks: RefCell::new(VecDeque::new()),
            tracer: Tracer::new(),
            next_object_id: Cell::new(1),
        })
    }

    /// Hands out allocation serials. Never reused within a VM instance.
    pub fn alloc_object_id(&self) -> ObjectId {
        let id = self.next_object_id.get();
        self.next_object_id.set(id + 1);
        ObjectId(id)
    }

    /// Queues a task for the scheduler to pick up after the current step.
    pub fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_monotonic() {
        let shared = SharedState::new(ClassRegistry::bootstrap());
        let a = shared.alloc_object_id();
        let b = shared.alloc_object_id();
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_deferred_tasks_fifo() {
        let shared = SharedState::new(ClassRegistry::bootstrap());
        shared.defer(Task::Resume(crate::vm::ThreadId(1)));
        shared.defer(Task::Resume(crate::vm::ThreadId(2)));
        let tasks: Vec<_> = shared.tasks.borrow_mut().drain(..).collect();
        assert_eq!(
            tasks,
            vec![
                Task::Resume(crate::vm::ThreadId(1)),
                Task::Resume(crate::vm::ThreadId(2)),
            ]
        );
    }
}
