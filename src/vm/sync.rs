use std::collections::{HashMap, VecDeque};

use crate::value::object::ObjectId;
use crate::vm::threading::ThreadId;

/// Per-object lock state for `monitorenter`/`monitorexit`.
///
/// # Implementation Details
///
/// Monitors are recursive: the owning thread may enter again and must exit
/// the same number of times before the lock releases. Contending threads are
/// queued in arrival order and woken together on release; under the
/// cooperative scheduler they retry in queue order, so acquisition is FIFO.
///
/// # Scheduling
///
/// Nothing here blocks the host thread. A failed entry only records the
/// waiter; suspending the guest thread is the caller's job.
#[derive(Debug)]
pub struct Monitor {
    owner: Option<ThreadId>,
    count: usize,
    waiters: VecDeque<ThreadId>,
}

/// Outcome of a `monitorexit`.
#[derive(Debug, PartialEq, Eq)]
pub enum MonitorExit {
    /// The owner still holds the lock at a lower recursion count.
    StillHeld,
    /// Fully released; the queued waiters should be woken in this order.
    Released(Vec<ThreadId>),
    /// The exiting thread does not own the lock. Not raised, only reported.
    NotOwner,
}

impl Monitor {
    fn new() -> Self {
        Self {
            owner: None,
            count: 0,
            waiters: VecDeque::new(),
        }
    }

    /// Try to enter the monitor.
    /// Returns true if the lock was acquired, false otherwise.
    pub fn try_enter(&mut self, thread: ThreadId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(thread);
                self.count = 1;
                true
            }
            Some(owner) if owner == thread => {
                self.count += 1;
                true
            }
            Some(_) => false,
        }
    }

    pub fn enqueue_waiter(&mut self, thread: ThreadId) {
        self.waiters.push_back(thread);
    }

    /// Exit the monitor once.
    pub fn exit(&mut self, thread: ThreadId) -> MonitorExit {
        if self.owner != Some(thread) {
            return MonitorExit::NotOwner;
        }
        self.count -= 1;
        if self.count > 0 {
            return MonitorExit::StillHeld;
        }
        self.owner = None;
        MonitorExit::Released(self.waiters.drain(..).collect())
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.waiters.iter().copied()
    }
}

/// Maps objects to their monitors.
///
/// Entries are created lazily on first contention-free or contended entry and
/// dropped again once fully released, so the table only ever holds monitors
/// that are owned or awaited.
#[derive(Debug, Default)]
pub struct MonitorTable {
    monitors: HashMap<ObjectId, Monitor>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts entry, queueing the thread as a waiter on failure.
    /// Returns true if the lock was acquired.
    pub fn enter(&mut self, object: ObjectId, thread: ThreadId) -> bool {
        let monitor = self.monitors.entry(object).or_insert_with(Monitor::new);
        if monitor.try_enter(thread) {
            true
        } else {
            monitor.enqueue_waiter(thread);
            false
        }
    }

    /// Exits the monitor, removing the table entry on full release.
    pub fn exit(&mut self, object: ObjectId, thread: ThreadId) -> MonitorExit {
        let Some(monitor) = self.monitors.get_mut(&object) else {
            return MonitorExit::NotOwner;
        };
        let result = monitor.exit(thread);
        if matches!(result, MonitorExit::Released(_)) {
            self.monitors.remove(&object);
        }
        result
    }

    pub fn monitor(&self, object: ObjectId) -> Option<&Monitor> {
        self.monitors.get(&object)
    }
}
