//! Deferred, zero-delay, cancellable callbacks.
//!
//! Two operations need to hand control back to the host before their work
//! happens:
//!
//! - `eval_async` outside any phase schedules a fallback digest.
//! - `apply_async` schedules one coalesced flush of its queue.
//!
//! Both go through the tree's [`Scheduler`]. The default [`TimerQueue`] just
//! parks the callbacks until the host pumps it with
//! [`run_pending`](Scheduler::run_pending), which is what a single-threaded
//! event loop would do between turns:
//!
//! ```ignore
//! let timers = Rc::new(TimerQueue::new());
//! let root = ScopeBuilder::new().scheduler(timers.clone()).build();
//!
//! root.apply_async(|scope| scope.set("name", "abc"));
//! // Nothing has run yet; the flush is parked in the queue.
//!
//! loop {
//!     handle_host_events();
//!     timers.run_pending(); // Runs the flush, which digests from the root
//! }
//! ```
//!
//! Hosts with their own loop implement [`Scheduler`] over it instead.

use std::cell::RefCell;
use std::collections::VecDeque;

use slab::Slab;
use tracing::trace;

/// A deferred callback.
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled task, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a scheduler-specific raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The scheduler-specific raw id.
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Host integration point for deferred work.
pub trait Scheduler {
    /// Run `task` later, after the current call stack has unwound.
    fn defer(&self, task: Task) -> TimerId;

    /// Drop a task that has not run yet. Returns `false` if it already ran
    /// or was already cancelled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Run whatever is due now, returning how many tasks ran.
    ///
    /// Schedulers driven by their own loop have nothing for the caller to
    /// pump and keep the default.
    fn run_pending(&self) -> usize {
        0
    }
}

struct Slot {
    id: TimerId,
    task: Task,
}

#[derive(Default)]
struct TimerQueueInner {
    slots: Slab<Slot>,
    order: VecDeque<TimerId>,
    next_seq: u32,
}

/// Single-threaded FIFO scheduler pumped by the host.
///
/// Ids pack the slab key with a sequence number, so cancelling a task whose
/// slot was later reused never touches the newer task.
#[derive(Default)]
pub struct TimerQueue {
    inner: RefCell<TimerQueueInner>,
}

impl TimerQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(id: TimerId) -> usize {
        (id.0 & u64::from(u32::MAX)) as usize
    }

    /// Pop the next live task. The borrow is released before the task runs so
    /// tasks may schedule or cancel others.
    fn pop(&self) -> Option<Task> {
        let mut inner = self.inner.borrow_mut();
        while let Some(id) = inner.order.pop_front() {
            let key = Self::key(id);
            if inner.slots.get(key).is_some_and(|slot| slot.id == id) {
                return Some(inner.slots.remove(key).task);
            }
        }
        None
    }
}

impl Scheduler for TimerQueue {
    fn defer(&self, task: Task) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq = seq.wrapping_add(1);

        let entry = inner.slots.vacant_entry();
        let id = TimerId((u64::from(seq) << 32) | entry.key() as u64);
        entry.insert(Slot { id, task });
        inner.order.push_back(id);

        trace!(timer = id.0, "deferred task scheduled");
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let key = Self::key(id);
        if inner.slots.get(key).is_some_and(|slot| slot.id == id) {
            inner.slots.remove(key);
            trace!(timer = id.0, "deferred task cancelled");
            true
        } else {
            false
        }
    }

    /// Runs tasks in FIFO order until the queue is empty, including tasks
    /// scheduled by the tasks themselves.
    fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        ran
    }
}
