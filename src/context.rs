//! Scheduling state shared by a whole scope tree.
//!
//! Every scope holds an `Rc<Context>`. Ordinary children inherit the context
//! of the scope they were created from; isolated children take the one of
//! their hierarchy parent. The context owns the only state shared across
//! scopes:
//!
//! - the async (microtask) queue drained inside each digest iteration
//! - the applyAsync (macrotask) queue and the handle of its pending flush
//! - the post-digest queue drained after the digest settles
//! - the phase flag guarding `apply`/`digest` against nesting
//! - the last-dirty-watch marker behind the stabilization short-circuit
//!
//! Execution is single-threaded, so plain `Cell`/`RefCell` suffice. No borrow
//! of any of these cells is held while user code runs.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::config::{DigestConfig, ExceptionHandler};
use crate::error::{CallbackError, DigestError, Phase, Result};
use crate::scheduler::{Scheduler, TimerId};
use crate::scope::{Scope, ScopeInner};
use crate::watch::WatchId;

/// An expression queued against the scope it was submitted on.
pub(crate) struct ScopedTask {
    pub(crate) scope: Scope,
    pub(crate) expr: Box<dyn FnOnce(&Scope)>,
}

pub(crate) struct Context {
    pub(crate) config: DigestConfig,
    pub(crate) scheduler: Rc<dyn Scheduler>,
    exception_handler: ExceptionHandler,
    root: RefCell<Weak<ScopeInner>>,
    phase: Cell<Option<Phase>>,
    async_queue: RefCell<VecDeque<ScopedTask>>,
    apply_async_queue: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    apply_async_id: Cell<Option<TimerId>>,
    post_digest_queue: RefCell<VecDeque<ScopedTask>>,
    last_dirty_watch: Cell<Option<WatchId>>,
}

impl Context {
    pub(crate) fn new(
        config: DigestConfig,
        scheduler: Rc<dyn Scheduler>,
        exception_handler: ExceptionHandler,
    ) -> Self {
        Self {
            config,
            scheduler,
            exception_handler,
            root: RefCell::new(Weak::new()),
            phase: Cell::new(None),
            async_queue: RefCell::default(),
            apply_async_queue: RefCell::default(),
            apply_async_id: Cell::new(None),
            post_digest_queue: RefCell::default(),
            last_dirty_watch: Cell::new(None),
        }
    }

    pub(crate) fn set_root(&self, root: Weak<ScopeInner>) {
        *self.root.borrow_mut() = root;
    }

    pub(crate) fn root(&self) -> Weak<ScopeInner> {
        self.root.borrow().clone()
    }

    pub(crate) fn report(&self, error: &CallbackError) {
        (self.exception_handler)(error);
    }

    pub(crate) fn phase(&self) -> Option<Phase> {
        self.phase.get()
    }

    /// Enter `phase`, failing if any phase is already active.
    ///
    /// The returned guard clears the phase when dropped, including while
    /// unwinding.
    pub(crate) fn begin_phase(&self, phase: Phase) -> Result<PhaseGuard<'_>> {
        if let Some(active) = self.phase.get() {
            return Err(DigestError::Reentrancy { phase: active });
        }
        self.phase.set(Some(phase));
        Ok(PhaseGuard { context: self })
    }

    pub(crate) fn last_dirty_watch(&self) -> Option<WatchId> {
        self.last_dirty_watch.get()
    }

    pub(crate) fn set_last_dirty_watch(&self, id: WatchId) {
        self.last_dirty_watch.set(Some(id));
    }

    pub(crate) fn clear_last_dirty_watch(&self) {
        self.last_dirty_watch.set(None);
    }

    /// Append a task; returns `true` if the queue was empty beforehand.
    pub(crate) fn push_async(&self, task: ScopedTask) -> bool {
        let mut queue = self.async_queue.borrow_mut();
        let was_empty = queue.is_empty();
        queue.push_back(task);
        was_empty
    }

    pub(crate) fn pop_async(&self) -> Option<ScopedTask> {
        self.async_queue.borrow_mut().pop_front()
    }

    pub(crate) fn has_async_work(&self) -> bool {
        !self.async_queue.borrow().is_empty()
    }

    pub(crate) fn push_apply_async(&self, task: Box<dyn FnOnce()>) {
        self.apply_async_queue.borrow_mut().push_back(task);
    }

    pub(crate) fn pop_apply_async(&self) -> Option<Box<dyn FnOnce()>> {
        self.apply_async_queue.borrow_mut().pop_front()
    }

    pub(crate) fn apply_async_id(&self) -> Option<TimerId> {
        self.apply_async_id.get()
    }

    pub(crate) fn set_apply_async_id(&self, id: Option<TimerId>) {
        self.apply_async_id.set(id);
    }

    pub(crate) fn push_post_digest(&self, task: ScopedTask) {
        self.post_digest_queue.borrow_mut().push_back(task);
    }

    pub(crate) fn pop_post_digest(&self) -> Option<ScopedTask> {
        self.post_digest_queue.borrow_mut().pop_front()
    }
}

/// Clears the tree's phase on drop.
pub(crate) struct PhaseGuard<'a> {
    context: &'a Context,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.context.phase.set(None);
    }
}
