//! Entry points: synchronous evaluation, `apply`, and the three task queues.
//!
//! | Operation      | Queue        | Runs                                          |
//! |----------------|--------------|-----------------------------------------------|
//! | `eval`         | -            | now, no phase                                 |
//! | `apply`        | -            | now, then a full digest from the root         |
//! | `eval_async`   | async        | inside the current or next digest             |
//! | `apply_async`  | applyAsync   | in one coalesced deferred `apply`, or inline  |
//! |                |              | at the start of a manual digest               |
//! | `post_digest`  | post-digest  | once, after the current or next digest settles|
//!
//! Every queued callback runs exactly once. A panic in one is reported to the
//! tree's exception handler and the rest still run.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::context::ScopedTask;
use crate::error::{CallbackOrigin, Phase, Result, guarded};
use crate::scope::Scope;
use crate::value::Value;

impl Scope {
    /// Run `expr` against this scope and return its result.
    pub fn eval<R>(&self, expr: impl FnOnce(&Scope) -> R) -> R {
        expr(self)
    }

    /// Run `expr` against this scope with extra local values.
    pub fn eval_with_locals<R>(&self, expr: impl FnOnce(&Scope, &Value) -> R, locals: &Value) -> R {
        expr(self, locals)
    }

    /// Run `expr` in the `apply` phase, then digest from the root.
    ///
    /// The digest runs even if `expr` panics. In that case the panic is
    /// resumed once the digest finished, unless the digest itself failed, in
    /// which case its error is returned instead.
    ///
    /// # Example
    /// ```ignore
    /// root.apply(|scope| scope.set("name", "Jane"))?;
    /// // Every watcher in the tree has seen the new name.
    /// ```
    pub fn apply<R>(&self, expr: impl FnOnce(&Scope) -> R) -> Result<R> {
        let outcome = {
            let _phase = self.context().begin_phase(Phase::Apply)?;
            panic::catch_unwind(AssertUnwindSafe(|| self.eval(expr)))
        };

        let digested = self.root().digest();
        match outcome {
            Ok(value) => digested.map(|()| value),
            Err(payload) => {
                digested?;
                panic::resume_unwind(payload)
            }
        }
    }

    /// Queue `expr` to run inside the current digest, or the next one.
    ///
    /// Outside any phase the first task queued also schedules a deferred
    /// digest from the root, so the task runs even if nobody digests.
    pub fn eval_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let context = self.context();
        let was_empty = context.push_async(ScopedTask {
            scope: self.clone(),
            expr: Box::new(expr),
        });

        if context.phase().is_none() && was_empty {
            let root = context.root();
            context.scheduler.defer(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope::from_inner) else {
                    return;
                };
                if !root.context().has_async_work() {
                    return;
                }
                if let Err(err) = root.digest() {
                    error!(%err, "deferred digest failed");
                }
            }));
            debug!("deferred digest scheduled by eval_async");
        }
    }

    /// Queue `expr` for a coalesced, deferred `apply`.
    ///
    /// All calls made before the flush fires share one scheduled flush that
    /// runs them in submission order and then digests once. A manual
    /// [`digest`](Self::digest) before that cancels the scheduled flush and
    /// runs the queue itself.
    pub fn apply_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let context = self.context();
        let scope = self.clone();
        context.push_apply_async(Box::new(move || expr(&scope)));

        if context.apply_async_id().is_none() {
            let root = context.root();
            let id = context.scheduler.defer(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope::from_inner) else {
                    return;
                };
                if let Err(err) = root.apply(Scope::flush_apply_async) {
                    error!(%err, "deferred applyAsync flush failed");
                }
            }));
            context.set_apply_async_id(Some(id));
            debug!("applyAsync flush scheduled");
        }
    }

    /// Queue `expr` to run once after the current or next digest settles.
    ///
    /// Changes it makes are not dirty-checked until a later digest.
    pub fn post_digest(&self, expr: impl FnOnce(&Scope) + 'static) {
        self.context().push_post_digest(ScopedTask {
            scope: self.clone(),
            expr: Box::new(expr),
        });
    }

    /// Run the tree's due deferred work (fallback digests and applyAsync
    /// flushes). Returns the number of deferred callbacks that ran.
    ///
    /// Only meaningful with a host-pumped scheduler such as the default
    /// [`TimerQueue`](crate::TimerQueue).
    pub fn run_deferred(&self) -> usize {
        self.context().scheduler.run_pending()
    }

    /// Run every queued applyAsync task in order and forget the scheduled
    /// flush.
    pub(crate) fn flush_apply_async(&self) {
        let context = self.context();
        context.set_apply_async_id(None);
        while let Some(task) = context.pop_apply_async() {
            guarded(context, CallbackOrigin::ApplyAsync, task);
        }
    }

    pub(crate) fn drain_async_queue(&self) {
        let context = self.context();
        while let Some(ScopedTask { scope, expr }) = context.pop_async() {
            guarded(context, CallbackOrigin::Async, || expr(&scope));
        }
    }

    pub(crate) fn run_post_digest(&self) {
        let context = self.context();
        while let Some(ScopedTask { scope, expr }) = context.pop_post_digest() {
            guarded(context, CallbackOrigin::PostDigest, || expr(&scope));
        }
    }
}
