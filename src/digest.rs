//! The digest loop.
//!
//! A digest repeatedly drains the async queue and runs one dirty-checking pass
//! over the subtree until a pass reports nothing changed and no async work is
//! left. Each pass visits scopes in pre-order and their watchers oldest first.
//!
//! # Stabilization short-circuit
//! The tree remembers the last watcher whose value changed. When a later pass
//! reaches that watcher again and finds it clean, every watcher in between has
//! already been seen clean since the change, so the pass stops there.
//!
//! ```text
//! pass 1:  w1* w2  w3* w4        (* = dirty; last dirty = w3)
//! pass 2:  w1  w2  w3  -- stop   (w3 clean and last dirty; w4 already clean)
//! ```
//!
//! # Divergence
//! The loop may re-run at most `ttl` times after its first pass (default 10).
//! Exhausting that budget while still dirty fails the digest with
//! [`DigestError::Divergence`].

use std::ops::ControlFlow;

use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{CallbackOrigin, DigestError, Phase, Result, guarded};
use crate::scope::Scope;

impl Scope {
    /// Run watchers of this scope and its descendants until they settle.
    ///
    /// Usually called on the root; [`apply`](Self::apply) always digests from
    /// the root. Fails with [`DigestError::Reentrancy`] inside another
    /// `apply`/`digest` of the same tree, and with [`DigestError::Divergence`]
    /// when the TTL runs out. Post-digest callbacks run after the loop
    /// settles, outside the phase.
    pub fn digest(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }

        let context = self.context();
        let phase = context.begin_phase(Phase::Digest)?;
        context.clear_last_dirty_watch();

        // A manual digest takes over the pending applyAsync flush
        if let Some(id) = context.apply_async_id() {
            context.scheduler.cancel(id);
            debug!("pending applyAsync flush taken over by digest");
            self.flush_apply_async();
        }

        let ttl = context.config.ttl;
        let mut remaining = ttl;
        let mut passes = 0_usize;
        loop {
            self.drain_async_queue();

            let dirty = self.digest_once();
            passes += 1;
            trace!(pass = passes, dirty, "digest pass finished");

            if !dirty && !context.has_async_work() {
                break;
            }
            if remaining == 0 {
                drop(phase);
                warn!(ttl, "digest did not settle");
                return Err(DigestError::Divergence { ttl });
            }
            remaining -= 1;
        }

        drop(phase);
        debug!(passes, "digest settled");

        self.run_post_digest();
        Ok(())
    }

    /// One dirty-checking pass over the subtree rooted here.
    ///
    /// Returns whether any watcher changed. The walk is iterative; children
    /// are read after their parent's watchers ran, so children created by a
    /// listener are visited in the same pass.
    pub(crate) fn digest_once(&self) -> bool {
        let context = self.context();
        let mut dirty = false;
        let mut stack = vec![self.clone()];

        while let Some(scope) = stack.pop() {
            if scope.check_watchers(context, &mut dirty).is_break() {
                trace!("pass short-circuited at last dirty watch");
                return dirty;
            }
            let children = scope.inner.children.borrow();
            stack.extend(children.iter().rev().cloned());
        }

        dirty
    }

    /// Evaluate this scope's watchers, oldest first.
    ///
    /// `context` belongs to the scope the digest started from; its
    /// last-dirty-watch marker is used even when this scope was registered
    /// under another tree. Breaks when that marker's watcher is found clean.
    fn check_watchers(&self, context: &Context, dirty: &mut bool) -> ControlFlow<()> {
        self.inner.watchers.borrow_mut().compact();

        let mut index = 0;
        loop {
            // Registrations made by the callbacks below append to this list,
            // so the length is re-read on every step.
            let slot = self.inner.watchers.borrow().get(index);
            index += 1;
            let watcher = match slot {
                None => break,
                Some(None) => continue,
                Some(Some(watcher)) => watcher,
            };

            // Panics go to the handler of the tree that owns the watcher
            let Some(new_value) = guarded(self.context(), CallbackOrigin::Watch, || {
                (watcher.watch_fn)(self)
            }) else {
                continue;
            };

            let old_value = watcher.last.borrow().clone();
            let changed = old_value
                .as_ref()
                .is_none_or(|old| !watcher.equality.equals(&new_value, old));

            if changed {
                context.set_last_dirty_watch(watcher.id);
                let old_value = old_value.unwrap_or_else(|| new_value.clone());
                // A panicking listener leaves the watcher unsettled, so the
                // next digest calls it again.
                let settled = guarded(self.context(), CallbackOrigin::WatchListener, || {
                    (watcher.listener)(&new_value, &old_value, self)
                });
                if settled.is_some() {
                    *watcher.last.borrow_mut() = Some(watcher.equality.retain(new_value));
                    *dirty = true;
                }
            } else if context.last_dirty_watch() == Some(watcher.id) {
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}
