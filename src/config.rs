//! Root scope construction.
//!
//! ```ignore
//! // Defaults: TTL of 10, a TimerQueue pumped via `run_deferred()`,
//! // callback panics logged with `tracing::error!`
//! let root = Scope::new();
//!
//! // Custom configuration
//! let timers = Rc::new(TimerQueue::new());
//! let root = ScopeBuilder::new()
//!     .ttl(20)
//!     .scheduler(timers.clone())
//!     .exception_handler(|err| eprintln!("{err}"))
//!     .build();
//! ```

use std::rc::Rc;

use tracing::error;

use crate::Scope;
use crate::context::Context;
use crate::error::CallbackError;
use crate::scheduler::{Scheduler, TimerQueue};

/// Default number of extra digest iterations before giving up.
pub const DEFAULT_TTL: usize = 10;

/// Receives every panic caught in a user callback.
pub type ExceptionHandler = Rc<dyn Fn(&CallbackError)>;

/// Digest tuning shared by every scope of a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DigestConfig {
    /// How many times the digest loop may re-run after its first pass while
    /// watchers are still dirty or async work is still queued.
    pub ttl: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Builder for a root [`Scope`] and the context its tree shares.
#[derive(Default)]
pub struct ScopeBuilder {
    config: DigestConfig,
    scheduler: Option<Rc<dyn Scheduler>>,
    exception_handler: Option<ExceptionHandler>,
}

impl ScopeBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the digest TTL.
    ///
    /// Default: 10
    pub fn ttl(mut self, ttl: usize) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the scheduler used for deferred digests and applyAsync flushes.
    ///
    /// Default: a fresh [`TimerQueue`], pumped with
    /// [`Scope::run_deferred`](crate::Scope::run_deferred).
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the handler for panics caught in user callbacks.
    ///
    /// Default: log at `error` level through `tracing`.
    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallbackError) + 'static,
    {
        self.exception_handler = Some(Rc::new(handler));
        self
    }

    /// Create the root scope.
    pub fn build(self) -> Scope {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(TimerQueue::new()) as Rc<dyn Scheduler>);
        let exception_handler = self
            .exception_handler
            .unwrap_or_else(|| Rc::new(log_callback_error) as ExceptionHandler);

        let context = Rc::new(Context::new(self.config, scheduler, exception_handler));
        Scope::new_root(context)
    }
}

fn log_callback_error(err: &CallbackError) {
    error!(origin = %err.origin, message = %err.message, "user callback failed");
}
