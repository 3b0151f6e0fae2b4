//! Error types.
//!
//! Only two conditions ever reach calling code: a nested phase
//! ([`DigestError::Reentrancy`]) and a digest that does not settle within its
//! TTL ([`DigestError::Divergence`]). Panics raised by user callbacks are
//! caught where the callback is invoked, turned into a [`CallbackError`] and
//! handed to the tree's exception handler.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::context::Context;

/// Result of operations that run or enter a digest.
pub type Result<T> = std::result::Result<T, DigestError>;

/// The phase a scope tree is in while `apply` or `digest` runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Inside [`Scope::apply`](crate::Scope::apply), before the digest.
    Apply,
    /// Inside [`Scope::digest`](crate::Scope::digest).
    Digest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Apply => f.write_str("$apply"),
            Phase::Digest => f.write_str("$digest"),
        }
    }
}

/// Fatal failures of `apply`/`digest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// `apply` or `digest` was entered while a phase was already active.
    #[error("{phase} already in progress")]
    Reentrancy {
        /// The phase that was active.
        phase: Phase,
    },

    /// Watchers kept changing (or async work kept arriving) past the TTL.
    #[error("{ttl} digest iterations reached")]
    Divergence {
        /// The configured iteration budget.
        ttl: usize,
    },
}

/// Which kind of user callback failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackOrigin {
    /// A watch function.
    Watch,
    /// A watch listener.
    WatchListener,
    /// An `eval_async` expression.
    Async,
    /// An `apply_async` expression.
    ApplyAsync,
    /// A `post_digest` callback.
    PostDigest,
    /// An event listener.
    EventListener,
}

impl fmt::Display for CallbackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackOrigin::Watch => "watch function",
            CallbackOrigin::WatchListener => "watch listener",
            CallbackOrigin::Async => "async task",
            CallbackOrigin::ApplyAsync => "applyAsync task",
            CallbackOrigin::PostDigest => "post-digest callback",
            CallbackOrigin::EventListener => "event listener",
        };
        f.write_str(name)
    }
}

/// A panic caught while running a user callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{origin} panicked: {message}")]
pub struct CallbackError {
    /// Where the panic came from.
    pub origin: CallbackOrigin,
    /// The panic payload, when it was a string.
    pub message: String,
}

impl CallbackError {
    pub(crate) fn from_panic(origin: CallbackOrigin, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self { origin, message }
    }
}

/// Run a user callback, routing a panic to the tree's exception handler.
///
/// Returns `None` when the callback panicked.
pub(crate) fn guarded<R>(
    context: &Context,
    origin: CallbackOrigin,
    f: impl FnOnce() -> R,
) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            context.report(&CallbackError::from_panic(origin, payload.as_ref()));
            None
        }
    }
}
