#![deny(missing_docs)]

//! Dirty-checking scopes with a fixed-point digest.
//!
//! A tree of [`Scope`]s holds plain data. Interest in derived values is
//! registered as watch functions; a digest re-evaluates all of them until
//! nothing changes any more, calling a listener for every change it sees.
//! No proxies and no dependency tracking: correctness comes from re-running
//! the watchers to a fixed point.
//!
//! # Quick Start
//!
//! ```ignore
//! use dirtyscope::{Scope, Value};
//!
//! let root = Scope::new();
//! root.set("first", "Jane");
//!
//! root.watch(
//!     |scope| scope.get("first"),
//!     |new, _old, scope| scope.set("greeting", format!("Hello, {:?}", new)),
//! );
//!
//! root.apply(|scope| scope.set("first", "Joe"))?;
//! // `greeting` was recomputed during the digest that `apply` ran.
//! ```
//!
//! # Core Types
//!
//! - [`Scope`] - A node in the tree: data, watchers, event listeners.
//! - [`Value`] - Dynamic data stored in scopes. Arrays and objects are shared handles.
//! - [`Deregistration`] - Returned by every registration; call it to undo.
//! - [`Event`] - Record passed to listeners of [`emit`](Scope::emit) / [`broadcast`](Scope::broadcast).
//!
//! # Scopes
//!
//! ```ignore
//! let child = root.new_child();            // reads fall through to `root`
//! let isolated = root.new_isolated_child(); // no fallthrough, same digest
//! child.destroy();                         // broadcasts `$destroy`, detaches
//! ```
//!
//! # Watching
//!
//! ```ignore
//! scope.watch(watch_fn, listener);                          // reference equality
//! scope.watch_with(watch_fn, listener, Equality::Structural); // deep equality
//! scope.watch_group(watch_fns, |new, old, scope| { ... });  // one call per digest
//! scope.watch_collection(watch_fn, |new, old, scope| { ... }); // shallow diff
//! ```
//!
//! # Digest and Task Queues
//!
//! ```ignore
//! root.digest()?;                      // run watchers to a fixed point
//! root.apply(|scope| { ... })?;        // run code, then digest from the root
//! scope.eval_async(|scope| { ... });   // later in this digest, or a deferred one
//! scope.apply_async(|scope| { ... });  // coalesced into one deferred apply
//! scope.post_digest(|scope| { ... });  // once, after the next digest settles
//! root.run_deferred();                 // pump the default scheduler
//! ```
//!
//! # Errors
//!
//! Only [`DigestError`] is ever returned: nested `apply`/`digest`, or a
//! digest that does not settle within its TTL (10 by default). Panics in user
//! callbacks are caught one by one and handed to the tree's exception handler
//! (see [`ScopeBuilder::exception_handler`]); by default they are logged
//! through `tracing`.

// Internal modules
mod collection;
mod config;
mod context;
mod digest;
mod error;
mod event;
mod group;
mod hash;
mod scheduler;
mod scope;
mod tasks;
mod value;
mod watch;

// Core types
pub use event::Event;
pub use group::BoxedWatchFn;
pub use scope::Scope;
pub use value::{Array, Object, Value};
pub use watch::{Deregistration, Equality};

// Errors
pub use error::{CallbackError, CallbackOrigin, DigestError, Phase, Result};

// Configuration and deferred scheduling (for custom event loops)
pub use config::{DEFAULT_TTL, DigestConfig, ExceptionHandler, ScopeBuilder};
pub use scheduler::{Scheduler, Task, TimerId, TimerQueue};
