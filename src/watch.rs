//! Watcher registration.
//!
//! Each scope keeps its watchers in registration order. Deregistering leaves a
//! tombstone in place instead of shifting the list, so a digest pass that is
//! iterating the same list by index neither skips nor repeats a watcher.
//! Tombstones are compacted the next time a digest visits the scope.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::scope::{Scope, ScopeInner};
use crate::value::Value;

/// Identity of a watcher, unique per thread.
///
/// A digest may walk scopes registered under another tree's context (a child
/// whose hierarchy parent is in a different tree), so ids must not repeat
/// across contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct WatchId(pub(crate) u64);

thread_local! {
    static NEXT_WATCH_ID: Cell<u64> = const { Cell::new(0) };
}

impl WatchId {
    fn next() -> Self {
        NEXT_WATCH_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            WatchId(id)
        })
    }
}

pub(crate) type WatchFn = Box<dyn Fn(&Scope) -> Value>;
pub(crate) type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope)>;

/// How a watcher decides whether its value changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Equality {
    /// Scalars by value, arrays/objects by handle; NaN equals NaN.
    #[default]
    Reference,
    /// Deep structural comparison against a deep copy of the last value.
    Structural,
}

impl Equality {
    pub(crate) fn equals(self, new_value: &Value, old_value: &Value) -> bool {
        match self {
            Equality::Reference => new_value.same(old_value),
            Equality::Structural => new_value.deep_eq(old_value),
        }
    }

    /// What to retain as the last value.
    pub(crate) fn retain(self, value: Value) -> Value {
        match self {
            Equality::Reference => value,
            Equality::Structural => value.deep_clone(),
        }
    }
}

pub(crate) struct Watcher {
    pub(crate) id: WatchId,
    pub(crate) watch_fn: WatchFn,
    pub(crate) listener: ListenerFn,
    pub(crate) equality: Equality,
    /// `None` until the first evaluation, so the first value always counts as
    /// a change, whatever it is.
    pub(crate) last: RefCell<Option<Value>>,
}

/// A scope's watchers, oldest first, with `None` marking removed ones.
#[derive(Default)]
pub(crate) struct WatchList {
    slots: Vec<Option<Rc<Watcher>>>,
}

impl WatchList {
    pub(crate) fn push(&mut self, watcher: Rc<Watcher>) {
        self.slots.push(Some(watcher));
    }

    /// The slot at `index`: `None` past the end, `Some(None)` for a tombstone.
    pub(crate) fn get(&self, index: usize) -> Option<Option<Rc<Watcher>>> {
        self.slots.get(index).cloned()
    }

    /// Tombstone the watcher with `id`. Returns `false` if it is not listed.
    fn remove(&mut self, id: WatchId) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|w| w.id == id))
        {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Drop tombstones. Only safe while no pass is iterating this list.
    pub(crate) fn compact(&mut self) {
        self.slots.retain(Option::is_some);
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Live watchers.
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Handle returned by every registration; undoes it when called.
///
/// Calling [`deregister`](Self::deregister) more than once is harmless.
/// Dropping the handle does *not* deregister.
#[derive(Clone)]
pub struct Deregistration {
    action: Option<Rc<dyn Fn()>>,
}

impl Deregistration {
    pub(crate) fn new(action: impl Fn() + 'static) -> Self {
        Self {
            action: Some(Rc::new(action)),
        }
    }

    /// A handle with nothing to undo.
    pub(crate) fn inert() -> Self {
        Self { action: None }
    }

    /// Undo the registration.
    pub fn deregister(&self) {
        if let Some(action) = &self.action {
            action();
        }
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deregistration")
            .field("inert", &self.action.is_none())
            .finish()
    }
}

impl Scope {
    /// Watch a value with reference equality.
    ///
    /// `watch_fn` runs on every digest pass that reaches this scope. Whenever
    /// its result differs from the previous one, `listener` receives
    /// `(new, old, scope)`. On the first call `old` is `new`.
    ///
    /// # Example
    /// ```ignore
    /// scope.set("counter", 0);
    /// scope.watch(
    ///     |scope| scope.get("name"),
    ///     |_new, _old, scope| {
    ///         let n = scope.get("counter").as_f64().unwrap_or(0.0);
    ///         scope.set("counter", n + 1.0);
    ///     },
    /// );
    /// scope.set("name", "Jane");
    /// scope.digest()?; // counter == 1
    /// ```
    pub fn watch<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.watch_with(watch_fn, listener, Equality::Reference)
    }

    /// Register a watch function with no reaction; useful for side effects that must
    /// run on every digest pass.
    pub fn watch_without_listener<W>(&self, watch_fn: W) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        self.watch_with(watch_fn, |_, _, _| {}, Equality::Reference)
    }

    /// Watch a value with an explicit equality policy.
    ///
    /// With [`Equality::Structural`] the watcher keeps a deep copy of the last
    /// value, so in-place mutation of the same array/object is detected.
    pub fn watch_with<W, L>(&self, watch_fn: W, listener: L, equality: Equality) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        if self.is_destroyed() {
            return Deregistration::inert();
        }

        let context = self.context();
        let id = WatchId::next();
        let watcher = Rc::new(Watcher {
            id,
            watch_fn: Box::new(watch_fn),
            listener: Box::new(listener),
            equality,
            last: RefCell::new(None),
        });

        self.inner.watchers.borrow_mut().push(watcher);
        // A pass in progress must not short-circuit before reaching the new watcher
        context.clear_last_dirty_watch();

        let scope: Weak<ScopeInner> = Rc::downgrade(&self.inner);
        Deregistration::new(move || {
            let Some(scope) = scope.upgrade() else {
                return;
            };
            if scope.watchers.borrow_mut().remove(id) {
                scope.context.clear_last_dirty_watch();
            }
        })
    }

    /// Number of live watchers registered directly on this scope.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }
}
