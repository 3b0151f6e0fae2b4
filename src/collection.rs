//! Shallow collection watching.
//!
//! A reference watch misses in-place mutation and a structural watch deep
//! copies on every change. `watch_collection` sits between them: it keeps a
//! one-level shadow of the watched value and counts differences against it.
//! The count is what the underlying reference watch compares, so any number of
//! differences found in one pass is a single change.

use std::cell::RefCell;
use std::rc::Rc;

use crate::hash::OrderedMap;
use crate::scope::Scope;
use crate::value::Value;
use crate::watch::Deregistration;

/// One-level copy of the last observed value, by classification.
enum Shadow {
    Scalar(Value),
    Array(Vec<Value>),
    Keyed(OrderedMap<Value>),
}

impl Shadow {
    /// Compare `value` against the shadow, update the shadow to match and
    /// return how many differences were found.
    fn observe(&mut self, value: &Value) -> u64 {
        if let Some(length) = value.array_like_len() {
            self.observe_array_like(value, length)
        } else if let Value::Object(object) = value {
            self.observe_keyed(&object.borrow())
        } else {
            let changed = match self {
                Shadow::Scalar(old) => !value.same(old),
                _ => true,
            };
            *self = Shadow::Scalar(value.clone());
            u64::from(changed)
        }
    }

    fn observe_array_like(&mut self, value: &Value, length: usize) -> u64 {
        let mut changes = 0;
        if !matches!(self, Shadow::Array(_)) {
            *self = Shadow::Array(Vec::new());
            changes += 1;
        }
        let Shadow::Array(items) = self else {
            unreachable!("shadow was just made an array");
        };

        if items.len() != length {
            items.resize(length, Value::Undefined);
            changes += 1;
        }
        for (index, old) in items.iter_mut().enumerate() {
            let item = value.array_like_get(index);
            if !item.same(old) {
                *old = item;
                changes += 1;
            }
        }
        changes
    }

    fn observe_keyed(&mut self, entries: &OrderedMap<Value>) -> u64 {
        let mut changes = 0;
        if !matches!(self, Shadow::Keyed(_)) {
            *self = Shadow::Keyed(OrderedMap::default());
            changes += 1;
        }
        let Shadow::Keyed(shadow) = self else {
            unreachable!("shadow was just made keyed");
        };

        for (key, value) in entries {
            match shadow.get_mut(key) {
                Some(old) if old.same(value) => {}
                Some(old) => {
                    *old = value.clone();
                    changes += 1;
                }
                None => {
                    shadow.insert(key.clone(), value.clone());
                    changes += 1;
                }
            }
        }

        // The shadow now holds every current key, so extra length means removals
        if shadow.len() > entries.len() {
            shadow.retain(|key, _| entries.contains_key(key));
            changes += 1;
        }
        changes
    }
}

enum CollectionListener {
    WithOld(Box<dyn Fn(&Value, &Value, &Scope)>),
    NewOnly(Box<dyn Fn(&Value, &Scope)>),
}

struct CollectionState {
    shadow: Shadow,
    change_count: u64,
    new_value: Value,
    /// Shallow copy taken after the previous listener call.
    very_old_value: Value,
    first_run: bool,
}

impl Scope {
    /// Watch an array or object shallowly.
    ///
    /// Fires once per digest pass in which the value switched between
    /// scalar/array-like/keyed, or when an array-like value changed length or
    /// had an element replaced, or when a keyed value gained, lost or replaced
    /// an entry. Elements are compared by reference (NaN-aware). Scalars behave
    /// like a plain [`watch`](Self::watch).
    ///
    /// The listener receives the live value as `new` and, as `old`, a shallow
    /// copy taken after its previous call (the live value on the first call).
    /// Use [`watch_collection_new`](Self::watch_collection_new) to skip taking
    /// that copy.
    pub fn watch_collection<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.watch_collection_inner(watch_fn, CollectionListener::WithOld(Box::new(listener)))
    }

    /// Like [`watch_collection`](Self::watch_collection) for listeners that
    /// only need the new value. No old-value copy is ever made.
    pub fn watch_collection_new<W, L>(&self, watch_fn: W, listener: L) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Scope) + 'static,
    {
        self.watch_collection_inner(watch_fn, CollectionListener::NewOnly(Box::new(listener)))
    }

    fn watch_collection_inner<W>(&self, watch_fn: W, listener: CollectionListener) -> Deregistration
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        let state = Rc::new(RefCell::new(CollectionState {
            shadow: Shadow::Scalar(Value::Undefined),
            change_count: 0,
            new_value: Value::Undefined,
            very_old_value: Value::Undefined,
            first_run: true,
        }));

        let watch_state = state.clone();
        let internal_watch = move |scope: &Scope| {
            let new_value = watch_fn(scope);
            let mut state = watch_state.borrow_mut();
            let changes = state.shadow.observe(&new_value);
            state.change_count += changes;
            state.new_value = new_value;
            Value::from(state.change_count)
        };

        let internal_listener = move |_: &Value, _: &Value, scope: &Scope| {
            let (new_value, old_value) = {
                let mut state = state.borrow_mut();
                let new_value = state.new_value.clone();
                let old_value = if std::mem::replace(&mut state.first_run, false) {
                    new_value.clone()
                } else {
                    state.very_old_value.clone()
                };
                (new_value, old_value)
            };

            match &listener {
                CollectionListener::WithOld(listener) => {
                    listener(&new_value, &old_value, scope);
                    state.borrow_mut().very_old_value = new_value.shallow_clone();
                }
                CollectionListener::NewOnly(listener) => listener(&new_value, scope),
            }
        };

        self.watch(internal_watch, internal_listener)
    }
}
