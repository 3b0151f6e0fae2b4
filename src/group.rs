//! Watching several values with one listener.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::scope::Scope;
use crate::value::Value;
use crate::watch::Deregistration;

/// A boxed watch function, as taken by [`Scope::watch_group`].
pub type BoxedWatchFn = Box<dyn Fn(&Scope) -> Value>;

struct GroupState {
    new_values: Vec<Value>,
    old_values: Vec<Value>,
    /// A combined listener call is already queued for this digest.
    scheduled: bool,
    first_run: bool,
}

impl Scope {
    /// Watch several values and react to any of them changing with a single
    /// listener call per digest.
    ///
    /// The listener receives `(new_values, old_values, scope)`, one slot per
    /// watch function. On its first call both slices are the same slice. The
    /// call itself is queued with [`eval_async`](Self::eval_async), so it
    /// runs later in the same digest and at most once however many
    /// constituents changed.
    ///
    /// With no watch functions the listener is called once, asynchronously,
    /// with empty slices, unless deregistered before that.
    ///
    /// # Example
    /// ```ignore
    /// let fns: Vec<BoxedWatchFn> = vec![
    ///     Box::new(|s: &Scope| s.get("first")),
    ///     Box::new(|s: &Scope| s.get("last")),
    /// ];
    /// scope.watch_group(fns, |new, _old, scope| {
    ///     scope.set("full", format!("{:?} {:?}", new[0], new[1]));
    /// });
    /// ```
    pub fn watch_group<I, L>(&self, watch_fns: I, listener: L) -> Deregistration
    where
        I: IntoIterator<Item = BoxedWatchFn>,
        L: Fn(&[Value], &[Value], &Scope) + 'static,
    {
        let watch_fns: Vec<BoxedWatchFn> = watch_fns.into_iter().collect();

        if watch_fns.is_empty() {
            let should_call = Rc::new(Cell::new(true));
            let should_call_clone = should_call.clone();
            self.eval_async(move |scope| {
                if should_call_clone.get() {
                    listener(&[], &[], scope);
                }
            });
            return Deregistration::new(move || should_call.set(false));
        }

        let listener = Rc::new(listener);
        let state = Rc::new(RefCell::new(GroupState {
            new_values: vec![Value::Undefined; watch_fns.len()],
            old_values: vec![Value::Undefined; watch_fns.len()],
            scheduled: false,
            first_run: true,
        }));

        let handles: Vec<Deregistration> = watch_fns
            .into_iter()
            .enumerate()
            .map(|(slot, watch_fn)| {
                let state = state.clone();
                let listener = listener.clone();
                self.watch(watch_fn, move |new_value, old_value, scope| {
                    {
                        let mut group = state.borrow_mut();
                        group.new_values[slot] = new_value.clone();
                        group.old_values[slot] = old_value.clone();
                        if group.scheduled {
                            return;
                        }
                        group.scheduled = true;
                    }

                    let state = state.clone();
                    let listener = listener.clone();
                    scope.eval_async(move |scope| {
                        let (new_values, old_values, first_run) = {
                            let mut group = state.borrow_mut();
                            group.scheduled = false;
                            let first_run = std::mem::replace(&mut group.first_run, false);
                            (group.new_values.clone(), group.old_values.clone(), first_run)
                        };
                        if first_run {
                            listener(&new_values, &new_values, scope);
                        } else {
                            listener(&new_values, &old_values, scope);
                        }
                    });
                })
            })
            .collect();

        Deregistration::new(move || {
            for handle in &handles {
                handle.deregister();
            }
        })
    }
}
