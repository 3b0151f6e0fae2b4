//! Scope events: `on`, `emit` and `broadcast`.
//!
//! Listeners are kept per scope and per event name in registration order.
//! Deregistering tombstones the slot; the next dispatch on that scope removes
//! it. A listener registered during a dispatch on the same scope runs in that
//! same dispatch.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{CallbackOrigin, guarded};
use crate::hash::FastMap;
use crate::scope::{Scope, ScopeInner};
use crate::value::Value;
use crate::watch::Deregistration;

type EventListener = Rc<dyn Fn(&Event, &[Value])>;

/// Per-scope listeners by event name. `None` marks a deregistered listener.
pub(crate) type ListenerTable = FastMap<Vec<Option<EventListener>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dispatch {
    Emit,
    Broadcast,
}

/// The record handed to every listener of one dispatch and returned by
/// [`Scope::emit`] / [`Scope::broadcast`].
pub struct Event {
    name: String,
    target_scope: Scope,
    current_scope: RefCell<Option<Scope>>,
    dispatch: Dispatch,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    fn new(name: &str, target_scope: &Scope, dispatch: Dispatch) -> Self {
        Self {
            name: name.to_owned(),
            target_scope: target_scope.clone(),
            current_scope: RefCell::new(None),
            dispatch,
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope `emit`/`broadcast` was called on.
    pub fn target_scope(&self) -> &Scope {
        &self.target_scope
    }

    /// The scope whose listeners are running; `None` once dispatch finished.
    pub fn current_scope(&self) -> Option<Scope> {
        self.current_scope.borrow().clone()
    }

    /// Stop an emitted event from reaching further ancestors. Remaining
    /// listeners on the current scope still run. Has no effect on broadcasts.
    pub fn stop_propagation(&self) {
        if self.dispatch == Dispatch::Emit {
            self.propagation_stopped.set(true);
        }
    }

    /// Whether [`stop_propagation`](Self::stop_propagation) took effect.
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    /// Flag the event so the code that dispatched it can skip its default
    /// handling.
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    /// Whether any listener called [`prevent_default`](Self::prevent_default).
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("dispatch", &self.dispatch)
            .field("propagation_stopped", &self.propagation_stopped.get())
            .field("default_prevented", &self.default_prevented.get())
            .finish_non_exhaustive()
    }
}

impl Scope {
    /// Listen for `name` on this scope.
    ///
    /// The listener receives the event record and the extra arguments passed
    /// to `emit`/`broadcast`.
    ///
    /// # Example
    /// ```ignore
    /// child.on("saved", |event, args| {
    ///     println!("{} from {:?}: {:?}", event.name(), event.target_scope(), args);
    /// });
    /// grandchild.emit("saved", &[Value::from(42)]);
    /// ```
    pub fn on<L>(&self, name: &str, listener: L) -> Deregistration
    where
        L: Fn(&Event, &[Value]) + 'static,
    {
        if self.is_destroyed() {
            return Deregistration::inert();
        }

        let listener: EventListener = Rc::new(listener);
        self.inner
            .listeners
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .push(Some(listener.clone()));

        let scope: Weak<ScopeInner> = Rc::downgrade(&self.inner);
        let name = name.to_owned();
        Deregistration::new(move || {
            let Some(scope) = scope.upgrade() else {
                return;
            };
            let mut table = scope.listeners.borrow_mut();
            let Some(slots) = table.get_mut(&name) else {
                return;
            };
            if let Some(slot) = slots
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|l| Rc::ptr_eq(l, &listener)))
            {
                *slot = None;
            }
        })
    }

    /// Dispatch `name` to this scope and then each ancestor in turn.
    ///
    /// Stops after the scope on which a listener called
    /// [`Event::stop_propagation`], or at a destroyed scope.
    pub fn emit(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self, Dispatch::Emit);

        let mut next = Some(self.clone());
        while let Some(scope) = next {
            if scope.is_destroyed() {
                break;
            }
            *event.current_scope.borrow_mut() = Some(scope.clone());
            scope.fire_event(&event, args);
            if event.is_propagation_stopped() {
                break;
            }
            next = scope.parent();
        }

        *event.current_scope.borrow_mut() = None;
        event
    }

    /// Dispatch `name` to this scope and every descendant, pre-order.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self, Dispatch::Broadcast);

        let mut stack = vec![self.clone()];
        while let Some(scope) = stack.pop() {
            *event.current_scope.borrow_mut() = Some(scope.clone());
            scope.fire_event(&event, args);
            let children = scope.inner.children.borrow();
            stack.extend(children.iter().rev().cloned());
        }

        *event.current_scope.borrow_mut() = None;
        event
    }

    /// Run this scope's listeners for `event`, dropping tombstones as they
    /// are met.
    fn fire_event(&self, event: &Event, args: &[Value]) {
        let mut index = 0;
        loop {
            let listener = {
                let mut table = self.inner.listeners.borrow_mut();
                let Some(slots) = table.get_mut(event.name()) else {
                    return;
                };
                match slots.get(index) {
                    None => return,
                    Some(None) => {
                        slots.remove(index);
                        continue;
                    }
                    Some(Some(listener)) => listener.clone(),
                }
            };

            guarded(self.context(), CallbackOrigin::EventListener, || {
                listener(event, args)
            });
            index += 1;
        }
    }
}
