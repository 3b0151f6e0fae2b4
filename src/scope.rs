//! The scope tree: data namespaces, hierarchy, isolation and destruction.
//!
//! A [`Scope`] is a cheap, clonable handle. Parents own their children
//! (`children` holds strong handles); every upward link (hierarchy parent,
//! data parent) is weak, so dropping the last handle to a root releases the
//! whole tree.
//!
//! Data lookup is two-tier: a scope checks its own entries first and, unless
//! it is isolated, falls through to the scope it was created from. The
//! fallthrough is live, so a child sees values its parent assigns after the
//! child was created. Writes always land in the writing scope.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::config::{DigestConfig, ScopeBuilder};
use crate::context::Context;
use crate::error::Phase;
use crate::event::ListenerTable;
use crate::hash::OrderedMap;
use crate::value::Value;
use crate::watch::WatchList;

/// A node in the scope tree. Clones share the same node.
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Rc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    pub(crate) context: Rc<Context>,
    isolated: bool,
    /// Own data entries.
    data: RefCell<OrderedMap<Value>>,
    /// Where unset keys fall through to; `None` for roots and isolated scopes.
    data_parent: Option<Weak<ScopeInner>>,
    /// Hierarchy parent: digest, events and lifecycle follow this link.
    parent: Option<Weak<ScopeInner>>,
    pub(crate) children: RefCell<Vec<Scope>>,
    pub(crate) watchers: RefCell<WatchList>,
    pub(crate) listeners: RefCell<ListenerTable>,
    destroyed: Cell<bool>,
}

impl Scope {
    /// Create a root scope with default configuration.
    ///
    /// See [`ScopeBuilder`] for custom TTL, scheduler or exception handler.
    pub fn new() -> Self {
        ScopeBuilder::new().build()
    }

    /// Shorthand for [`ScopeBuilder::new`].
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub(crate) fn new_root(context: Rc<Context>) -> Self {
        let scope = Scope {
            inner: Rc::new(ScopeInner::new(context, false, None, None)),
        };
        scope.inner.context.set_root(Rc::downgrade(&scope.inner));
        scope
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Scope { inner }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Create an ordinary child that inherits this scope's data.
    pub fn new_child(&self) -> Scope {
        self.new_child_with(false, None)
    }

    /// Create an isolated child: no data fallthrough, shared scheduling.
    pub fn new_isolated_child(&self) -> Scope {
        self.new_child_with(true, None)
    }

    /// Create a child scope.
    ///
    /// `hierarchy_parent` (default: `self`) decides where the child sits in
    /// the tree: which scope digests it, broadcasts to it and lists it among
    /// its children. Data always falls through to `self` unless `isolated`.
    ///
    /// Ordinary children share `self`'s scheduling context. Isolated children
    /// share the hierarchy parent's.
    pub fn new_child_with(&self, isolated: bool, hierarchy_parent: Option<&Scope>) -> Scope {
        let parent = hierarchy_parent.unwrap_or(self);

        let (context, data_parent) = if isolated {
            (parent.inner.context.clone(), None)
        } else {
            (self.inner.context.clone(), Some(Rc::downgrade(&self.inner)))
        };

        let child = Scope {
            inner: Rc::new(ScopeInner::new(
                context,
                isolated,
                data_parent,
                Some(Rc::downgrade(&parent.inner)),
            )),
        };
        parent.inner.children.borrow_mut().push(child.clone());
        child
    }

    /// Tear this scope down.
    ///
    /// 1. `$destroy` is broadcast through the subtree while it is still linked.
    /// 2. The scope is removed from its parent's children.
    /// 3. Watchers and listeners of the scope and all its descendants are
    ///    dropped; later registrations on them are inert.
    ///
    /// Queued async/post-digest work submitted from the subtree still runs.
    /// Calling `destroy` twice is a no-op.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }

        self.broadcast("$destroy", &[]);

        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .borrow_mut()
                .retain(|child| !child.ptr_eq(self));
        }

        let mut stack = vec![self.clone()];
        while let Some(scope) = stack.pop() {
            scope.inner.destroyed.set(true);
            scope.inner.watchers.borrow_mut().clear();
            scope.inner.listeners.borrow_mut().clear();
            stack.extend(scope.children());
        }

        debug!(root = self.is_root(), "scope destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has run on this scope or an ancestor.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Look `key` up here, then (unless isolated) in the scopes this one
    /// inherits from. Unset keys yield `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        if let Some(value) = self.inner.data.borrow().get(key) {
            return value.clone();
        }

        let mut next = self.inner.data_parent.as_ref().and_then(Weak::upgrade);
        while let Some(scope) = next {
            if let Some(value) = scope.data.borrow().get(key) {
                return value.clone();
            }
            next = scope.data_parent.as_ref().and_then(Weak::upgrade);
        }
        Value::Undefined
    }

    /// Bind `key` on this scope, shadowing any inherited binding.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.data.borrow_mut().insert(key.into(), value.into());
    }

    /// Whether `key` is bound on this scope itself.
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.data.borrow().contains_key(key)
    }

    /// Remove this scope's own binding, uncovering any inherited one.
    pub fn remove_own(&self, key: &str) -> Option<Value> {
        self.inner.data.borrow_mut().shift_remove(key)
    }

    /// Keys bound on this scope itself, in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        self.inner.data.borrow().keys().cloned().collect()
    }

    /// The root of the tree this scope schedules with.
    ///
    /// Falls back to `self` if the root has already been dropped.
    pub fn root(&self) -> Scope {
        self.inner
            .context
            .root()
            .upgrade()
            .map_or_else(|| self.clone(), Scope::from_inner)
    }

    /// The hierarchy parent, if any.
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Scope::from_inner)
    }

    /// Current children in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children.borrow().clone()
    }

    /// `true` for scopes built by [`Scope::new`] / [`ScopeBuilder::build`].
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// `true` for scopes created isolated.
    pub fn is_isolated(&self) -> bool {
        self.inner.isolated
    }

    /// Whether both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The active phase of this scope's tree, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.inner.context.phase()
    }

    /// Digest settings of this scope's tree.
    pub fn config(&self) -> DigestConfig {
        self.inner.context.config
    }
}

impl ScopeInner {
    fn new(
        context: Rc<Context>,
        isolated: bool,
        data_parent: Option<Weak<ScopeInner>>,
        parent: Option<Weak<ScopeInner>>,
    ) -> Self {
        Self {
            context,
            isolated,
            data: RefCell::default(),
            data_parent,
            parent,
            children: RefCell::default(),
            watchers: RefCell::default(),
            listeners: RefCell::default(),
            destroyed: Cell::new(false),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("ptr", &Rc::as_ptr(&self.inner))
            .field("isolated", &self.inner.isolated)
            .field("destroyed", &self.inner.destroyed.get())
            .field("data", &*self.inner.data.borrow())
            .finish()
    }
}
