//! Observable value slot.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

use super::computed;
use super::listeners::{EventKind, ListenerSet, Subscription};
use super::node::{NodeId, NodeMeta};

struct CellInner {
    id: NodeId,
    value: RefCell<Value>,
    listeners: Rc<ListenerSet>,
    meta: RefCell<NodeMeta>,
}

/// A gettable/settable slot that notifies listeners when written.
///
/// Cloning a `Cell` creates a new handle to the **same** slot.
///
/// # Invariants
///
/// 1. Writing a scalar equal to the current scalar is a no-op.
/// 2. Every other write fires `BeforeChange` with the outgoing value, stores
///    the new value, then fires `Change` with it.
/// 3. `get()` registers the cell as a dependency of the computed currently
///    evaluating, if any; `peek()` never does.
#[derive(Clone)]
pub struct Cell {
    inner: Rc<CellInner>,
}

impl Cell {
    /// Create a cell holding `value`.
    pub fn new(value: impl Into<Value>) -> Self {
        let id = NodeId::next();
        Self {
            inner: Rc::new(CellInner {
                id,
                value: RefCell::new(value.into()),
                listeners: ListenerSet::new(id),
                meta: RefCell::new(NodeMeta::default()),
            }),
        }
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Read the current value, recording the access for dependency tracking.
    #[must_use]
    pub fn get(&self) -> Value {
        computed::track(&self.inner.listeners);
        self.peek()
    }

    /// Read the current value without dependency tracking.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Write a new value.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let old = self.peek();
        if old.is_scalar() && old == value {
            return;
        }

        self.inner.listeners.notify(EventKind::BeforeChange, &old);
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.listeners.notify(EventKind::Change, &value);
    }

    /// Attach a listener.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.listeners.subscribe(kind, listener)
    }

    /// Number of attached listeners, optionally for one event kind.
    #[must_use]
    pub fn listener_count(&self, kind: Option<EventKind>) -> usize {
        self.inner.listeners.len(kind)
    }

    /// Node annotations.
    #[must_use]
    pub fn meta(&self) -> Ref<'_, NodeMeta> {
        self.inner.meta.borrow()
    }

    pub(crate) fn meta_mut(&self) -> RefMut<'_, NodeMeta> {
        self.inner.meta.borrow_mut()
    }

    /// True when both handles refer to the same slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow().type_name())
            .finish()
    }
}
