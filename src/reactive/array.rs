//! Observable ordered collection.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::value::{List, Value};

use super::computed;
use super::listeners::{EventKind, ListenerSet, Subscription};
use super::node::{NodeId, NodeMeta};

struct ArrayInner {
    id: NodeId,
    items: RefCell<Vec<Value>>,
    listeners: Rc<ListenerSet>,
    meta: RefCell<NodeMeta>,
}

/// An ordered, mutable sequence that notifies listeners on every mutation.
///
/// Listeners receive snapshots: `BeforeChange` carries the items as they were
/// before the mutation and `Change` the items after it, both as detached
/// [`List`] values. Diffing the two snapshots yields the precise edit script
/// (see [`crate::diff::compare`]).
///
/// Mutations that cannot change anything (`pop`/`shift` on an empty
/// collection, `remove` of an absent item) do not notify.
#[derive(Clone)]
pub struct ArrayCell {
    inner: Rc<ArrayInner>,
}

impl ArrayCell {
    /// Create a collection holding `items`.
    pub fn new(items: Vec<Value>) -> Self {
        let id = NodeId::next();
        Self {
            inner: Rc::new(ArrayInner {
                id,
                items: RefCell::new(items),
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

    /// Read the items, recording the access for dependency tracking.
    #[must_use]
    pub fn get(&self) -> Vec<Value> {
        computed::track(&self.inner.listeners);
        self.peek()
    }

    /// Read the items without dependency tracking.
    #[must_use]
    pub fn peek(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Item at `index`, untracked.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// True when the collection holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Position of the first item equal to `value`.
    #[must_use]
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.inner.items.borrow().iter().position(|v| v == value)
    }

    /// Whether any item equals `value`.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// Replace the whole content.
    pub fn set(&self, items: Vec<Value>) {
        self.mutate(|current| {
            *current = items;
        });
    }

    /// Append an item.
    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        self.mutate(|items| items.push(value));
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.mutate(Vec::pop)
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.mutate(|items| Some(items.remove(0)))
    }

    /// Insert an item at the front.
    pub fn unshift(&self, value: impl Into<Value>) {
        let value = value.into();
        self.mutate(|items| items.insert(0, value));
    }

    /// Remove `delete_count` items starting at `start` and insert `insert` in
    /// their place. Out-of-range arguments are clamped. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Remove every item equal to `value`. Returns the removed items.
    pub fn remove(&self, value: &Value) -> Vec<Value> {
        if !self.contains(value) {
            return Vec::new();
        }
        self.mutate(|items| {
            let mut removed = Vec::new();
            items.retain(|v| {
                if v == value {
                    removed.push(v.clone());
                    false
                } else {
                    true
                }
            });
            removed
        })
    }

    /// Remove every item.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.mutate(Vec::clear);
    }

    /// Attach a listener. Payloads are [`Value::List`] snapshots.
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

    /// True when both handles refer to the same collection.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn snapshot(&self) -> Value {
        Value::List(List::new(self.peek()))
    }

    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let before = self.snapshot();
        self.inner.listeners.notify(EventKind::BeforeChange, &before);

        let result = {
            let mut items = self.inner.items.borrow_mut();
            op(&mut items)
        };

        let after = self.snapshot();
        self.inner.listeners.notify(EventKind::Change, &after);
        result
    }
}

impl fmt::Debug for ArrayCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayCell")
            .field("id", &self.inner.id)
            .field("len", &self.inner.items.borrow().len())
            .finish()
    }
}

impl FromIterator<Value> for ArrayCell {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
