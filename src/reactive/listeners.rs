//! Listener storage shared by every reactive primitive.
//!
//! A `ListenerSet` owns the callbacks attached to one primitive. `subscribe`
//! hands back a `Subscription` that can dispose exactly that callback, so
//! callers never need to inspect the set to find their own listeners.
//!
//! Notification snapshots the listener list before invoking anything, which
//! makes it safe for a listener to subscribe, dispose, or write back into the
//! same primitive. A listener disposed mid-notification is skipped for the
//! rest of that notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

use super::node::NodeId;

type Flag = Rc<std::cell::Cell<bool>>;
type Listener = Rc<dyn Fn(&Value)>;

/// Event a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Fired with the current value just before a write replaces it.
    BeforeChange,
    /// Fired with the new value after a write.
    Change,
}

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    id: SubscriptionId,
    kind: EventKind,
    active: Flag,
    listener: Listener,
}

/// Callbacks attached to a single reactive primitive.
pub struct ListenerSet {
    node: NodeId,
    entries: RefCell<Vec<Entry>>,
}

impl ListenerSet {
    pub(crate) fn new(node: NodeId) -> Rc<Self> {
        Rc::new(Self {
            node,
            entries: RefCell::new(Vec::new()),
        })
    }

    /// The primitive these listeners belong to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn subscribe(
        self: &Rc<Self>,
        kind: EventKind,
        listener: impl Fn(&Value) + 'static,
    ) -> Subscription {
        let id = SubscriptionId::new();
        let active: Flag = Rc::new(std::cell::Cell::new(true));
        self.entries.borrow_mut().push(Entry {
            id,
            kind,
            active: Rc::clone(&active),
            listener: Rc::new(listener),
        });

        Subscription {
            id,
            kind,
            node: self.node,
            owner: Rc::downgrade(self),
            active,
        }
    }

    pub(crate) fn notify(&self, kind: EventKind, value: &Value) {
        let targets: Vec<(Flag, Listener)> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (Rc::clone(&e.active), Rc::clone(&e.listener)))
            .collect();

        for (active, listener) in targets {
            if active.get() {
                listener(value);
            }
        }
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        // The entry is dropped after the borrow ends: dropping a listener may
        // release the last handle to state that touches this set again.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries.iter().position(|e| e.id == id).map(|pos| entries.remove(pos))
        };
        match removed {
            Some(entry) => {
                entry.active.set(false);
                true
            }
            None => false,
        }
    }

    /// Number of live listeners, optionally restricted to one event kind.
    #[must_use]
    pub fn len(&self, kind: Option<EventKind>) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .count()
    }

    /// True when no listener is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("node", &self.node)
            .field("listeners", &self.entries.borrow().len())
            .finish()
    }
}

/// Handle to one attached listener.
///
/// Cloning yields another handle to the same listener. Dropping a handle does
/// not detach the listener; call [`Subscription::dispose`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    node: NodeId,
    owner: Weak<ListenerSet>,
    active: Flag,
}

impl Subscription {
    /// Subscription identity.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event this listener is attached to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Primitive this listener is attached to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the listener is still attached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Detach the listener. Returns `false` if it was already detached.
    ///
    /// Idempotent; disposing a subscription whose primitive is gone is a no-op.
    pub fn dispose(&self) -> bool {
        if !self.active.replace(false) {
            return false;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.remove(self.id);
        }
        true
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("active", &self.active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_reaches_matching_kind_only() {
        let set = ListenerSet::new(NodeId::next());
        let hits = Rc::new(RefCell::new(Vec::new()));

        let h = Rc::clone(&hits);
        let _change = set.subscribe(EventKind::Change, move |v| {
            h.borrow_mut().push(("change", v.clone()));
        });
        let h = Rc::clone(&hits);
        let _before = set.subscribe(EventKind::BeforeChange, move |v| {
            h.borrow_mut().push(("before", v.clone()));
        });

        set.notify(EventKind::Change, &Value::Int(1));
        assert_eq!(*hits.borrow(), vec![("change", Value::Int(1))]);
        assert_eq!(set.len(None), 2);
        assert_eq!(set.len(Some(EventKind::BeforeChange)), 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let set = ListenerSet::new(NodeId::next());
        let sub = set.subscribe(EventKind::Change, |_| {});
        assert!(sub.is_active());
        assert!(sub.dispose());
        assert!(!sub.dispose());
        assert!(set.is_empty());
    }

    #[test]
    fn test_listener_disposed_mid_notification_is_skipped() {
        let set = ListenerSet::new(NodeId::next());
        let calls = Rc::new(std::cell::Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let v = Rc::clone(&victim);
        let _killer = set.subscribe(EventKind::Change, move |_| {
            if let Some(sub) = v.borrow().as_ref() {
                sub.dispose();
            }
        });
        let c = Rc::clone(&calls);
        *victim.borrow_mut() = Some(set.subscribe(EventKind::Change, move |_| c.set(c.get() + 1)));

        set.notify(EventKind::Change, &Value::Null);
        assert_eq!(calls.get(), 0);
        assert_eq!(set.len(None), 1);
    }

    #[test]
    fn test_dispose_after_owner_dropped() {
        let set = ListenerSet::new(NodeId::next());
        let sub = set.subscribe(EventKind::Change, |_| {});
        drop(set);
        assert!(sub.dispose());
        assert!(!sub.is_active());
    }
}
