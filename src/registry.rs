//! Subscription bookkeeping.
//!
//! Every hook the engine attaches is recorded under the node it observes and
//! the watch that created it. Teardown looks hooks up here instead of
//! inspecting the primitive's listener storage, so it only ever disposes
//! hooks it created, no matter how many other watchers observe the same node.
//!
//! Hooks are removed from the registry first and disposed afterwards, so a
//! disposal that re-enters the engine never finds the registry borrowed.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reactive::{Computed, NodeId, Subscription};

/// Unique identifier for one `watch` call.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(Uuid);

impl WatchId {
    /// Create a new random watch id.
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

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something attached to a node that must be released on teardown.
#[derive(Debug)]
pub(crate) enum Hook {
    /// A listener on a primitive.
    Listener(Subscription),
    /// The computed tracking a function target.
    Tracker(Computed),
}

impl Hook {
    pub(crate) fn dispose(&self) {
        match self {
            Self::Listener(sub) => {
                sub.dispose();
            }
            Self::Tracker(computed) => computed.dispose(),
        }
    }
}

/// Which hooks a teardown removes from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Every hook created under the watch context.
    Context,
    /// Only the hooks of one watch.
    Watch(WatchId),
}

impl Scope {
    fn covers(self, watch: WatchId) -> bool {
        match self {
            Self::Context => true,
            Self::Watch(id) => id == watch,
        }
    }
}

#[derive(Debug)]
struct Entry {
    watch: WatchId,
    hook: Hook,
}

/// Hooks of one watch context, keyed by observed node.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: HashMap<NodeId, Vec<Entry>>,
}

impl Registry {
    /// Whether `watch` holds a hook on `node`.
    #[must_use]
    pub fn has(&self, node: NodeId, watch: WatchId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|entries| entries.iter().any(|e| e.watch == watch))
    }

    /// Whether any watch holds a hook on `node`.
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub(crate) fn insert(&mut self, node: NodeId, watch: WatchId, hook: Hook) {
        self.nodes.entry(node).or_default().push(Entry { watch, hook });
    }

    /// Remove the hooks on `node` covered by `scope`.
    pub(crate) fn take(&mut self, node: NodeId, scope: Scope) -> Vec<Hook> {
        let Some(entries) = self.nodes.get_mut(&node) else {
            return Vec::new();
        };
        let (taken, kept): (Vec<Entry>, Vec<Entry>) =
            entries.drain(..).partition(|e| scope.covers(e.watch));
        if kept.is_empty() {
            self.nodes.remove(&node);
        } else {
            *entries = kept;
        }
        taken.into_iter().map(|e| e.hook).collect()
    }

    /// Remove every hook of `watch`, wherever it is attached.
    pub(crate) fn take_watch(&mut self, watch: WatchId) -> Vec<Hook> {
        let mut taken = Vec::new();
        self.nodes.retain(|_, entries| {
            let (mine, others): (Vec<Entry>, Vec<Entry>) =
                entries.drain(..).partition(|e| e.watch == watch);
            taken.extend(mine.into_iter().map(|e| e.hook));
            *entries = others;
            !entries.is_empty()
        });
        taken
    }

    /// Number of hooks held by `watch`.
    #[must_use]
    pub fn count(&self, watch: WatchId) -> usize {
        self.nodes
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|e| e.watch == watch)
            .count()
    }

    /// Number of nodes `watch` is attached to.
    #[must_use]
    pub fn node_count(&self, watch: WatchId) -> usize {
        self.nodes
            .values()
            .filter(|entries| entries.iter().any(|e| e.watch == watch))
            .count()
    }

    /// Total number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    /// True when no hook is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, EventKind};

    #[test]
    fn test_scoped_take() {
        let cell = Cell::new(1);
        let (w1, w2) = (WatchId::new(), WatchId::new());
        let mut registry = Registry::default();
        registry.insert(cell.id(), w1, Hook::Listener(cell.subscribe(EventKind::Change, |_| {})));
        registry.insert(cell.id(), w2, Hook::Listener(cell.subscribe(EventKind::Change, |_| {})));

        assert!(registry.has(cell.id(), w1));
        assert!(registry.is_attached(cell.id()));
        assert_eq!(registry.len(), 2);

        let hooks = registry.take(cell.id(), Scope::Watch(w1));
        assert_eq!(hooks.len(), 1);
        hooks.iter().for_each(Hook::dispose);
        assert!(!registry.has(cell.id(), w1));
        assert!(registry.has(cell.id(), w2));
        assert_eq!(cell.listener_count(None), 1);

        let hooks = registry.take(cell.id(), Scope::Context);
        hooks.iter().for_each(Hook::dispose);
        assert!(registry.is_empty());
        assert!(!registry.is_attached(cell.id()));
        assert_eq!(cell.listener_count(None), 0);
    }

    #[test]
    fn test_take_missing_is_noop() {
        let mut registry = Registry::default();
        assert!(registry.take(Cell::new(0).id(), Scope::Context).is_empty());
    }

    #[test]
    fn test_take_watch_spans_nodes() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let (w1, w2) = (WatchId::new(), WatchId::new());
        let mut registry = Registry::default();
        registry.insert(a.id(), w1, Hook::Listener(a.subscribe(EventKind::Change, |_| {})));
        registry.insert(a.id(), w1, Hook::Listener(a.subscribe(EventKind::BeforeChange, |_| {})));
        registry.insert(b.id(), w1, Hook::Listener(b.subscribe(EventKind::Change, |_| {})));
        registry.insert(b.id(), w2, Hook::Listener(b.subscribe(EventKind::Change, |_| {})));

        assert_eq!(registry.count(w1), 3);
        assert_eq!(registry.node_count(w1), 2);

        let hooks = registry.take_watch(w1);
        assert_eq!(hooks.len(), 3);
        hooks.iter().for_each(Hook::dispose);
        assert_eq!(registry.count(w1), 0);
        assert_eq!(registry.count(w2), 1);
        assert_eq!(a.listener_count(None), 0);
        assert_eq!(b.listener_count(None), 1);
    }
}
