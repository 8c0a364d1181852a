//! Node identity and per-node annotations.
//!
//! Every non-scalar value (composites, reactive primitives, functions) is a
//! node with a stable identity and a small annotation record. The watch engine
//! stamps flags on these annotations; they are visible to every later watch
//! call on the same node.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric identity.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Annotations carried by every node.
#[derive(Debug, Clone, Default)]
pub struct NodeMeta {
    /// Explicit watchable override. `None` means "never stamped".
    pub(crate) watchable: Option<bool>,
    /// Set by a sealing watch; later watch calls skip the node.
    pub(crate) sealed: bool,
    /// Field name that first reached this node (tagFields).
    pub(crate) field_name: Option<String>,
    /// Prior values, newest first.
    pub(crate) old_values: VecDeque<Value>,
}

impl NodeMeta {
    /// Explicit watchable flag, if one was ever stamped.
    #[must_use]
    pub const fn watchable(&self) -> Option<bool> {
        self.watchable
    }

    /// Whether a sealing watch has claimed this node.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Field name tag.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Retained prior values, newest first.
    #[must_use]
    pub fn old_values(&self) -> Vec<Value> {
        self.old_values.iter().cloned().collect()
    }

    /// Push `value` to the front of the history, keeping at most `limit` entries.
    pub(crate) fn record_old_value(&mut self, value: Value, limit: usize) {
        if limit == 0 {
            return;
        }
        self.old_values.push_front(value);
        self.old_values.truncate(limit);
    }
}
