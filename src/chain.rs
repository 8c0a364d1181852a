//! Ancestor sequences built during traversal.
//!
//! Both types are persistent cons lists: `push` returns a new sequence that
//! shares its tail with the receiver, so extending the chain for one branch
//! can never change what a sibling branch sees.

use std::fmt;
use std::rc::Rc;

use crate::reactive::NodeId;
use crate::value::Value;

struct Link<T> {
    item: T,
    prev: Option<Rc<Link<T>>>,
}

struct Stack<T> {
    head: Option<Rc<Link<T>>>,
    len: usize,
}

impl<T> Clone for Stack<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<T> Stack<T> {
    fn push(&self, item: T) -> Self {
        Self {
            head: Some(Rc::new(Link {
                item,
                prev: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::successors(self.head.as_deref(), |link| link.prev.as_deref())
            .map(|link| &link.item)
    }
}

/// Ancestors of the node being visited, from the root side to the
/// immediate parent.
///
/// The watch root itself is never part of the chain. Transparent containers
/// (plain lists, a primitive's unwrapped value) are not added either.
#[derive(Clone, Default)]
pub struct ParentChain(Stack<Value>);

impl ParentChain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new chain with `node` appended as the nearest ancestor.
    #[must_use]
    pub fn push(&self, node: Value) -> Self {
        Self(self.0.push(node))
    }

    /// Number of ancestors in the chain.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len
    }

    /// True for the chain of the root.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.len == 0
    }

    /// Immediate parent.
    #[must_use]
    pub fn last(&self) -> Option<&Value> {
        self.0.iter().next()
    }

    /// Ancestors, nearest first.
    pub fn iter_nearest(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    /// Ancestors, root side first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        let mut out: Vec<Value> = self.0.iter().cloned().collect();
        out.reverse();
        out
    }

    /// Whether `node` is an ancestor.
    #[must_use]
    pub fn contains(&self, node: &Value) -> bool {
        self.0.iter().any(|v| v == node)
    }
}

impl fmt::Debug for ParentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.to_vec().iter().map(|v| (v.type_name(), v.node_id())))
            .finish()
    }
}

/// Identities of every node on the path from the root, transparent nodes
/// included. Used for cycle detection.
#[derive(Clone, Default)]
pub struct VisitPath(Stack<NodeId>);

impl VisitPath {
    /// An empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new path with `id` appended.
    #[must_use]
    pub fn push(&self, id: NodeId) -> Self {
        Self(self.0.push(id))
    }

    /// Whether `id` was visited on this path.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.iter().any(|&v| v == id)
    }

    /// Number of nodes on the path.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len
    }

    /// True when nothing was visited yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.len == 0
    }
}

impl fmt::Debug for VisitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Position of a node during traversal.
#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    pub(crate) parents: ParentChain,
    pub(crate) path: VisitPath,
    pub(crate) level: usize,
    /// The node at this position is a primitive's unwrapped value and is not
    /// reported as a parent of its own children.
    pub(crate) transparent: bool,
}

impl Frame {
    pub(crate) fn root() -> Self {
        Self::default()
    }

    /// The watch root is the only node visited with an empty path.
    pub(crate) const fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    fn extend(&self, node: &Value, report: bool, step: usize, transparent: bool) -> Self {
        let parents = if report && !self.transparent && !self.is_root() {
            self.parents.push(node.clone())
        } else {
            self.parents.clone()
        };
        let path = match node.node_id() {
            Some(id) => self.path.push(id),
            None => self.path.clone(),
        };
        Self {
            parents,
            path,
            level: self.level + step,
            transparent,
        }
    }

    /// Frame for a field of `node` or an item of a collection cell.
    pub(crate) fn child(&self, node: &Value) -> Self {
        self.extend(node, true, 1, false)
    }

    /// Frame for the current value of primitive `node`. Costs no depth.
    pub(crate) fn unwrap(&self, node: &Value) -> Self {
        self.extend(node, true, 0, true)
    }

    /// Frame for an item of plain list `node`, which is never a parent.
    pub(crate) fn through(&self, node: &Value) -> Self {
        self.extend(node, false, 1, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;
    use crate::value::Object;

    #[test]
    fn test_frame_parents() {
        let model = Value::from(Object::new());
        let sub = Value::from(Cell::new(1));
        let sub_value = Value::from(Object::new());
        let plain = Value::list(Vec::new());

        let top = Frame::root();
        assert!(top.is_root());

        // Root fields: the root is never a parent.
        let fields = top.child(&model);
        assert!(fields.parents.is_empty());
        assert_eq!(fields.level, 1);

        // A primitive is the parent of its value's fields; the value is not.
        let value = fields.unwrap(&sub);
        assert_eq!(value.level, 1);
        let nested = value.child(&sub_value);
        assert_eq!(nested.parents.to_vec(), vec![sub.clone()]);
        assert_eq!(nested.level, 2);
        assert!(nested.path.contains(sub_value.node_id().unwrap()));
        assert!(nested.path.contains(model.node_id().unwrap()));

        // Plain lists are skipped in the parents but not in the path.
        let items = nested.through(&plain);
        assert_eq!(items.parents.len(), 1);
        assert_eq!(items.level, 3);
        assert!(items.path.contains(plain.node_id().unwrap()));
    }

    #[test]
    fn test_push_does_not_affect_siblings() {
        let root = Value::from(Object::new());
        let base = ParentChain::new().push(root.clone());
        let left = base.push(Value::from(Cell::new(1)));
        let right = base.push(Value::from(Cell::new(2)));

        assert_eq!(base.len(), 1);
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
        assert_ne!(left.last(), right.last());
        assert_eq!(left.to_vec()[0], root);
    }

    #[test]
    fn test_order_and_membership() {
        let a = Value::from(Object::new());
        let b = Value::from(Cell::new(1));
        let chain = ParentChain::new().push(a.clone()).push(b.clone());

        assert_eq!(chain.to_vec(), vec![a.clone(), b.clone()]);
        assert_eq!(chain.iter_nearest().next(), Some(&b));
        assert!(chain.contains(&a));
        assert!(!chain.contains(&Value::from(Object::new())));
        assert!(ParentChain::new().is_empty());
    }

    #[test]
    fn test_visit_path() {
        let a = Object::new();
        let path = VisitPath::new().push(a.id());
        assert!(path.contains(a.id()));
        assert!(!VisitPath::new().contains(a.id()));
        assert_eq!(path.len(), 1);
    }
}
