//! Dynamic values that a watch target is built from.
//!
//! A [`Value`] is either a scalar (`Null`, `Bool`, `Int`, `Float`, `String`)
//! or a node. Nodes have identity ([`NodeId`]) and carry [`NodeMeta`]
//! annotations:
//!
//! - [`Object`]: a keyed composite with ordered fields
//! - [`List`]: a plain, non-reactive ordered collection
//! - [`Cell`], [`ArrayCell`], [`Computed`]: reactive primitives
//! - [`Func`]: a zero-argument function
//!
//! Cloning a node clones the handle, never the content. Equality compares
//! scalars by value and nodes by identity.
//!
//! # Examples
//!
//! ```
//! use kyrowatch::{Cell, Object, Value};
//!
//! let model = Object::new()
//!     .with("name", Cell::new("ada"))
//!     .with("tags", Value::list(vec!["x".into()]));
//!
//! let json = Value::from(model).to_json();
//! assert_eq!(json.to_string(), r#"{"name":"ada","tags":["x"]}"#);
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::reactive::{ArrayCell, Cell, Computed, NodeId, NodeMeta};

/// A scalar or a node.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Keyed composite.
    Object(Object),
    /// Plain ordered collection.
    List(List),
    /// Observable slot.
    Cell(Cell),
    /// Observable ordered collection.
    Array(ArrayCell),
    /// Derived cell.
    Computed(Computed),
    /// Zero-argument function.
    Func(Func),
}

impl Value {
    /// Plain list node holding `items`.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(List::new(items))
    }

    /// True for `Null`, `Bool`, `Int`, `Float` and `String`.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::String(_)
        )
    }

    /// True for every value with identity.
    #[must_use]
    pub const fn is_node(&self) -> bool {
        !self.is_scalar()
    }

    /// True for cells, array cells and computeds.
    #[must_use]
    pub const fn is_reactive(&self) -> bool {
        matches!(self, Self::Cell(_) | Self::Array(_) | Self::Computed(_))
    }

    /// True for plain objects and plain lists.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::List(_))
    }

    /// True for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Cell(_) => "cell",
            Self::Array(_) => "array",
            Self::Computed(_) => "computed",
            Self::Func(_) => "function",
        }
    }

    /// Identity of a node; `None` for scalars.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Object(o) => Some(o.id()),
            Self::List(l) => Some(l.id()),
            Self::Cell(c) => Some(c.id()),
            Self::Array(a) => Some(a.id()),
            Self::Computed(c) => Some(c.id()),
            Self::Func(f) => Some(f.id()),
            _ => None,
        }
    }

    /// Read the annotations of a node.
    pub fn with_meta<R>(&self, f: impl FnOnce(&NodeMeta) -> R) -> Option<R> {
        match self {
            Self::Object(o) => Some(f(&*o.meta())),
            Self::List(l) => Some(f(&*l.meta())),
            Self::Cell(c) => Some(f(&*c.meta())),
            Self::Array(a) => Some(f(&*a.meta())),
            Self::Computed(c) => Some(f(&*c.meta())),
            Self::Func(fun) => Some(f(&*fun.meta())),
            _ => None,
        }
    }

    pub(crate) fn with_meta_mut<R>(&self, f: impl FnOnce(&mut NodeMeta) -> R) -> Option<R> {
        match self {
            Self::Object(o) => Some(f(&mut *o.meta_mut())),
            Self::List(l) => Some(f(&mut *l.meta_mut())),
            Self::Cell(c) => Some(f(&mut *c.meta_mut())),
            Self::Array(a) => Some(f(&mut *a.meta_mut())),
            Self::Computed(c) => Some(f(&mut *c.meta_mut())),
            Self::Func(fun) => Some(f(&mut *fun.meta_mut())),
            _ => None,
        }
    }

    /// Explicit watchable flag of a node.
    #[must_use]
    pub fn watchable(&self) -> Option<bool> {
        self.with_meta(NodeMeta::watchable).flatten()
    }

    /// Whether a sealing watch has claimed this node.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.with_meta(NodeMeta::is_sealed).unwrap_or(false)
    }

    /// Field name this node was tagged with.
    #[must_use]
    pub fn field_name(&self) -> Option<String> {
        self.with_meta(|m| m.field_name().map(str::to_string)).flatten()
    }

    /// Retained prior values of a watched primitive, newest first.
    #[must_use]
    pub fn old_values(&self) -> Vec<Value> {
        self.with_meta(NodeMeta::old_values).unwrap_or_default()
    }

    /// Unwrap one level of reactivity without tracking.
    ///
    /// Cells and computeds yield their value, array cells a [`List`]
    /// snapshot of their items; everything else yields itself.
    #[must_use]
    pub fn peek(&self) -> Value {
        match self {
            Self::Cell(c) => c.peek(),
            Self::Computed(c) => c.peek(),
            Self::Array(a) => Self::list(a.peek()),
            other => other.clone(),
        }
    }

    /// The boolean, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The string slice, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The object, if this is an `Object`.
    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// The list, if this is a `List`.
    #[must_use]
    pub const fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// The cell, if this is a `Cell`.
    #[must_use]
    pub const fn as_cell(&self) -> Option<&Cell> {
        match self {
            Self::Cell(v) => Some(v),
            _ => None,
        }
    }

    /// The collection, if this is an `Array`.
    #[must_use]
    pub const fn as_array(&self) -> Option<&ArrayCell> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The computed, if this is a `Computed`.
    #[must_use]
    pub const fn as_computed(&self) -> Option<&Computed> {
        match self {
            Self::Computed(v) => Some(v),
            _ => None,
        }
    }

    /// The function, if this is a `Func`.
    #[must_use]
    pub const fn as_func(&self) -> Option<&Func> {
        match self {
            Self::Func(v) => Some(v),
            _ => None,
        }
    }

    /// Plain JSON snapshot, unwrapping every reactive primitive.
    ///
    /// Back-references to a node already on the current path render as
    /// `null`; functions render as `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<NodeId>) -> serde_json::Value {
        use serde_json::Value as Json;

        let id = self.node_id();
        if let Some(id) = id {
            if !path.insert(id) {
                return Json::Null;
            }
        }

        let json = match self {
            Self::Null | Self::Func(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Object(o) => {
                let mut map = serde_json::Map::new();
                for (key, value) in o.entries() {
                    map.insert(key, value.to_json_inner(path));
                }
                Json::Object(map)
            }
            Self::List(l) => Json::Array(l.items().iter().map(|v| v.to_json_inner(path)).collect()),
            Self::Array(a) => Json::Array(a.peek().iter().map(|v| v.to_json_inner(path)).collect()),
            Self::Cell(c) => c.peek().to_json_inner(path),
            Self::Computed(c) => c.peek().to_json_inner(path),
        };

        if let Some(id) = id {
            path.remove(&id);
        }
        json
    }

    /// Build a plain structure (objects, lists, scalars) from JSON.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::list(items.iter().map(Self::from_json).collect()),
            Json::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (a, b) => match (a.node_id(), b.node_id()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Self::Object(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Self::List(v)
    }
}

impl From<Cell> for Value {
    fn from(v: Cell) -> Self {
        Self::Cell(v)
    }
}

impl From<ArrayCell> for Value {
    fn from(v: ArrayCell) -> Self {
        Self::Array(v)
    }
}

impl From<Computed> for Value {
    fn from(v: Computed) -> Self {
        Self::Computed(v)
    }
}

impl From<Func> for Value {
    fn from(v: Func) -> Self {
        Self::Func(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::list(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// Object
// ============================================================================

struct ObjectInner {
    id: NodeId,
    fields: RefCell<Vec<(String, Value)>>,
    meta: RefCell<NodeMeta>,
}

/// Keyed composite with fields in insertion order.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::from_fields(Vec::new())
    }

    fn from_fields(fields: Vec<(String, Value)>) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: NodeId::next(),
                fields: RefCell::new(fields),
                meta: RefCell::new(NodeMeta::default()),
            }),
        }
    }

    /// Builder-style `set`.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .fields
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace a field. A replaced field keeps its position.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut fields = self.inner.fields.borrow_mut();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => fields.push((key, value)),
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut fields = self.inner.fields.borrow_mut();
        let pos = fields.iter().position(|(k, _)| k == key)?;
        Some(fields.remove(pos).1)
    }

    /// Whether a field named `key` exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.borrow().iter().any(|(k, _)| k == key)
    }

    /// Field names in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of the fields in order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner.fields.borrow().clone()
    }

    /// Name of the field currently holding `value`.
    #[must_use]
    pub fn key_of(&self, value: &Value) -> Option<String> {
        self.inner
            .fields
            .borrow()
            .iter()
            .find(|(_, v)| v == value)
            .map(|(k, _)| k.clone())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    /// True when the object has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.fields.borrow().is_empty()
    }

    /// Node annotations.
    #[must_use]
    pub fn meta(&self) -> Ref<'_, NodeMeta> {
        self.inner.meta.borrow()
    }

    pub(crate) fn meta_mut(&self) -> RefMut<'_, NodeMeta> {
        self.inner.meta.borrow_mut()
    }

    /// True when both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let object = Self::new();
        for (k, v) in iter {
            object.set(k, v);
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

// ============================================================================
// List
// ============================================================================

struct ListInner {
    id: NodeId,
    items: RefCell<Vec<Value>>,
    meta: RefCell<NodeMeta>,
}

/// Plain ordered collection. Mutating it notifies nobody.
#[derive(Clone)]
pub struct List {
    inner: Rc<ListInner>,
}

impl List {
    /// List holding `items`.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                id: NodeId::next(),
                items: RefCell::new(items),
                meta: RefCell::new(NodeMeta::default()),
            }),
        }
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Snapshot of the items.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Append an item without notifying anyone.
    pub fn push(&self, value: impl Into<Value>) {
        self.inner.items.borrow_mut().push(value.into());
    }

    /// Replace the item at `index`; out-of-range indices are ignored.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        if let Some(slot) = self.inner.items.borrow_mut().get_mut(index) {
            *slot = value.into();
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// True when the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Node annotations.
    #[must_use]
    pub fn meta(&self) -> Ref<'_, NodeMeta> {
        self.inner.meta.borrow()
    }

    pub(crate) fn meta_mut(&self) -> RefMut<'_, NodeMeta> {
        self.inner.meta.borrow_mut()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Func
// ============================================================================

struct FuncInner {
    id: NodeId,
    body: Box<dyn Fn() -> Value>,
    meta: RefCell<NodeMeta>,
}

/// Zero-argument function usable as a watch target.
///
/// Watching a `Func` tracks every reactive primitive it reads.
#[derive(Clone)]
pub struct Func {
    inner: Rc<FuncInner>,
}

impl Func {
    /// Wrap a function body as a node.
    pub fn new(body: impl Fn() -> Value + 'static) -> Self {
        Self {
            inner: Rc::new(FuncInner {
                id: NodeId::next(),
                body: Box::new(body),
                meta: RefCell::new(NodeMeta::default()),
            }),
        }
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Invoke the function.
    #[must_use]
    pub fn call(&self) -> Value {
        (self.inner.body)()
    }

    /// Node annotations.
    #[must_use]
    pub fn meta(&self) -> Ref<'_, NodeMeta> {
        self.inner.meta.borrow()
    }

    pub(crate) fn meta_mut(&self) -> RefMut<'_, NodeMeta> {
        self.inner.meta.borrow_mut()
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func").field("id", &self.inner.id).finish()
    }
}
