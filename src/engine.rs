//! Traversal engine.
//!
//! One recursive visitor serves every entry point. The [`Mode`] decides what
//! happens at each reactive node:
//!
//! - `Watch` attaches hooks (deduplicated per node and watch),
//! - `Unwatch` releases the hooks covered by its [`Scope`],
//! - `Stamp` only lets the policy evaluator stamp flags.
//!
//! Children are always visited with the same mode, so a subtree detached by
//! relinking or collection removal is released down to its leaves.
//!
//! # Hooks
//!
//! | node | hooks |
//! |---|---|
//! | `Cell`, `Computed` | change listener; before-change listener with `oldValues` or `mutable` |
//! | `ArrayCell` | before-change snapshot + change listener driving the differ |
//! | `Func` (root only) | a `Computed` tracking every primitive the function reads |
//!
//! Collection item watch/unwatch and function callbacks run through the
//! deferred queue (see [`crate::reactive::scheduler`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::chain::{Frame, ParentChain};
use crate::diff::{self, ArrayChange, ChangeStatus};
use crate::options::{CollectionChanges, TagFields, WatchOptions};
use crate::policy::{self, Decision};
use crate::reactive::{scheduler, ArrayCell, Cell, Computed, EventKind, Subscription};
use crate::registry::{Hook, Scope, WatchId};
use crate::value::{Func, List, Object, Value};
use crate::watch::{CollectionChange, WatchContext, WatchEvent};

/// User callback. A returned value is written to the context cell.
pub(crate) type Callback = Rc<dyn Fn(&WatchEvent) -> Option<Value>>;

/// What a traversal does at each reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Watch,
    Unwatch(Scope),
    Stamp,
}

enum Admit {
    New,
    Existing,
    Vetoed,
}

/// State of one watch (or one unwatch/stamp pass).
pub(crate) struct Watcher {
    pub(crate) id: WatchId,
    pub(crate) options: WatchOptions,
    pub(crate) context: WatchContext,
    callback: Option<Callback>,
    paused: std::cell::Cell<bool>,
    disposed: std::cell::Cell<bool>,
}

impl Watcher {
    pub(crate) fn new(
        options: WatchOptions,
        callback: Option<Callback>,
        context: WatchContext,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: WatchId::new(),
            options,
            context,
            callback,
            paused: std::cell::Cell::new(false),
            disposed: std::cell::Cell::new(false),
        })
    }

    pub(crate) fn run(self: &Rc<Self>, target: &Value, mode: Mode) {
        self.visit(target, &Frame::root(), mode);
    }

    pub(crate) fn pause(&self) {
        self.paused.set(true);
    }

    pub(crate) fn resume(&self) {
        self.paused.set(false);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Release every hook this watch created. Returns `false` if already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.replace(true) {
            return false;
        }
        let hooks = self.context.registry().borrow_mut().take_watch(self.id);
        debug!(watch = %self.id, hooks = hooks.len(), "watch disposed");
        for hook in &hooks {
            hook.dispose();
        }
        true
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Visit `node`; returns `true` when it is (or unwraps to) a composite.
    fn visit(self: &Rc<Self>, node: &Value, frame: &Frame, mode: Mode) -> bool {
        if node.is_scalar() {
            return false;
        }
        let waking = match policy::should_descend(node, frame, &mode, &self.options) {
            Decision::Descend => false,
            Decision::Wake => true,
            Decision::Skip(_) => return false,
        };

        let composite = match node {
            Value::Cell(_) | Value::Computed(_) => self.visit_primitive(node, frame, mode, waking),
            Value::Array(array) => self.visit_array(array, node, frame, mode, waking),
            Value::Object(object) => self.visit_object(object, node, frame, mode),
            Value::List(list) => self.visit_list(list, node, frame, mode),
            Value::Func(func) => self.visit_func(func, node, frame, mode, waking),
            _ => false,
        };

        if self.options.seal && mode == Mode::Watch {
            policy::seal(node);
        }
        composite
    }

    fn visit_primitive(
        self: &Rc<Self>,
        node: &Value,
        frame: &Frame,
        mode: Mode,
        waking: bool,
    ) -> bool {
        match mode {
            Mode::Watch => match self.admit(node, frame, waking) {
                Admit::New => self.subscribe_primitive(node, frame),
                Admit::Existing => {}
                Admit::Vetoed => return false,
            },
            Mode::Unwatch(scope) => self.release(node, scope),
            _ => {}
        }

        if self.options.hide_wrapped_values {
            return false;
        }
        self.visit(&node.peek(), &frame.unwrap(node), mode)
    }

    fn visit_array(
        self: &Rc<Self>,
        array: &ArrayCell,
        node: &Value,
        frame: &Frame,
        mode: Mode,
        waking: bool,
    ) -> bool {
        match mode {
            Mode::Watch => match self.admit(node, frame, waking) {
                Admit::New => self.subscribe_array(array, node, frame),
                Admit::Existing => {}
                Admit::Vetoed => return false,
            },
            Mode::Unwatch(scope) => self.release(node, scope),
            _ => {}
        }

        if self.options.hide_arrays {
            return true;
        }
        let items = frame.child(node);
        for item in array.peek() {
            self.visit(&item, &items, mode);
        }
        true
    }

    fn visit_object(
        self: &Rc<Self>,
        object: &Object,
        node: &Value,
        frame: &Frame,
        mode: Mode,
    ) -> bool {
        let fields = frame.child(node);
        for (key, value) in object.entries() {
            if self.options.hides_field(&key) {
                trace!(field = %key, "skipping hidden field");
                continue;
            }
            let value = if mode == Mode::Watch && self.options.wrap {
                self.wrap_field(object, &key, value, &fields)
            } else {
                value
            };
            if value.is_scalar() {
                continue;
            }

            let composite = self.visit(&value, &fields, mode);
            if mode == Mode::Watch {
                self.tag(&value, &key, composite);
            }
        }
        true
    }

    fn visit_list(self: &Rc<Self>, list: &List, node: &Value, frame: &Frame, mode: Mode) -> bool {
        if self.options.hide_arrays {
            return true;
        }
        let items = frame.through(node);
        for item in list.items() {
            self.visit(&item, &items, mode);
        }
        true
    }

    fn visit_func(
        self: &Rc<Self>,
        func: &Func,
        node: &Value,
        frame: &Frame,
        mode: Mode,
        waking: bool,
    ) -> bool {
        // Only a function passed as the target is tracked; function fields are data.
        if !frame.is_root() {
            return false;
        }
        match mode {
            Mode::Watch => {
                if let Admit::New = self.admit(node, frame, waking) {
                    self.track(func, node, frame);
                }
            }
            Mode::Unwatch(scope) => self.release(node, scope),
            _ => {}
        }
        false
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    fn wrap_field(&self, object: &Object, key: &str, value: Value, fields: &Frame) -> Value {
        let wrappable = value.is_scalar() || matches!(value, Value::List(_));
        if !wrappable {
            return value;
        }
        if let Some(hook) = &self.options.before_wrap {
            if !hook(&fields.parents, key, &value) {
                trace!(field = key, "wrap vetoed");
                return value;
            }
        }

        let wrapped = match &value {
            Value::List(list) => Value::from(ArrayCell::new(list.items())),
            scalar => Value::from(Cell::new(scalar.clone())),
        };
        object.set(key, wrapped.clone());
        trace!(field = key, kind = wrapped.type_name(), "wrapped field");
        wrapped
    }

    fn tag(&self, value: &Value, key: &str, composite: bool) {
        let wanted = match self.options.tag_fields {
            TagFields::Off => false,
            TagFields::All => true,
            TagFields::ParentsOnly => composite,
        };
        if wanted {
            value.with_meta_mut(|meta| {
                if meta.field_name.is_none() {
                    meta.field_name = Some(key.to_string());
                }
            });
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// A woken node is only attached when no watch of the context observes it.
    fn admit(&self, node: &Value, frame: &Frame, waking: bool) -> Admit {
        let Some(id) = node.node_id() else {
            return Admit::Vetoed;
        };
        let attached = {
            let registry = self.context.registry().borrow();
            registry.has(id, self.id) || (waking && registry.is_attached(id))
        };
        if attached {
            return Admit::Existing;
        }
        if let Some(hook) = &self.options.before_watch {
            if !hook(&frame.parents, node) {
                trace!(node = %id, "watch vetoed");
                return Admit::Vetoed;
            }
        }
        Admit::New
    }

    fn register(&self, node: &Value, hooks: Vec<Hook>) {
        let Some(id) = node.node_id() else {
            return;
        };
        debug!(
            node = %id,
            kind = node.type_name(),
            watch = %self.id,
            hooks = hooks.len(),
            "subscribed"
        );
        let mut registry = self.context.registry().borrow_mut();
        for hook in hooks {
            registry.insert(id, self.id, hook);
        }
    }

    fn release(&self, node: &Value, scope: Scope) {
        let Some(id) = node.node_id() else {
            return;
        };
        let hooks = self.context.registry().borrow_mut().take(id, scope);
        if hooks.is_empty() {
            return;
        }
        debug!(node = %id, kind = node.type_name(), hooks = hooks.len(), "unsubscribed");
        for hook in &hooks {
            hook.dispose();
        }
    }

    fn subscribe_primitive(self: &Rc<Self>, node: &Value, frame: &Frame) {
        let mut hooks = Vec::new();

        let watcher = Rc::clone(self);
        let (target, at) = (node.clone(), frame.clone());
        hooks.extend(subscribe(node, EventKind::Change, move |value| {
            watcher.on_change(&target, &at, value);
        }));

        if self.options.old_values > 0 || self.options.mutable {
            let watcher = Rc::clone(self);
            let (target, at) = (node.clone(), frame.clone());
            hooks.extend(subscribe(node, EventKind::BeforeChange, move |old| {
                watcher.on_before_change(&target, &at, old);
            }));
        }

        self.register(node, hooks.into_iter().map(Hook::Listener).collect());
    }

    fn on_before_change(self: &Rc<Self>, node: &Value, frame: &Frame, old: &Value) {
        if self.options.old_values > 0 {
            let limit = self.options.old_values;
            node.with_meta_mut(|meta| meta.record_old_value(old.clone(), limit));
        }
        if self.options.mutable && old.is_node() {
            debug!(node = ?node.node_id(), watch = %self.id, "unlinking replaced value");
            self.visit(old, &frame.unwrap(node), Mode::Unwatch(Scope::Watch(self.id)));
        }
    }

    fn on_change(self: &Rc<Self>, node: &Value, frame: &Frame, value: &Value) {
        // Disabling silences the callback; the subscription graph still follows the value.
        if node.watchable() != Some(false) && !self.paused.get() {
            self.emit(&frame.parents, node, None);
        }
        if self.options.mutable && !self.options.hide_wrapped_values && value.is_node() {
            debug!(node = ?node.node_id(), watch = %self.id, "linking new value");
            self.visit(value, &frame.unwrap(node), Mode::Watch);
        }
    }

    fn emit(&self, parents: &ParentChain, child: &Value, change: Option<CollectionChange>) {
        let Some(callback) = &self.callback else {
            return;
        };
        let event = WatchEvent {
            context: self.context.clone(),
            parents: parents.clone(),
            child: child.clone(),
            change,
        };
        if let Some(result) = callback(&event) {
            self.context.cell().set(result);
        }
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    fn subscribe_array(self: &Rc<Self>, array: &ArrayCell, node: &Value, frame: &Frame) {
        let previous = Rc::new(RefCell::new(array.peek()));

        let before = {
            let previous = Rc::clone(&previous);
            array.subscribe(EventKind::BeforeChange, move |snapshot| {
                *previous.borrow_mut() = items_of(snapshot);
            })
        };

        let change = {
            let watcher = Rc::clone(self);
            let (source, target, at) = (array.clone(), node.clone(), frame.clone());
            array.subscribe(EventKind::Change, move |snapshot| {
                let prev = previous.replace(Vec::new());
                watcher.on_array_change(&source, &target, &at, &prev, &items_of(snapshot));
            })
        };

        self.register(node, vec![Hook::Listener(before), Hook::Listener(change)]);
    }

    fn on_array_change(
        self: &Rc<Self>,
        array: &ArrayCell,
        node: &Value,
        frame: &Frame,
        prev: &[Value],
        next: &[Value],
    ) {
        let changes = diff::compare(prev, next);
        if changes.is_empty() {
            return;
        }
        trace!(node = %array.id(), records = changes.len(), "collection changed");

        if node.watchable() != Some(false) && !self.paused.get() {
            match self.options.collection_changes {
                CollectionChanges::Split => {
                    for change in &changes {
                        let item = CollectionChange::Item(change.clone());
                        self.emit(&frame.parents, node, Some(item));
                    }
                }
                CollectionChanges::Batch => {
                    self.emit(&frame.parents, node, Some(CollectionChange::Batch(changes.clone())));
                }
            }
        }

        if self.options.hide_arrays {
            return;
        }
        let items = frame.child(node);
        for change in changes {
            if change.status == ChangeStatus::Moved || change.value.is_scalar() {
                continue;
            }
            if self.options.defer {
                let (watcher, array, at) = (Rc::clone(self), array.clone(), items.clone());
                scheduler::defer(move || watcher.settle_item(&array, &at, &change));
            } else {
                self.settle_item(array, &items, &change);
            }
        }
    }

    /// Watch an added item or release a deleted one, unless the collection
    /// has moved on since the change was recorded.
    fn settle_item(self: &Rc<Self>, array: &ArrayCell, items: &Frame, change: &ArrayChange) {
        if self.disposed.get() {
            trace!(watch = %self.id, "dropping item operation of disposed watch");
            return;
        }
        let present = array.contains(&change.value);
        let attached = self.context.registry().borrow().has(array.id(), self.id);

        match change.status {
            ChangeStatus::Added if present && attached => {
                self.visit(&change.value, items, Mode::Watch);
            }
            ChangeStatus::Deleted if !present => {
                self.visit(&change.value, items, Mode::Unwatch(Scope::Watch(self.id)));
            }
            status => {
                trace!(node = %array.id(), status = status.as_str(), "stale item operation");
            }
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn track(self: &Rc<Self>, func: &Func, node: &Value, frame: &Frame) {
        let watcher = Rc::clone(self);
        let (body, target, parents) = (func.clone(), node.clone(), frame.parents.clone());
        let first = std::cell::Cell::new(true);

        let tracker = Computed::new(move || {
            let value = body.call();
            if !first.replace(false) {
                watcher.schedule_call(&target, &parents);
            }
            value
        });

        self.register(node, vec![Hook::Tracker(tracker)]);
    }

    fn schedule_call(self: &Rc<Self>, target: &Value, parents: &ParentChain) {
        if self.paused.get() || target.watchable() == Some(false) {
            return;
        }
        let (watcher, target, parents) = (Rc::clone(self), target.clone(), parents.clone());
        scheduler::defer(move || watcher.call_deferred(&target, &parents));
    }

    fn call_deferred(&self, target: &Value, parents: &ParentChain) {
        if self.disposed.get() || self.paused.get() {
            return;
        }
        let Some(callback) = &self.callback else {
            return;
        };
        let event = WatchEvent {
            context: self.context.clone(),
            parents: parents.clone(),
            child: target.clone(),
            change: None,
        };
        if let Some(result) = callback(&event) {
            if result != self.context.value() {
                self.context.cell().set(result);
            }
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("paused", &self.paused.get())
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

fn subscribe(
    node: &Value,
    kind: EventKind,
    listener: impl Fn(&Value) + 'static,
) -> Option<Subscription> {
    match node {
        Value::Cell(cell) => Some(cell.subscribe(kind, listener)),
        Value::Computed(computed) => Some(computed.subscribe(kind, listener)),
        Value::Array(array) => Some(array.subscribe(kind, listener)),
        _ => None,
    }
}

fn items_of(snapshot: &Value) -> Vec<Value> {
    snapshot.as_list().map(List::items).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::run_pending;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let callback: Callback = Rc::new(move |event: &WatchEvent| {
            sink.borrow_mut().push(event.path());
            None
        });
        (log, callback)
    }

    fn unbounded() -> WatchOptions {
        WatchOptions::builder().depth(-1).tag_fields(TagFields::All).build().unwrap()
    }

    #[test]
    fn test_watch_subscribes_nested_cells() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let inner = Object::new().with("b", b.clone());
        let model = Value::from(Object::new().with("a", a.clone()).with("n", inner));
        let (log, cb) = recorder();
        let watcher = Watcher::new(unbounded(), Some(cb), WatchContext::new());
        watcher.run(&model, Mode::Watch);

        assert_eq!(a.listener_count(Some(EventKind::Change)), 1);
        assert_eq!(b.listener_count(Some(EventKind::Change)), 1);
        b.set(3);
        assert_eq!(log.borrow().as_slice(), ["n.b(3)"]);
    }

    #[test]
    fn test_repeat_watch_does_not_duplicate() {
        let a = Cell::new(1);
        let model = Value::from(Object::new().with("a", a.clone()));
        let watcher = Watcher::new(WatchOptions::default(), None, WatchContext::new());
        watcher.run(&model, Mode::Watch);
        watcher.run(&model, Mode::Watch);
        assert_eq!(a.listener_count(None), 1);
    }

    #[test]
    fn test_unwatch_scope_mirrors_watch() {
        let a = Cell::new(1);
        let model = Value::from(Object::new().with("a", a.clone()));
        let context = WatchContext::new();
        let first = Watcher::new(WatchOptions::default(), None, context.clone());
        let second = Watcher::new(WatchOptions::default(), None, context.clone());
        first.run(&model, Mode::Watch);
        second.run(&model, Mode::Watch);
        assert_eq!(a.listener_count(None), 2);

        first.run(&model, Mode::Unwatch(Scope::Watch(first.id)));
        assert_eq!(a.listener_count(None), 1);
        assert!(context.registry().borrow().has(a.id(), second.id));

        second.run(&model, Mode::Unwatch(Scope::Context));
        assert_eq!(a.listener_count(None), 0);
    }

    #[test]
    fn test_stamp_mode_attaches_nothing() {
        let a = Cell::new(1);
        let model = Value::from(Object::new().with("a", a.clone()));
        let opts = WatchOptions::builder().enabled(false).build().unwrap();
        Watcher::new(opts, None, WatchContext::new()).run(&model, Mode::Stamp);
        assert_eq!(a.listener_count(None), 0);
        assert_eq!(a.meta().watchable(), Some(false));
    }

    #[test]
    fn test_deferred_item_watch_is_dropped_when_stale() {
        let item = Object::new().with("p", Cell::new("x"));
        let arr = ArrayCell::new(Vec::new());
        let model = Value::from(Object::new().with("arr", arr.clone()));
        let (log, cb) = recorder();
        let watcher = Watcher::new(unbounded(), Some(cb), WatchContext::new());
        watcher.run(&model, Mode::Watch);

        arr.push(item.clone());
        arr.remove(&Value::from(item.clone()));
        log.borrow_mut().clear();
        run_pending();

        if let Some(Value::Cell(p)) = item.get("p") {
            assert_eq!(p.listener_count(None), 0);
        } else {
            panic!("field p missing");
        }
    }

    #[test]
    fn test_wrap_replaces_plain_fields() {
        let obj = Object::new().with("n", 1).with("l", Value::list(vec![Value::Int(1)]));
        let opts = WatchOptions::builder().wrap(true).build().unwrap();
        Watcher::new(opts, None, WatchContext::new()).run(&Value::from(obj.clone()), Mode::Watch);

        assert!(matches!(obj.get("n"), Some(Value::Cell(_))));
        assert!(matches!(obj.get("l"), Some(Value::Array(_))));
    }

    #[test]
    fn test_items_of_non_list_is_empty() {
        assert!(items_of(&Value::Int(1)).is_empty());
        assert_eq!(items_of(&Value::list(vec![Value::Int(1)])).len(), 1);
    }
}
