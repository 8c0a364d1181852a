//! Derived cells with automatic dependency discovery.
//!
//! # Design
//!
//! A [`Computed`] runs its read function inside a tracking frame. Every
//! tracked read (`Cell::get`, `ArrayCell::get`, `Computed::get`) performed
//! during that run registers the primitive as a dependency. The computed then
//! subscribes to the `Change` event of each dependency and re-runs eagerly
//! when any of them fires, discovering a fresh dependency set each time.
//!
//! # Invariants
//!
//! 1. Dependencies are exactly the primitives read during the latest run.
//! 2. A computed never depends on itself.
//! 3. After `dispose()`, no dependency subscription remains and the read
//!    function is never called again.
//! 4. Evaluation is not reentrant: a write to a dependency from inside the
//!    read function does not trigger a nested run.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

use super::listeners::{EventKind, ListenerSet, Subscription};
use super::node::{NodeId, NodeMeta};

#[derive(Default)]
struct Frame {
    seen: HashSet<NodeId>,
    sources: Vec<Rc<ListenerSet>>,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Record a tracked read of the primitive owning `listeners`.
pub(crate) fn track(listeners: &Rc<ListenerSet>) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            if frame.seen.insert(listeners.node()) {
                frame.sources.push(Rc::clone(listeners));
            }
        }
    });
}

/// Run `f` and collect every primitive it read.
fn run_tracked<R>(f: impl FnOnce() -> R) -> (R, Vec<Rc<ListenerSet>>) {
    FRAMES.with(|frames| frames.borrow_mut().push(Frame::default()));
    let result = f();
    let frame = FRAMES.with(|frames| frames.borrow_mut().pop()).unwrap_or_default();
    (result, frame.sources)
}

/// Run `f` without letting its reads leak into an enclosing computed.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    run_tracked(f).0
}

struct ComputedInner {
    id: NodeId,
    read: Box<dyn Fn() -> Value>,
    value: RefCell<Value>,
    sources: RefCell<Vec<Subscription>>,
    listeners: Rc<ListenerSet>,
    meta: RefCell<NodeMeta>,
    evaluations: std::cell::Cell<u64>,
    evaluating: std::cell::Cell<bool>,
    disposed: std::cell::Cell<bool>,
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        for sub in self.sources.get_mut().drain(..) {
            sub.dispose();
        }
    }
}

/// A read-only cell whose value is recomputed whenever a dependency changes.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
#[derive(Clone)]
pub struct Computed {
    inner: Rc<ComputedInner>,
}

impl Computed {
    /// Create a computed and evaluate it once to discover its dependencies.
    pub fn new(read: impl Fn() -> Value + 'static) -> Self {
        let id = NodeId::next();
        let inner = Rc::new(ComputedInner {
            id,
            read: Box::new(read),
            value: RefCell::new(Value::Null),
            sources: RefCell::new(Vec::new()),
            listeners: ListenerSet::new(id),
            meta: RefCell::new(NodeMeta::default()),
            evaluations: std::cell::Cell::new(0),
            evaluating: std::cell::Cell::new(false),
            disposed: std::cell::Cell::new(false),
        });
        Self::evaluate(&inner);
        Self { inner }
    }

    /// Writes to a dependency made by the read function itself do not
    /// re-enter the evaluation.
    fn evaluate(inner: &Rc<ComputedInner>) {
        if inner.disposed.get() || inner.evaluating.replace(true) {
            return;
        }

        let (value, sources) = run_tracked(|| (inner.read)());
        inner.evaluating.set(false);

        for sub in inner.sources.borrow_mut().drain(..) {
            sub.dispose();
        }

        let subs: Vec<Subscription> = sources
            .iter()
            .filter(|set| set.node() != inner.id)
            .map(|set| {
                let weak = Rc::downgrade(inner);
                set.subscribe(EventKind::Change, move |_| {
                    if let Some(inner) = weak.upgrade() {
                        Computed::evaluate(&inner);
                    }
                })
            })
            .collect();
        *inner.sources.borrow_mut() = subs;

        let first = inner.evaluations.get() == 0;
        inner.evaluations.set(inner.evaluations.get() + 1);

        let old = inner.value.borrow().clone();
        if first || (old.is_scalar() && old == value) {
            *inner.value.borrow_mut() = value;
            return;
        }

        inner.listeners.notify(EventKind::BeforeChange, &old);
        *inner.value.borrow_mut() = value.clone();
        inner.listeners.notify(EventKind::Change, &value);
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Current value, recording the access for dependency tracking.
    #[must_use]
    pub fn get(&self) -> Value {
        track(&self.inner.listeners);
        self.peek()
    }

    /// Current value without dependency tracking.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// How many times the read function has run.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.inner.evaluations.get()
    }

    /// Number of primitives this computed currently depends on.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }

    /// Stop tracking: drop every dependency subscription.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        for sub in self.inner.sources.borrow_mut().drain(..) {
            sub.dispose();
        }
    }

    /// Whether `dispose()` was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
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

    /// True when both handles refer to the same computed.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("evaluations", &self.inner.evaluations.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;

    #[test]
    fn test_recomputes_on_dependency_change() {
        let a = Cell::new(2);
        let b = Cell::new(3);
        let (ra, rb) = (a.clone(), b.clone());
        let sum = Computed::new(move || {
            Value::Int(ra.get().as_int().unwrap_or(0) + rb.get().as_int().unwrap_or(0))
        });

        assert_eq!(sum.peek(), Value::Int(5));
        assert_eq!(sum.dependency_count(), 2);
        a.set(10);
        assert_eq!(sum.peek(), Value::Int(13));
        assert_eq!(sum.evaluations(), 2);
    }

    #[test]
    fn test_dependencies_are_rediscovered() {
        let flag = Cell::new(true);
        let left = Cell::new("left");
        let right = Cell::new("right");
        let (f, l, r) = (flag.clone(), left.clone(), right.clone());
        let pick = Computed::new(move || {
            if f.get().as_bool().unwrap_or(false) {
                l.get()
            } else {
                r.get()
            }
        });

        assert_eq!(pick.peek(), Value::from("left"));
        flag.set(false);
        assert_eq!(pick.peek(), Value::from("right"));

        let runs = pick.evaluations();
        left.set("ignored");
        assert_eq!(pick.evaluations(), runs);
        right.set("now");
        assert_eq!(pick.peek(), Value::from("now"));
    }

    #[test]
    fn test_peek_is_not_tracked() {
        let a = Cell::new(1);
        let ra = a.clone();
        let c = Computed::new(move || ra.peek());
        assert_eq!(c.dependency_count(), 0);
        a.set(2);
        assert_eq!(c.evaluations(), 1);
    }

    #[test]
    fn test_dispose_detaches_sources() {
        let a = Cell::new(1);
        let ra = a.clone();
        let c = Computed::new(move || ra.get());
        assert_eq!(a.listener_count(Some(EventKind::Change)), 1);

        c.dispose();
        assert!(c.is_disposed());
        assert_eq!(a.listener_count(None), 0);
        a.set(2);
        assert_eq!(c.peek(), Value::Int(1));
    }

    #[test]
    fn test_untracked_hides_reads() {
        let a = Cell::new(1);
        let ra = a.clone();
        let c = Computed::new(move || untracked(|| ra.get()));
        assert_eq!(c.dependency_count(), 0);
    }

    #[test]
    fn test_write_to_dependency_during_read_does_not_recurse() {
        let x = Cell::new(0);
        let rx = x.clone();
        let bump = Computed::new(move || {
            let v = rx.get().as_int().unwrap_or(0);
            if v < 50 {
                rx.set(v + 1);
            }
            Value::Int(v)
        });
        assert_eq!(bump.evaluations(), 1);

        x.set(10);
        assert_eq!(bump.evaluations(), 2);
        assert_eq!(x.peek(), Value::Int(11));
        assert_eq!(bump.peek(), Value::Int(10));
    }

    #[test]
    fn test_computed_notifies_listeners() {
        let a = Cell::new(1);
        let ra = a.clone();
        let double = Computed::new(move || Value::Int(ra.get().as_int().unwrap_or(0) * 2));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = double.subscribe(EventKind::Change, move |v| s.borrow_mut().push(v.clone()));

        a.set(4);
        assert_eq!(*seen.borrow(), vec![Value::Int(8)]);
    }
}
