//! Public watch surface: [`watch`], [`unwatch`], [`set_enabled`] and the
//! [`WatchHandle`] returned by a successful watch.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::json;
use tracing::debug;

use crate::chain::ParentChain;
use crate::diff::ArrayChange;
use crate::engine::{Mode, Watcher};
use crate::error::{ConfigError, WatchResult};
use crate::options::WatchOptions;
use crate::path;
use crate::reactive::Cell;
use crate::registry::{Registry, Scope, WatchId};
use crate::value::Value;

/// Shared state of a group of watches.
///
/// Callback results are written to the context cell. Subscriptions created
/// under the same context are recorded in one registry, which is what
/// [`unwatch`] tears down.
#[derive(Clone)]
pub struct WatchContext {
    cell: Cell,
    registry: Rc<RefCell<Registry>>,
}

impl WatchContext {
    /// A fresh context whose cell holds `null`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cell(Cell::new(Value::Null))
    }

    /// A fresh context writing callback results to `cell`.
    #[must_use]
    pub fn with_cell(cell: Cell) -> Self {
        Self {
            cell,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// The context cell.
    #[must_use]
    pub const fn cell(&self) -> &Cell {
        &self.cell
    }

    /// Current value of the context cell, untracked.
    #[must_use]
    pub fn value(&self) -> Value {
        self.cell.peek()
    }

    /// Total number of hooks held by watches of this context.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) const fn registry(&self) -> &Rc<RefCell<Registry>> {
        &self.registry
    }
}

impl Default for WatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchContext")
            .field("cell", &self.cell)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Collection edit attached to a [`WatchEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange {
    /// One record (`collectionChanges: split`).
    Item(ArrayChange),
    /// The whole edit script (`collectionChanges: batch`).
    Batch(Vec<ArrayChange>),
}

impl CollectionChange {
    /// Records carried by this change.
    #[must_use]
    pub fn records(&self) -> &[ArrayChange] {
        match self {
            Self::Item(change) => std::slice::from_ref(change),
            Self::Batch(changes) => changes,
        }
    }

    /// JSON form: one record object, or an array of them.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Item(change) => change.to_json(),
            Self::Batch(changes) => {
                json!(changes.iter().map(ArrayChange::to_json).collect::<Vec<_>>())
            }
        }
    }
}

/// What a callback receives.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Context of the watch that fired.
    pub context: WatchContext,
    /// Ancestors of the changed node, root side first. Empty for root fields.
    pub parents: ParentChain,
    /// The changed primitive, or the function target.
    pub child: Value,
    /// Collection edit, for collection primitives.
    pub change: Option<CollectionChange>,
}

impl WatchEvent {
    /// Most recent prior value of the child, when history is kept.
    #[must_use]
    pub fn old_value(&self) -> Option<Value> {
        self.child.old_values().into_iter().next()
    }

    /// Human-readable location of the change, e.g. `sub().c(3) [1]`.
    #[must_use]
    pub fn path(&self) -> String {
        path::describe(&self.parents, &self.child, self.change.as_ref())
    }
}

/// A live watch. Dropping the handle does not stop it; call [`dispose`](Self::dispose).
pub struct WatchHandle {
    watcher: Rc<Watcher>,
    target: Value,
}

impl WatchHandle {
    /// Suppress callbacks. Subscriptions stay attached and relinking continues.
    pub fn pause(&self) {
        self.watcher.pause();
    }

    /// Re-enable callbacks.
    pub fn resume(&self) {
        self.watcher.resume();
    }

    /// Whether `pause` is in effect.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.watcher.is_paused()
    }

    /// Release every subscription created by this watch. Idempotent.
    pub fn dispose(&self) {
        self.watcher.dispose();
    }

    /// Whether `dispose` was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.watcher.is_disposed()
    }

    /// Identity of this watch.
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.watcher.id
    }

    /// The watched target.
    #[must_use]
    pub const fn target(&self) -> &Value {
        &self.target
    }

    /// Context the watch reports into.
    #[must_use]
    pub fn context(&self) -> &WatchContext {
        &self.watcher.context
    }

    /// Current value of the context cell.
    #[must_use]
    pub fn value(&self) -> Value {
        self.watcher.context.value()
    }

    /// Number of hooks this watch currently holds.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.watcher.context.registry().borrow().count(self.watcher.id)
    }

    /// Number of nodes this watch is attached to.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.watcher.context.registry().borrow().node_count(self.watcher.id)
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("watcher", &self.watcher)
            .field("target", &self.target.type_name())
            .finish()
    }
}

/// Watch `target` and every reachable primitive within the options' bounds.
///
/// `callback` runs synchronously on primitive and collection changes, and on
/// the next scheduler turn for function targets. Returning `Some(value)`
/// writes it to the context cell.
///
/// # Errors
///
/// Returns a configuration error for invalid options or a scalar target.
pub fn watch(
    target: impl Into<Value>,
    options: WatchOptions,
    callback: impl Fn(&WatchEvent) -> Option<Value> + 'static,
    context: &WatchContext,
) -> WatchResult<WatchHandle> {
    let target = target.into();
    options.validate()?;
    require_node(&target)?;

    let watcher = Watcher::new(options, Some(Rc::new(callback)), context.clone());
    debug!(
        watch = %watcher.id,
        target = target.type_name(),
        depth = %watcher.options.depth,
        "watch started"
    );
    watcher.run(&target, Mode::Watch);
    debug!(
        watch = %watcher.id,
        hooks = context.registry().borrow().count(watcher.id),
        "watch attached"
    );
    Ok(WatchHandle { watcher, target })
}

/// Release every hook any watch of `context` holds within the options'
/// bounds of `target`.
///
/// # Errors
///
/// Returns a configuration error for invalid options or a scalar target.
pub fn unwatch(
    target: impl Into<Value>,
    options: WatchOptions,
    context: &WatchContext,
) -> WatchResult<()> {
    let target = target.into();
    options.validate()?;
    require_node(&target)?;

    let before = context.subscription_count();
    Watcher::new(options, None, context.clone()).run(&target, Mode::Unwatch(Scope::Context));
    debug!(released = before.saturating_sub(context.subscription_count()), "unwatch finished");
    Ok(())
}

/// Stamp the watchable flag on `target` and the nodes reachable within the
/// options' bounds.
///
/// Disabled primitives keep their subscriptions but stop emitting. A later
/// `watch` with `enabled: true` wakes them. Nodes no watch of that context
/// observes yet are attached; the others are not attached a second time.
///
/// # Errors
///
/// Returns a configuration error for invalid options or a scalar target.
pub fn set_enabled(
    target: impl Into<Value>,
    enabled: bool,
    options: WatchOptions,
) -> WatchResult<()> {
    let target = target.into();
    let options = WatchOptions {
        enabled: Some(enabled),
        ..options
    };
    options.validate()?;
    require_node(&target)?;

    debug!(enabled, target = target.type_name(), "stamping watchable flag");
    Watcher::new(options, None, WatchContext::new()).run(&target, Mode::Stamp);
    Ok(())
}

fn require_node(target: &Value) -> Result<(), ConfigError> {
    if target.is_scalar() {
        return Err(ConfigError::InvalidTarget {
            reason: format!("cannot watch a {} value", target.type_name()),
        });
    }
    Ok(())
}
