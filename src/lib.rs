//! # kyrowatch - deep observation of reactive object graphs
//!
//! kyrowatch attaches change listeners to every reactive primitive reachable
//! from a root value and reports each change together with the chain of
//! ancestors that leads to it. It keeps those subscriptions consistent while
//! the graph mutates underneath it.
//!
//! ## Core Concepts
//!
//! - **Primitive**: a [`Cell`], [`ArrayCell`] or [`Computed`] that notifies on change
//! - **Watch**: one [`watch`] call, controlled through a [`WatchHandle`]
//! - **Parents**: the ancestors of the changed node, reported in each [`WatchEvent`]
//! - **Collection change**: an [`ArrayChange`] record from the collection differ
//! - **Relinking**: with `mutable`, a replaced subtree is unwatched and the new one watched
//!
//! ## Usage
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use kyrowatch::{watch, Cell, Object, WatchContext, WatchOptions};
//!
//! let name = Cell::new("ada");
//! let model = Object::new().with("name", name.clone());
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let options = WatchOptions::builder().tag_fields(kyrowatch::TagFields::All).build()?;
//! let handle = watch(model, options, move |event| {
//!     sink.borrow_mut().push(event.path());
//!     None
//! }, &WatchContext::new())?;
//!
//! name.set("grace");
//! assert_eq!(seen.borrow().as_slice(), [r#"name("grace")"#]);
//! handle.dispose();
//! # Ok::<(), kyrowatch::WatchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod chain;
pub mod error;
pub mod options;
pub mod reactive;
pub mod value;

// Engine
pub mod diff;
mod engine;
pub mod path;
mod policy;
pub mod registry;
pub mod watch;

// Re-export primary types at crate root for convenience
pub use chain::{ParentChain, VisitPath};
pub use diff::{ArrayChange, ChangeStatus};
pub use error::{ConfigError, WatchError, WatchResult};
pub use options::{
    BeforeWatch, BeforeWrap, CollectionChanges, Depth, TagFields, WatchOptions, WatchOptionsBuilder,
};
pub use reactive::{
    defer, pending, run_pending, untracked, ArrayCell, Cell, Computed, EventKind, NodeId, NodeMeta,
    Subscription,
};
pub use registry::WatchId;
pub use value::{Func, List, Object, Value};
pub use watch::{
    set_enabled, unwatch, watch, CollectionChange, WatchContext, WatchEvent, WatchHandle,
};
