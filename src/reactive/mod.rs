//! Reactive primitives observed by the watch engine.
//!
//! - [`Cell`]: a gettable/settable slot.
//! - [`ArrayCell`]: an ordered collection reporting before/after snapshots.
//! - [`Computed`]: a derived cell that discovers its dependencies by tracking reads.
//!
//! All primitives are single-threaded (`Rc`-based). Every write notifies
//! `BeforeChange` listeners with the outgoing value, stores, then notifies
//! `Change` listeners with the incoming one. `subscribe` returns the
//! [`Subscription`] handle directly, which is how the engine later finds and
//! disposes exactly the listeners it created.

pub mod array;
pub mod cell;
pub mod computed;
pub mod listeners;
pub mod node;
pub mod scheduler;

pub use array::ArrayCell;
pub use cell::Cell;
pub use computed::{untracked, Computed};
pub use listeners::{EventKind, ListenerSet, Subscription, SubscriptionId};
pub use node::{NodeId, NodeMeta};
pub use scheduler::{defer, pending, run_pending};
