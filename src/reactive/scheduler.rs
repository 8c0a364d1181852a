//! Deferred ("next tick") task queue.
//!
//! Work that must not run inside the current change notification is pushed
//! here with [`defer`]. The host drains the queue with [`run_pending`] at the
//! end of each turn of its event loop. Tasks may defer further tasks; those
//! run in the same drain, after everything queued before them.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

type Task = Box<dyn FnOnce()>;

struct Queue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

thread_local! {
    static QUEUE: Queue = {
        let (tx, rx) = unbounded();
        Queue { tx, rx }
    };
}

/// Schedule `task` to run on the next [`run_pending`] call on this thread.
pub fn defer(task: impl FnOnce() + 'static) {
    QUEUE.with(|q| {
        // Both ends live in the same thread-local; the channel cannot be disconnected.
        let _ = q.tx.send(Box::new(task));
    });
}

/// Run every queued task, including tasks queued while draining.
///
/// Returns the number of tasks run.
pub fn run_pending() -> usize {
    let mut ran = 0;
    while let Some(task) = QUEUE.with(|q| q.rx.try_recv().ok()) {
        task();
        ran += 1;
    }
    if ran > 0 {
        trace!(tasks = ran, "drained deferred queue");
    }
    ran
}

/// Number of queued tasks.
#[must_use]
pub fn pending() -> usize {
    QUEUE.with(|q| q.rx.len())
}
