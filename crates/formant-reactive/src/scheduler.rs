#![forbid(unsafe_code)]

//! Single-threaded cooperative task scheduler.
//!
//! The model layer defers work (validation rounds, coalesced persistence
//! writes, post-reset checks) to "the next microtask". [`Scheduler`] is
//! the explicit event-loop stand-in for that: a thin shared handle over a
//! [`futures::executor::LocalPool`].
//!
//! Tasks are plain `'static` futures with no output. They run interleaved
//! on one thread when the owner calls
//! [`run_until_stalled()`](Scheduler::run_until_stalled); there is no
//! background thread and no parallelism.
//!
//! # Invariants
//!
//! 1. `spawn` never blocks and may be called from inside a running task.
//! 2. `run_until_stalled` drives every ready task until all are either
//!    complete or parked on an external wakeup.
//! 3. Tasks must not call `run_until_stalled` re-entrantly (the pool is
//!    borrowed for the duration of the run).

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

/// Cheap-clone handle to a single-threaded task pool.
#[derive(Clone)]
pub struct Scheduler {
    pool: Rc<RefCell<LocalPool>>,
    spawner: LocalSpawner,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new, empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: Rc::new(RefCell::new(pool)),
            spawner,
        }
    }

    /// Queue a fire-and-forget task.
    ///
    /// Safe to call from inside a running task; the new task is picked up
    /// within the same `run_until_stalled` call.
    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        if self.spawner.spawn_local(fut).is_err() {
            // Only happens if the pool itself has been dropped.
            tracing::warn!("scheduler dropped; task discarded");
        }
    }

    /// Drive all queued tasks until none can make further progress.
    ///
    /// Returns with tasks still pending only when they are parked on an
    /// external wakeup (e.g. a channel that has not been written yet).
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
