#![forbid(unsafe_code)]

//! Load and refresh protocol for data-bearing models.
//!
//! A model opts in by embedding a [`LoadSupport`] and implementing
//! [`Loadable::do_load_async`]. Callers then use the provided
//! [`load_async`](Loadable::load_async), [`refresh_async`](Loadable::refresh_async)
//! and [`auto_refresh_async`](Loadable::auto_refresh_async) entry points, which
//! stamp each run with a monotonically increasing load number and record
//! timing and outcome.
//!
//! # Design
//!
//! 1. Every run receives a [`LoadSpec`]. Implementations consult
//!    [`LoadSpec::is_stale`] after each await point and bail out of
//!    post-processing when a newer run has been requested since.
//! 2. An auto-refresh is skipped outright while a user-initiated load is
//!    still pending, so background polling never clobbers explicit work.
//! 3. The `loading` observable tracks only non-auto activity, with
//!    last-one-wins semantics across overlapping runs.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use formant_reactive::Observable;
use futures::future::{LocalBoxFuture, join_all};
use tracing::{debug, error};

#[derive(Default)]
struct LoadState {
    /// Next load number to hand out.
    counter: Cell<u64>,
    /// Most recently issued load number.
    last_requested: Cell<u64>,
    /// Highest load number that completed successfully.
    last_succeeded: Cell<u64>,
    /// Most recently issued non-auto load number.
    last_non_auto: Cell<u64>,
}

/// Metadata describing one load run.
///
/// Handed to [`Loadable::do_load_async`]; cheap to clone into spawned work.
#[derive(Clone)]
pub struct LoadSpec {
    load_number: u64,
    is_refresh: bool,
    is_auto_refresh: bool,
    state: Weak<LoadState>,
}

impl LoadSpec {
    #[must_use]
    pub fn load_number(&self) -> u64 {
        self.load_number
    }

    /// True for refresh and auto-refresh runs, false for an initial load.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.is_refresh
    }

    #[must_use]
    pub fn is_auto_refresh(&self) -> bool {
        self.is_auto_refresh
    }

    /// A newer run has been requested since this one started.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|s| s.last_requested.get() > self.load_number)
    }

    /// A newer run has already completed successfully.
    #[must_use]
    pub fn is_obsolete(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|s| s.last_succeeded.get() > self.load_number)
    }
}

impl std::fmt::Debug for LoadSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSpec")
            .field("load_number", &self.load_number)
            .field("is_refresh", &self.is_refresh)
            .field("is_auto_refresh", &self.is_auto_refresh)
            .finish()
    }
}

/// Bookkeeping embedded by loadable models.
pub struct LoadSupport {
    name: String,
    state: Rc<LoadState>,
    loading: Observable<bool>,
    last_requested_at: Cell<Option<Instant>>,
    last_completed_at: Cell<Option<Instant>>,
    last_exception: RefCell<Option<String>>,
}

impl LoadSupport {
    /// `name` tags log lines emitted on behalf of the owning model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Rc::new(LoadState::default()),
            loading: Observable::new(false),
            last_requested_at: Cell::new(None),
            last_completed_at: Cell::new(None),
            last_exception: RefCell::new(None),
        }
    }

    /// Observable flag: a user-initiated (non-auto) load is in flight.
    #[must_use]
    pub fn loading(&self) -> &Observable<bool> {
        &self.loading
    }

    #[must_use]
    pub fn last_load_requested(&self) -> Option<Instant> {
        self.last_requested_at.get()
    }

    #[must_use]
    pub fn last_load_completed(&self) -> Option<Instant> {
        self.last_completed_at.get()
    }

    /// Message of the most recent failure, cleared by the next success.
    #[must_use]
    pub fn last_load_exception(&self) -> Option<String> {
        self.last_exception.borrow().clone()
    }

    fn begin(&self, is_refresh: bool, is_auto_refresh: bool) -> LoadSpec {
        let n = self.state.counter.get() + 1;
        self.state.counter.set(n);
        self.state.last_requested.set(n);
        if !is_auto_refresh {
            self.state.last_non_auto.set(n);
            self.loading.set(true);
        }
        self.last_requested_at.set(Some(Instant::now()));
        LoadSpec {
            load_number: n,
            is_refresh,
            is_auto_refresh,
            state: Rc::downgrade(&self.state),
        }
    }

    fn finish(&self, spec: &LoadSpec, result: &anyhow::Result<()>, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.last_completed_at.set(Some(Instant::now()));

        // Last one wins: only the most recent non-auto run clears the flag.
        if !spec.is_auto_refresh && spec.load_number == self.state.last_non_auto.get() {
            self.loading.set(false);
        }

        match result {
            Ok(()) => {
                if spec.load_number > self.state.last_succeeded.get() {
                    self.state.last_succeeded.set(spec.load_number);
                }
                *self.last_exception.borrow_mut() = None;
                debug!(
                    model = %self.name,
                    load_number = spec.load_number,
                    elapsed_ms,
                    is_refresh = spec.is_refresh,
                    "load completed"
                );
            }
            Err(e) => {
                *self.last_exception.borrow_mut() = Some(e.to_string());
                error!(
                    model = %self.name,
                    load_number = spec.load_number,
                    elapsed_ms,
                    error = %e,
                    "load failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for LoadSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSupport")
            .field("name", &self.name)
            .field("loading", &self.loading.get())
            .field("last_requested", &self.state.last_requested.get())
            .field("last_succeeded", &self.state.last_succeeded.get())
            .finish()
    }
}

/// Models with managed load/refresh semantics.
pub trait Loadable {
    fn load_support(&self) -> &LoadSupport;

    /// The actual data fetch. Implementations should check
    /// [`LoadSpec::is_stale`] after await points and skip installing
    /// results from a superseded run.
    fn do_load_async(&self, spec: LoadSpec) -> LocalBoxFuture<'_, anyhow::Result<()>>;

    /// Initial load.
    fn load_async(&self) -> LocalBoxFuture<'_, anyhow::Result<()>> {
        load_internal(self, false, false)
    }

    /// User-initiated refresh.
    fn refresh_async(&self) -> LocalBoxFuture<'_, anyhow::Result<()>> {
        load_internal(self, true, false)
    }

    /// Background refresh. Skipped while a non-auto load is pending.
    fn auto_refresh_async(&self) -> LocalBoxFuture<'_, anyhow::Result<()>> {
        load_internal(self, true, true)
    }
}

fn load_internal<L: Loadable + ?Sized>(
    target: &L,
    is_refresh: bool,
    is_auto_refresh: bool,
) -> LocalBoxFuture<'_, anyhow::Result<()>> {
    Box::pin(async move {
        let support = target.load_support();
        if is_auto_refresh && support.loading.get() {
            debug!(model = %support.name, "skipped auto-refresh: load already pending");
            return Ok(());
        }
        let spec = support.begin(is_refresh, is_auto_refresh);
        let started = Instant::now();
        let result = target.do_load_async(spec.clone()).await;
        target.load_support().finish(&spec, &result, started);
        result
    })
}

/// Load a batch of models concurrently. Individual failures are logged and
/// do not abort the rest of the batch.
pub async fn load_all_async(targets: &[&dyn Loadable]) -> usize {
    let results = join_all(targets.iter().map(|t| t.load_async())).await;
    results.iter().filter(|r| r.is_err()).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    struct Counter {
        support: LoadSupport,
        runs: Cell<u32>,
        fail: Cell<bool>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                support: LoadSupport::new("counter"),
                runs: Cell::new(0),
                fail: Cell::new(false),
            }
        }
    }

    impl Loadable for Counter {
        fn load_support(&self) -> &LoadSupport {
            &self.support
        }

        fn do_load_async(&self, _spec: LoadSpec) -> LocalBoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                self.runs.set(self.runs.get() + 1);
                if self.fail.get() {
                    anyhow::bail!("backend unavailable");
                }
                Ok(())
            })
        }
    }

    #[test]
    fn load_records_outcome() {
        let c = Counter::new();
        block_on(c.load_async()).unwrap();
        assert_eq!(c.runs.get(), 1);
        assert!(c.support.last_load_completed().is_some());
        assert!(c.support.last_load_exception().is_none());
        assert!(!c.support.loading().get());
    }

    #[test]
    fn failure_is_recorded_and_cleared_by_next_success() {
        let c = Counter::new();
        c.fail.set(true);
        assert!(block_on(c.refresh_async()).is_err());
        assert_eq!(
            c.support.last_load_exception().as_deref(),
            Some("backend unavailable")
        );

        c.fail.set(false);
        block_on(c.refresh_async()).unwrap();
        assert!(c.support.last_load_exception().is_none());
    }

    #[test]
    fn auto_refresh_skipped_while_loading() {
        let c = Counter::new();
        // Force the pending flag as an overlapping user load would.
        c.support.loading.set(true);
        block_on(c.auto_refresh_async()).unwrap();
        assert_eq!(c.runs.get(), 0);

        c.support.loading.set(false);
        block_on(c.auto_refresh_async()).unwrap();
        assert_eq!(c.runs.get(), 1);
    }

    #[test]
    fn staleness_tracks_newer_requests() {
        let c = Counter::new();
        let first = c.support.begin(false, false);
        assert!(!first.is_stale());
        let _second = c.support.begin(true, false);
        assert!(first.is_stale());
        assert!(!first.is_obsolete());
    }

    #[test]
    fn load_all_counts_failures() {
        let ok = Counter::new();
        let bad = Counter::new();
        bad.fail.set(true);
        let failed = block_on(load_all_async(&[&ok, &bad]));
        assert_eq!(failed, 1);
        assert_eq!(ok.runs.get(), 1);
        assert_eq!(bad.runs.get(), 1);
    }
}
