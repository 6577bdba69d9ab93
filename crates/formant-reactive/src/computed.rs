#![forbid(unsafe_code)]

//! Lazy computed values that auto-invalidate from [`Observable`] sources.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. Sources are declared explicitly with
//! [`tracking()`](Computed::tracking); a change to any tracked source marks
//! the cached value dirty. The next call to [`get()`](Computed::get)
//! recomputes and caches the result. There is no implicit dependency
//! inference: what you track is what invalidates you.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of
//!    all tracked sources (no stale reads after a source mutation
//!    completes).
//! 2. The compute function runs at most once per invalidation cycle.
//! 3. If nothing invalidated the value, `get()` returns the cache in O(1).
//! 4. Version increments by exactly 1 per recomputation.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the cached value remains from the last
//!   successful computation and the dirty flag stays set, so the next
//!   `get()` retries.
//! - **Source dropped**: the subscription goes inert; the computed value
//!   retains its last cached result and is never dirtied by that source
//!   again.
//! - **Compute mutates a tracked source**: re-entrant borrow, panics. The
//!   compute function must be a pure read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::observable::{Subscription, Watchable};

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    version: Cell<u64>,
    /// Keeps source callbacks alive; never read after registration.
    subscriptions: RefCell<Vec<Subscription>>,
}

impl<T> ComputedInner<T> {
    fn refresh(&self) {
        if self.dirty.get() || self.cached.borrow().is_none() {
            let value = (self.compute)();
            *self.cached.borrow_mut() = Some(value);
            self.dirty.set(false);
            self.version.set(self.version.get() + 1);
        }
    }
}

/// A lazily-evaluated, memoized value derived from explicitly tracked
/// [`Observable`](crate::Observable) sources.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value with no tracked sources yet.
    ///
    /// Starts dirty, so the first `get()` computes. Chain
    /// [`tracking()`](Self::tracking) to wire invalidation.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(ComputedInner {
                compute: Box::new(compute),
                cached: RefCell::new(None),
                dirty: Cell::new(true),
                version: Cell::new(0),
                subscriptions: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Track a source: any change to it marks this value dirty.
    ///
    /// Builder-style; typically chained at construction.
    #[must_use]
    pub fn tracking(self, source: &dyn Watchable) -> Self {
        let weak = Rc::downgrade(&self.inner);
        let sub = source.on_change(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.dirty.set(true);
            }
        }));
        self.inner.subscriptions.borrow_mut().push(sub);
        self
    }

    /// Get the current value, recomputing if any tracked source changed.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.refresh();
        self.inner
            .cached
            .borrow()
            .as_ref()
            .expect("cached is always Some after refresh")
            .clone()
    }

    /// Access the current value by reference without cloning, recomputing
    /// first if dirty.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.refresh();
        let cached = self.inner.cached.borrow();
        f(cached.as_ref().expect("cached is always Some after refresh"))
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Force invalidation. The next `get()` recomputes.
    pub fn invalidate(&self) {
        self.inner.dirty.set(true);
    }

    /// Current version. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Observable;
    use std::cell::Cell;

    #[test]
    fn tracked_source_invalidates() {
        let source = Observable::new(10);
        let src = source.clone();
        let doubled = Computed::new(move || src.get() * 2).tracking(&source);

        assert_eq!(doubled.get(), 20);
        assert_eq!(doubled.version(), 1);

        source.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.version(), 2);
    }

    #[test]
    fn multiple_sources() {
        let width = Observable::new(4);
        let height = Observable::new(3);
        let (w, h) = (width.clone(), height.clone());
        let area = Computed::new(move || w.get() * h.get())
            .tracking(&width)
            .tracking(&height);

        assert_eq!(area.get(), 12);
        width.set(10);
        assert_eq!(area.get(), 30);
        height.set(2);
        assert_eq!(area.get(), 20);
    }

    #[test]
    fn memoization() {
        let runs = Rc::new(Cell::new(0u32));
        let runs_c = Rc::clone(&runs);
        let source = Observable::new(1);
        let src = source.clone();
        let c = Computed::new(move || {
            runs_c.set(runs_c.get() + 1);
            src.get()
        })
        .tracking(&source);

        assert_eq!(c.get(), 1);
        assert_eq!(c.get(), 1);
        assert_eq!(runs.get(), 1);

        source.set(2);
        assert_eq!(c.get(), 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unchanged_set_does_not_dirty() {
        let source = Observable::new(42);
        let src = source.clone();
        let c = Computed::new(move || src.get()).tracking(&source);
        let _ = c.get();

        source.set(42); // equal value, no notification
        assert!(!c.is_dirty());
    }

    #[test]
    fn invalidate_forces_recompute() {
        let source = Observable::new(7);
        let src = source.clone();
        let c = Computed::new(move || src.get()).tracking(&source);
        let _ = c.get();
        assert_eq!(c.version(), 1);

        c.invalidate();
        assert!(c.is_dirty());
        let _ = c.get();
        assert_eq!(c.version(), 2);
    }

    #[test]
    fn clone_shares_cache() {
        let source = Observable::new(1);
        let src = source.clone();
        let a = Computed::new(move || src.get() + 1).tracking(&source);
        let b = a.clone();

        assert_eq!(a.get(), 2);
        source.set(10);
        assert_eq!(b.get(), 11);
        assert_eq!(a.get(), 11);
    }

    #[test]
    fn survives_source_drop() {
        let c;
        {
            let source = Observable::new(9);
            let src = source.clone();
            c = Computed::new(move || src.get()).tracking(&source);
            let _ = c.get();
        }
        // All external handles dropped; cache stays usable.
        assert_eq!(c.get(), 9);
    }

    #[test]
    fn with_avoids_clone() {
        let source = Observable::new(vec![1, 2, 3]);
        let src = source.clone();
        let sum = Computed::new(move || src.with(|v| v.iter().sum::<i32>())).tracking(&source);
        assert_eq!(sum.with(|s| *s), 6);
    }
}
