#![forbid(unsafe_code)]

//! Explicit observer registration over a declared set of sources.
//!
//! A [`reaction`] re-evaluates a `track` function whenever any of its
//! declared sources changes, and invokes `run` only when the tracked output
//! itself changed (compared structurally by default, or via a custom
//! comparer). A [`when`] fires its body at most once, the first time its
//! predicate becomes true, then unsubscribes itself.
//!
//! These are the explicit-subscription replacement for implicit dependency
//! tracking: the source list is declared once at setup time rather than
//! inferred per run. Both return a [`ReactionHandle`]; dropping it disposes
//! the reaction.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::observable::{Subscription, Watchable};
use crate::scheduler::Scheduler;

/// Disposer for a registered reaction. Dropping it tears the reaction down.
#[derive(Debug)]
pub struct ReactionHandle {
    _subs: Rc<RefCell<Vec<Subscription>>>,
}

/// Options governing how a [`reaction`] compares and schedules runs.
pub struct ReactionOptions<T> {
    /// Run once immediately at registration (with no previous value).
    pub fire_immediately: bool,
    /// Custom output comparer. Defaults to `PartialEq`.
    pub equals: Option<Rc<dyn Fn(&T, &T) -> bool>>,
    /// Coalesce bursts of source changes into at most one run per scheduler
    /// flush, instead of running synchronously on every change.
    pub coalesce: Option<Scheduler>,
}

impl<T> Default for ReactionOptions<T> {
    fn default() -> Self {
        Self {
            fire_immediately: false,
            equals: None,
            coalesce: None,
        }
    }
}

struct ReactionState<T> {
    track: Box<dyn Fn() -> T>,
    run: RefCell<Box<dyn FnMut(&T, Option<&T>)>>,
    last: RefCell<Option<T>>,
    equals: Option<Rc<dyn Fn(&T, &T) -> bool>>,
    scheduled: Cell<bool>,
}

impl<T: PartialEq> ReactionState<T> {
    fn evaluate(&self) {
        let current = (self.track)();
        let changed = {
            let last = self.last.borrow();
            match (last.as_ref(), &self.equals) {
                (None, _) => true,
                (Some(prev), Some(eq)) => !eq(prev, &current),
                (Some(prev), None) => prev != &current,
            }
        };
        if changed {
            let prev = self.last.replace(Some(current));
            let last = self.last.borrow();
            let current = last.as_ref().expect("just stored");
            (self.run.borrow_mut())(current, prev.as_ref());
        }
    }
}

/// Register a reaction: re-evaluate `track` on any change to `sources` and
/// call `run(current, previous)` when its output changed.
///
/// The run function receives `previous = None` only for an immediate fire
/// at registration time.
pub fn reaction<T: PartialEq + 'static>(
    sources: &[&dyn Watchable],
    track: impl Fn() -> T + 'static,
    run: impl FnMut(&T, Option<&T>) + 'static,
    opts: ReactionOptions<T>,
) -> ReactionHandle {
    let state = Rc::new(ReactionState {
        track: Box::new(track),
        run: RefCell::new(Box::new(run)),
        last: RefCell::new(None),
        equals: opts.equals,
        scheduled: Cell::new(false),
    });

    if opts.fire_immediately {
        state.evaluate();
    } else {
        // Prime the baseline so the first change compares against it.
        *state.last.borrow_mut() = Some((state.track)());
    }

    let trigger: Rc<dyn Fn()> = match opts.coalesce {
        None => {
            let state = Rc::clone(&state);
            Rc::new(move || state.evaluate())
        }
        Some(sched) => {
            let state = Rc::clone(&state);
            Rc::new(move || {
                if state.scheduled.replace(true) {
                    return;
                }
                let state = Rc::clone(&state);
                sched.spawn(async move {
                    state.scheduled.set(false);
                    state.evaluate();
                });
            })
        }
    };

    let subs = sources
        .iter()
        .map(|s| s.on_change(Rc::clone(&trigger)))
        .collect();
    ReactionHandle {
        _subs: Rc::new(RefCell::new(subs)),
    }
}

/// Register a one-shot observer: the first time `pred` returns true
/// (checked at registration and after every source change), `run` fires
/// and the observer unsubscribes itself.
pub fn when(
    sources: &[&dyn Watchable],
    pred: impl Fn() -> bool + 'static,
    run: impl FnOnce() + 'static,
) -> ReactionHandle {
    let subs: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
    let body = Rc::new(RefCell::new(Some(run)));

    if pred() {
        if let Some(f) = body.borrow_mut().take() {
            f();
        }
        return ReactionHandle { _subs: subs };
    }

    // Weak: the handle owns the only strong reference to the subscription
    // list, so dropping it disposes the observer.
    let subs_weak = Rc::downgrade(&subs);
    let trigger: Rc<dyn Fn()> = Rc::new(move || {
        if body.borrow().is_none() || !pred() {
            return;
        }
        if let Some(f) = body.borrow_mut().take() {
            f();
        }
        if let Some(subs) = subs_weak.upgrade() {
            subs.borrow_mut().clear();
        }
    });

    let registered: Vec<Subscription> = sources
        .iter()
        .map(|s| s.on_change(Rc::clone(&trigger)))
        .collect();
    *subs.borrow_mut() = registered;
    ReactionHandle { _subs: subs }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
