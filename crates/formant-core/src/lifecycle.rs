#![forbid(unsafe_code)]

//! Object lifecycle: disposer registration and cascading destruction.
//!
//! Stateful model objects embed a [`Lifecycle`] rather than inheriting
//! from a base class. It offers two things:
//!
//! - [`retain`](Lifecycle::retain): keep an RAII guard (a subscription or
//!   reaction handle) alive until the owner is destroyed, at which point
//!   the guard is dropped and the registration torn down.
//! - [`mark_managed`](Lifecycle::mark_managed): register a child object
//!   for cascading destruction. A child marked after the owner is already
//!   destroyed (e.g. from a late async callback) is destroyed immediately
//!   instead of queued.
//!
//! # Invariants
//!
//! 1. `destroy()` is idempotent.
//! 2. Disposers are dropped before managed children are destroyed, so no
//!    reaction fires against a partially-torn-down object graph.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Implemented by objects that release resources on explicit destruction.
pub trait Destroy {
    fn destroy(&self);
}

/// Embedded lifecycle state for a stateful model object.
#[derive(Default)]
pub struct Lifecycle {
    destroyed: Cell<bool>,
    disposers: RefCell<Vec<Box<dyn Any>>>,
    managed: RefCell<Vec<Rc<dyn Destroy>>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `guard` alive until destruction. Dropping the guard is what
    /// disposes the underlying registration, so this is how subscriptions
    /// and reaction handles get tied to their owner's lifetime.
    pub fn retain(&self, guard: impl Any) {
        if self.destroyed.get() {
            return; // guard dropped immediately, registration torn down
        }
        self.disposers.borrow_mut().push(Box::new(guard));
    }

    /// Register a child for cascading destruction and hand it back.
    ///
    /// If this lifecycle is already destroyed the child is destroyed on
    /// the spot.
    pub fn mark_managed<T: Destroy + 'static>(&self, child: Rc<T>) -> Rc<T> {
        if self.destroyed.get() {
            child.destroy();
        } else {
            self.managed.borrow_mut().push(Rc::clone(&child) as Rc<dyn Destroy>);
        }
        child
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Tear down: drop all retained guards, then destroy managed children.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.disposers.borrow_mut().clear();
        let children = std::mem::take(&mut *self.managed.borrow_mut());
        for child in children {
            child.destroy();
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("destroyed", &self.destroyed.get())
            .field("disposers", &self.disposers.borrow().len())
            .field("managed", &self.managed.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
