#![forbid(unsafe_code)]

//! Shared, version-tracked value wrappers with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] holds its value in shared, reference-counted storage.
//! Cloning an `Observable` produces a second handle to the **same** value.
//! Mutations go through [`set()`](Observable::set) or
//! [`update()`](Observable::update), which compare against the current
//! value and notify subscribers only when the value actually changed.
//!
//! Subscribers are held as `Weak` references; the returned [`Subscription`]
//! is the sole strong owner of the callback, so dropping it unsubscribes.
//! Dead entries are swept lazily during notification.
//!
//! # Invariants
//!
//! 1. `version()` increments by exactly 1 per effective mutation.
//! 2. Subscribers run in registration order, after the value is stored and
//!    the borrow released (callbacks may read the observable re-entrantly).
//! 3. A callback must not mutate the observable it is subscribed to.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Concrete holder for one subscriber callback. Kept alive by the
/// [`Subscription`] handle, referenced weakly by the observable.
struct Subscriber<T> {
    notify: Box<dyn Fn(&T)>,
}

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Subscriber<T>>>,
}

/// A shared, observable value.
///
/// Cloning creates a new handle to the same underlying state.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: 'static> Observable<T> {
    /// Create a new observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Current version. Increments by 1 on each effective mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Subscribe to value changes. The callback receives the new value.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use]
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let subscriber = Rc::new(Subscriber {
            notify: Box::new(f),
        });
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&subscriber));
        Subscription::holding(subscriber)
    }

    /// Subscribe without inspecting the new value. Used by heterogeneous
    /// observers (see [`Watchable`]).
    #[must_use]
    pub fn watch(&self, f: impl Fn() + 'static) -> Subscription {
        self.subscribe(move |_| f())
    }

    fn notify(&self) {
        // Collect live callbacks first so the borrow is released before any
        // callback runs; sweep dead entries in the same pass.
        let live: Vec<Rc<Subscriber<T>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for sub in live {
            let inner = self.inner.borrow();
            let value = &inner.value;
            (sub.notify)(value);
        }
    }
}

impl<T: PartialEq + 'static> Observable<T> {
    /// Set a new value. No-op (no version bump, no notifications) when the
    /// new value equals the current one.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Mutate the value in place. Subscribers are notified only if the
    /// mutation changed the value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.value.clone();
            f(&mut inner.value);
            if inner.value == before {
                false
            } else {
                inner.version += 1;
                true
            }
        };
        if changed {
            self.notify();
        }
    }
}

/// RAII guard for a subscriber registration.
///
/// Dropping the subscription removes the callback before the next
/// notification cycle.
pub struct Subscription {
    _guard: Option<Rc<dyn Any>>,
}

impl Subscription {
    pub(crate) fn holding(guard: Rc<dyn Any>) -> Self {
        Self {
            _guard: Some(guard),
        }
    }

    /// A subscription bound to nothing. Useful where an API must return a
    /// subscription but the source has nothing to observe.
    #[must_use]
    pub fn inert() -> Self {
        Self { _guard: None }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self._guard.is_some())
            .finish()
    }
}

/// Type-erased change source, enabling heterogeneous source lists in
/// [`reaction`](crate::reaction::reaction) and friends.
pub trait Watchable {
    /// Register a no-argument change callback.
    fn on_change(&self, f: Rc<dyn Fn()>) -> Subscription;
}

impl<T: 'static> Watchable for Observable<T> {
    fn on_change(&self, f: Rc<dyn Fn()>) -> Subscription {
        self.watch(move || f())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
