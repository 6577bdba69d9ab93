#![forbid(unsafe_code)]

//! Reactive data bindings for Formant.
//!
//! This crate provides the change-tracking primitives the model layer is
//! built on:
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Computed`]: a lazily-evaluated, memoized value derived from one or
//!   more `Observable` dependencies, invalidated explicitly on change.
//! - [`reaction`]/[`when`]: explicit observer registration over a declared
//!   set of sources, the stand-in for implicit dependency tracking.
//! - [`Scheduler`]: a single-threaded cooperative task queue used to defer
//!   work to "the next microtask" (validation rounds, coalesced writes).
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared
//! ownership. Subscribers are stored as `Weak` callbacks and cleaned up
//! lazily during notification. Nothing in this crate is `Send`.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version
//!    bump, no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. `Computed::get()` never returns a stale value.

pub mod computed;
pub mod observable;
pub mod reaction;
pub mod scheduler;

pub use computed::Computed;
pub use observable::{Observable, Subscription, Watchable};
pub use reaction::{ReactionHandle, ReactionOptions, reaction, when};
pub use scheduler::Scheduler;
