#![forbid(unsafe_code)]

//! Property-based invariant tests for the reactive primitives.
//!
//! These verify structural invariants that must hold for any sequence of
//! operations:
//!
//! 1. Version increments exactly once per effective mutation.
//! 2. Subscribers fire exactly once per effective mutation.
//! 3. A dropped subscription never fires again.
//! 4. `Computed::get()` always agrees with recomputing from the current
//!    source values (never stale).
//! 5. `Computed` recomputes at most once per invalidation cycle.
//! 6. `update` and `set` agree on versioning.

use std::cell::Cell;
use std::rc::Rc;

use formant_reactive::{Computed, Observable};
use proptest::prelude::*;

/// One scripted mutation against an `Observable<i32>`.
#[derive(Debug, Clone)]
enum Op {
    Set(i32),
    Update(i32),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (-20i32..20).prop_map(Op::Set),
            (-20i32..20).prop_map(Op::Update),
        ],
        0..40,
    )
}

fn apply(obs: &Observable<i32>, op: &Op) {
    match op {
        Op::Set(v) => obs.set(*v),
        Op::Update(v) => obs.update(|cur| *cur = *v),
    }
}

fn target(op: &Op) -> i32 {
    match op {
        Op::Set(v) | Op::Update(v) => *v,
    }
}

proptest! {
    #[test]
    fn version_counts_effective_mutations(initial in -20i32..20, ops in arb_ops()) {
        let obs = Observable::new(initial);
        let mut current = initial;
        let mut effective = 0u64;

        for op in &ops {
            apply(&obs, op);
            if target(op) != current {
                current = target(op);
                effective += 1;
            }
        }
        prop_assert_eq!(obs.version(), effective);
        prop_assert_eq!(obs.get(), current);
    }

    #[test]
    fn subscribers_fire_once_per_effective_mutation(
        initial in -20i32..20,
        ops in arb_ops(),
    ) {
        let obs = Observable::new(initial);
        let fired = Rc::new(Cell::new(0u64));
        let fired_c = Rc::clone(&fired);
        let _sub = obs.subscribe(move |_| fired_c.set(fired_c.get() + 1));

        for op in &ops {
            apply(&obs, op);
        }
        prop_assert_eq!(fired.get(), obs.version());
    }

    #[test]
    fn dropped_subscription_is_silent(
        initial in -20i32..20,
        before in arb_ops(),
        after in arb_ops(),
    ) {
        let obs = Observable::new(initial);
        let fired = Rc::new(Cell::new(0u64));
        let fired_c = Rc::clone(&fired);
        let sub = obs.subscribe(move |_| fired_c.set(fired_c.get() + 1));

        for op in &before {
            apply(&obs, op);
        }
        let fired_before = fired.get();

        drop(sub);
        for op in &after {
            apply(&obs, op);
        }
        prop_assert_eq!(fired.get(), fired_before);
    }

    #[test]
    fn computed_is_never_stale(
        a0 in -20i32..20,
        b0 in -20i32..20,
        ops in proptest::collection::vec(
            ((-20i32..20), any::<bool>(), any::<bool>()),
            0..30,
        ),
    ) {
        let a = Observable::new(a0);
        let b = Observable::new(b0);
        let (ac, bc) = (a.clone(), b.clone());
        let sum = Computed::new(move || ac.get() + bc.get())
            .tracking(&a)
            .tracking(&b);

        for (v, pick_a, read) in ops {
            if pick_a {
                a.set(v);
            } else {
                b.set(v);
            }
            if read {
                prop_assert_eq!(sum.get(), a.get() + b.get());
            }
        }
        prop_assert_eq!(sum.get(), a.get() + b.get());
    }

    #[test]
    fn computed_runs_at_most_once_per_cycle(
        initial in -20i32..20,
        values in proptest::collection::vec(-20i32..20, 0..20),
        reads_per_cycle in 1usize..4,
    ) {
        let runs = Rc::new(Cell::new(0u64));
        let runs_c = Rc::clone(&runs);
        let source = Observable::new(initial);
        let src = source.clone();
        let c = Computed::new(move || {
            runs_c.set(runs_c.get() + 1);
            src.get()
        })
        .tracking(&source);

        for v in &values {
            source.set(*v);
            let before = runs.get();
            for _ in 0..reads_per_cycle {
                prop_assert_eq!(c.get(), source.get());
            }
            // Repeated reads without an intervening change hit the cache.
            prop_assert!(runs.get() <= before + 1);
        }
    }
}
