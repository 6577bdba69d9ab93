#![forbid(unsafe_code)]

//! Property-based invariant tests for constraints and state derivation.
//!
//! These verify structural invariants that must hold for any input:
//!
//! 1. `length_is` fails iff the char/element count is out of bounds.
//! 2. `number_is` inclusive bounds admit exactly [min, max].
//! 3. `required` accepts any non-blank string and rejects any
//!    whitespace-only string.
//! 4. Constraints never panic on arbitrary values.
//! 5. `from_slots` is Unknown iff any slot is unresolved.
//! 6. `fold`: any NotValid wins; else any Unknown wins; else Valid.
//! 7. `fold` never yields ValidWithWarnings.
//! 8. `string_excludes` reports exactly the substrings present.

use formant_core::Value;
use formant_form::constraints::{
    LengthIs, NumberIs, length_is, number_is, required, string_excludes,
};
use formant_form::{
    Constraint, FieldState, IssueSlots, Rule, ValidationIssue, ValidationState, ValuesView,
};
use futures::executor::block_on;
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn issues(c: &Constraint, value: Value) -> Vec<ValidationIssue> {
    let state = FieldState {
        value,
        name: "field".into(),
        display_name: "Field".into(),
    };
    let view = ValuesView::detached();
    block_on(Rule::from(c.clone()).evaluate(&state, Some(&view)))
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        ".{0,40}".prop_map(Value::from),
        proptest::collection::vec(any::<i64>().prop_map(Value::Int), 0..8)
            .prop_map(Value::List),
    ]
}

fn arb_state() -> impl Strategy<Value = ValidationState> {
    prop_oneof![
        Just(ValidationState::Valid),
        Just(ValidationState::ValidWithWarnings),
        Just(ValidationState::NotValid),
        Just(ValidationState::Unknown),
    ]
}

fn arb_slot() -> impl Strategy<Value = Option<Vec<ValidationIssue>>> {
    prop_oneof![
        Just(None),
        Just(Some(vec![])),
        Just(Some(vec![ValidationIssue::warning("w")])),
        Just(Some(vec![ValidationIssue::error("e")])),
        Just(Some(vec![
            ValidationIssue::warning("w"),
            ValidationIssue::error("e"),
        ])),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Bound constraints fail exactly out of bounds
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn length_fails_iff_out_of_bounds(
        s in ".{0,60}",
        min in 0usize..20,
        span in 0usize..20,
    ) {
        let max = min + span;
        let c = length_is(LengthIs { min: Some(min), max: Some(max) });
        let count = s.chars().count();
        let failed = !issues(&c, Value::from(s)).is_empty();
        prop_assert_eq!(failed, count < min || count > max);
    }

    #[test]
    fn number_inclusive_bounds(
        n in -1000i64..1000,
        min in -500i64..0,
        max in 0i64..500,
    ) {
        let c = number_is(NumberIs {
            min: Some(min as f64),
            max: Some(max as f64),
            ..Default::default()
        });
        let failed = !issues(&c, Value::Int(n)).is_empty();
        prop_assert_eq!(failed, n < min || n > max);
    }

    #[test]
    fn strict_bounds_exclude_the_endpoints(n in -100i64..100) {
        let c = number_is(NumberIs {
            gt: Some(-50.0),
            lt: Some(50.0),
            ..Default::default()
        });
        let failed = !issues(&c, Value::Int(n)).is_empty();
        prop_assert_eq!(failed, n <= -50 || n >= 50);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3-4. required and panic-freedom
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn required_rejects_exactly_blank_strings(s in ".{0,40}") {
        let blank = s.trim().is_empty();
        let failed = !issues(&required(), Value::from(s)).is_empty();
        prop_assert_eq!(failed, blank);
    }

    #[test]
    fn required_rejects_exactly_empty_lists(
        items in proptest::collection::vec(any::<i64>(), 0..6),
    ) {
        let empty = items.is_empty();
        let value = Value::List(items.into_iter().map(Value::Int).collect());
        let failed = !issues(&required(), value).is_empty();
        prop_assert_eq!(failed, empty);
    }

    #[test]
    fn constraints_never_panic(value in arb_value()) {
        let _ = issues(&required(), value.clone());
        let _ = issues(&length_is(LengthIs { min: Some(1), max: Some(5) }), value.clone());
        let _ = issues(
            &number_is(NumberIs { min: Some(0.0), not_zero: true, ..Default::default() }),
            value,
        );
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. from_slots: unresolved slots dominate
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unresolved_slots_mean_unknown(
        slots in proptest::collection::vec(arb_slot(), 0..8),
    ) {
        let slots: IssueSlots = slots;
        let state = ValidationState::from_slots(&slots);
        let any_unresolved = slots.iter().any(Option::is_none);
        prop_assert_eq!(state == ValidationState::Unknown, any_unresolved);

        if !any_unresolved {
            let any_error = slots
                .iter()
                .flatten()
                .flatten()
                .any(|i| i.severity() == formant_form::Severity::Error);
            prop_assert_eq!(state == ValidationState::NotValid, any_error);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6-7. fold precedence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn fold_precedence(states in proptest::collection::vec(arb_state(), 0..10)) {
        let folded = ValidationState::fold(states.iter().copied());
        let expected = if states.contains(&ValidationState::NotValid) {
            ValidationState::NotValid
        } else if states.contains(&ValidationState::Unknown) {
            ValidationState::Unknown
        } else {
            ValidationState::Valid
        };
        prop_assert_eq!(folded, expected);
    }

    #[test]
    fn fold_is_order_independent(
        mut states in proptest::collection::vec(arb_state(), 0..10),
    ) {
        let forward = ValidationState::fold(states.iter().copied());
        states.reverse();
        prop_assert_eq!(ValidationState::fold(states), forward);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 8. string_excludes reports exactly the matches
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn exclusions_report_exactly_the_matches(
        s in "[a-c]{0,30}",
        subs in proptest::collection::vec("[a-c]{1,3}", 1..4),
    ) {
        let c = string_excludes(subs.clone());
        let reported = issues(&c, Value::from(s.clone())).len();
        let present = subs.iter().filter(|sub| s.contains(sub.as_str())).count();
        prop_assert_eq!(reported, present);
    }
}
