#![forbid(unsafe_code)]

//! Validation rules: ordered bundles of check functions with an optional
//! activation predicate.
//!
//! # Design
//!
//! A [`Constraint`] wraps one check function taking a snapshot of the
//! field's state plus a live view of sibling values, and resolving to zero
//! or more [`ValidationIssue`]s. Checks may be synchronous or genuinely
//! async (e.g. a server-side uniqueness probe).
//!
//! A [`Rule`] is immutable after construction. An inactive rule (its
//! `when` predicate returns false, or the field is not linked to a form)
//! evaluates to an empty result with no side effects.
//!
//! # Invariants
//!
//! 1. Check results are joined preserving declaration order.
//! 2. `requires_value` never runs any check; the `required` constraint is
//!    recognized by a constructor-set marker instead.

use std::rc::Rc;

use formant_core::Value;
use futures::future::{LocalBoxFuture, join_all, ready};

use crate::form::ValuesView;
use crate::validation::ValidationIssue;

/// Snapshot of a field handed to check functions. Owned, so async checks
/// can hold it across await points.
#[derive(Debug, Clone)]
pub struct FieldState {
    pub value: Value,
    pub name: String,
    pub display_name: String,
}

/// Future resolved by one check invocation.
pub type CheckFuture = LocalBoxFuture<'static, Vec<ValidationIssue>>;

type CheckFn = dyn Fn(&FieldState, &ValuesView) -> CheckFuture;

/// One check function, optionally flagged as value-requiring.
#[derive(Clone)]
pub struct Constraint {
    check: Rc<CheckFn>,
    requires_value: bool,
}

impl Constraint {
    /// Wrap a synchronous check. An empty result means the check passed.
    pub fn new(
        f: impl Fn(&FieldState, &ValuesView) -> Vec<ValidationIssue> + 'static,
    ) -> Self {
        Self {
            check: Rc::new(move |state, values| {
                let issues = f(state, values);
                Box::pin(ready(issues))
            }),
            requires_value: false,
        }
    }

    /// Wrap an async check. The returned future must own everything it
    /// needs; clone out of the borrowed arguments before awaiting.
    pub fn new_async(f: impl Fn(&FieldState, &ValuesView) -> CheckFuture + 'static) -> Self {
        Self {
            check: Rc::new(f),
            requires_value: false,
        }
    }

    /// Flag this check as the field's presence requirement, which drives
    /// `is_required` indicators without evaluating anything.
    pub(crate) fn marking_required(mut self) -> Self {
        self.requires_value = true;
        self
    }

    #[must_use]
    pub fn requires_value(&self) -> bool {
        self.requires_value
    }

    pub(crate) fn run(&self, state: &FieldState, values: &ValuesView) -> CheckFuture {
        (self.check)(state, values)
    }
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("requires_value", &self.requires_value)
            .finish_non_exhaustive()
    }
}

type WhenFn = dyn Fn(&FieldState, &ValuesView) -> bool;

/// An immutable validation rule: ordered checks plus an optional
/// activation predicate.
#[derive(Clone)]
pub struct Rule {
    checks: Vec<Constraint>,
    when: Option<Rc<WhenFn>>,
}

impl Rule {
    #[must_use]
    pub fn new(checks: Vec<Constraint>) -> Self {
        Self { checks, when: None }
    }

    /// Gate the whole rule on a predicate over the field and its
    /// siblings, evaluated at validation time.
    #[must_use]
    pub fn when(mut self, pred: impl Fn(&FieldState, &ValuesView) -> bool + 'static) -> Self {
        self.when = Some(Rc::new(pred));
        self
    }

    fn is_active(&self, state: &FieldState, values: Option<&ValuesView>) -> bool {
        let Some(values) = values else {
            // Not linked to a form yet; cross-field context is missing.
            return false;
        };
        self.when.as_ref().is_none_or(|w| w(state, values))
    }

    /// True iff this rule is active and contains the `required` check.
    /// Never evaluates any check.
    #[must_use]
    pub fn requires_value(&self, state: &FieldState, values: Option<&ValuesView>) -> bool {
        self.is_active(state, values) && self.checks.iter().any(Constraint::requires_value)
    }

    /// Evaluate every check concurrently; results are flattened preserving
    /// check order. Inactive rules resolve to empty.
    pub fn evaluate(
        &self,
        state: &FieldState,
        values: Option<&ValuesView>,
    ) -> LocalBoxFuture<'static, Vec<ValidationIssue>> {
        if !self.is_active(state, values) {
            return Box::pin(ready(Vec::new()));
        }
        let values = values.expect("active rule has a values view");
        let futs: Vec<CheckFuture> = self.checks.iter().map(|c| c.run(state, values)).collect();
        Box::pin(async move {
            let results = join_all(futs).await;
            results.into_iter().flatten().collect()
        })
    }
}

impl From<Constraint> for Rule {
    fn from(check: Constraint) -> Self {
        Rule::new(vec![check])
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("checks", &self.checks.len())
            .field("gated", &self.when.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
