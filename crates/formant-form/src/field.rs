#![forbid(unsafe_code)]

//! Per-field reactive state machine.
//!
//! # Design
//!
//! A field owns one observable [`Value`], its validation rules and the
//! per-rule issue slots those rules resolve into. Validation state is
//! derived: `Unknown` while any slot is unresolved, then the worst
//! severity found. Each validation round is stamped with a run id; a
//! round only commits its results if no newer round started in the
//! meantime, so visible state never regresses to a stale snapshot.
//!
//! # Invariants
//!
//! 1. Issue slots stay index-aligned with the rules at all times.
//! 2. No automatic validation runs before the field is linked to a form;
//!    linking installs the value-change revalidation and the
//!    display-on-dirty reaction, then kicks the first round.
//! 3. `set_value` never awaits. Callers needing a settled state call
//!    `validate`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use formant_core::{Lifecycle, Value};
use formant_reactive::{
    Computed, Observable, ReactionOptions, Scheduler, Subscription, reaction,
};
use futures::future::{LocalBoxFuture, join_all};

use crate::error::FormError;
use crate::form::{FormInner, FormModel, ValuesView};
use crate::rule::{FieldState, Rule};
use crate::util::gen_display_name;
use crate::validation::{IssueSlots, Severity, ValidationState};

/// Plain-field construction config.
#[derive(Clone)]
pub struct FieldConfig {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) initial_value: Value,
    pub(crate) disabled: bool,
    pub(crate) readonly: bool,
    pub(crate) rules: Vec<Rule>,
}

impl FieldConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            initial_value: Value::Null,
            disabled: false,
            readonly: false,
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = value.into();
        self
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }
}

/// Object-safe contract shared by plain fields and subform collections.
/// Forms hold their members through this trait.
pub trait FormField {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;

    fn value(&self) -> Value;
    /// Atomic mutation. Triggers async revalidation when linked; never
    /// awaits. Errs only for collection fields given a non-list value.
    fn set_value(&self, value: Value) -> Result<(), FormError>;
    fn initial_value(&self) -> Value;

    /// Re-baseline: `None` falls back to the construction-time default.
    /// Implies a `reset`.
    fn init(&self, value: Option<Value>) -> Result<(), FormError>;
    /// Restore the baseline value, clear all issue slots back to
    /// unresolved and hide validation display. A fresh validation pass is
    /// scheduled for the next flush unless one settles the state first.
    fn reset(&self);

    fn get_data(&self) -> Value;
    fn is_dirty(&self) -> bool;
    fn is_required(&self) -> bool;

    fn is_disabled(&self) -> bool;
    fn set_disabled(&self, disabled: bool);
    fn is_readonly(&self) -> bool;
    fn set_readonly(&self, readonly: bool);

    fn errors(&self) -> Vec<String>;
    fn warnings(&self) -> Vec<String>;
    /// Own errors plus, for collections, every child's.
    fn all_errors(&self) -> Vec<String>;
    fn all_warnings(&self) -> Vec<String>;
    fn validation_state(&self) -> ValidationState;
    fn is_valid(&self) -> bool {
        self.validation_state().is_valid()
    }
    fn is_validation_pending(&self) -> bool;
    fn validation_displayed(&self) -> bool;
    /// Pure display flag; does not affect errors or state.
    fn display_validation(&self, include_subforms: bool);

    /// Force a full fresh evaluation of every rule, then optionally flip
    /// the display flag. Resolves to `true` iff the resulting state is
    /// Valid or ValidWithWarnings.
    fn validate(&self, display: bool) -> LocalBoxFuture<'static, bool>;

    fn has_focus(&self) -> bool;
    fn focus(&self);
    fn blur(&self);

    /// Observe value changes; used by the persistence bridge.
    fn watch_value(&self, f: Box<dyn Fn(&Value)>) -> Subscription;

    /// Install the form back-reference and the field's autonomous
    /// reactions. Called exactly once, after every sibling exists.
    fn link_to_form(&self, form: &FormModel);

    fn destroy(&self);

    fn as_any(&self) -> &dyn Any;
}

/// State shared between [`FieldModel`] and the subforms specialization.
pub(crate) struct FieldCore {
    pub(crate) name: String,
    pub(crate) display_name: String,
    pub(crate) orig_initial: Value,
    pub(crate) value: Observable<Value>,
    pub(crate) initial_value: Observable<Value>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) issues: Observable<IssueSlots>,
    pub(crate) validation_displayed: Observable<bool>,
    pub(crate) disabled: Observable<bool>,
    pub(crate) readonly: Observable<bool>,
    pub(crate) run_id: Cell<u64>,
    pub(crate) pending_run: Cell<Option<u64>>,
    pub(crate) form: RefCell<Option<Weak<FormInner>>>,
    pub(crate) scheduler: RefCell<Option<Scheduler>>,
    pub(crate) focused: Cell<bool>,
    pub(crate) lifecycle: Lifecycle,
    /// Overrides the value observable as the rules' input; subform
    /// collections install a children-data snapshot here.
    pub(crate) data_snapshot: RefCell<Option<Box<dyn Fn() -> Value>>>,
    errors: Computed<Vec<String>>,
    warnings: Computed<Vec<String>>,
    state: Computed<ValidationState>,
    dirty: Computed<bool>,
}

fn collect_messages(slots: &IssueSlots, severity: Severity) -> Vec<String> {
    slots
        .iter()
        .flatten()
        .flatten()
        .filter(|i| i.severity() == severity)
        .map(|i| i.message().to_string())
        .collect()
}

impl FieldCore {
    pub(crate) fn new(cfg: FieldConfig) -> Rc<Self> {
        let display_name = cfg
            .display_name
            .unwrap_or_else(|| gen_display_name(&cfg.name));
        let value = Observable::new(cfg.initial_value.clone());
        let initial_value = Observable::new(cfg.initial_value.clone());
        let issues: Observable<IssueSlots> = Observable::new(vec![None; cfg.rules.len()]);

        let issues_c = issues.clone();
        let errors = Computed::new(move || {
            issues_c.with(|s| collect_messages(s, Severity::Error))
        })
        .tracking(&issues);

        let issues_c = issues.clone();
        let warnings = Computed::new(move || {
            issues_c.with(|s| collect_messages(s, Severity::Warning))
        })
        .tracking(&issues);

        let issues_c = issues.clone();
        let state = Computed::new(move || issues_c.with(ValidationState::from_slots))
            .tracking(&issues);

        let (v, i) = (value.clone(), initial_value.clone());
        let dirty = Computed::new(move || v.get() != i.get())
            .tracking(&value)
            .tracking(&initial_value);

        Rc::new(Self {
            name: cfg.name,
            display_name,
            orig_initial: cfg.initial_value,
            value,
            initial_value,
            rules: cfg.rules,
            issues,
            validation_displayed: Observable::new(false),
            disabled: Observable::new(cfg.disabled),
            readonly: Observable::new(cfg.readonly),
            run_id: Cell::new(0),
            pending_run: Cell::new(None),
            form: RefCell::new(None),
            scheduler: RefCell::new(None),
            focused: Cell::new(false),
            lifecycle: Lifecycle::new(),
            data_snapshot: RefCell::new(None),
            errors,
            warnings,
            state,
            dirty,
        })
    }

    pub(crate) fn field_state(&self) -> FieldState {
        let value = match self.data_snapshot.borrow().as_ref() {
            Some(snapshot) => snapshot(),
            None => self.value.get(),
        };
        FieldState {
            value,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub(crate) fn values_view(&self) -> Option<ValuesView> {
        self.form
            .borrow()
            .as_ref()
            .filter(|w| w.strong_count() > 0)
            .map(|w| ValuesView::from_weak(w.clone()))
    }

    pub(crate) fn form_inner(&self) -> Option<Rc<FormInner>> {
        self.form.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.get()
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.warnings.get()
    }

    pub(crate) fn state(&self) -> ValidationState {
        self.state.get()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn is_required(&self) -> bool {
        let Some(values) = self.values_view() else {
            return false;
        };
        let state = self.field_state();
        self.rules
            .iter()
            .any(|r| r.requires_value(&state, Some(&values)))
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled.get() || self.form_inner().is_some_and(|f| f.disabled.get())
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.readonly.get() || self.form_inner().is_some_and(|f| f.readonly.get())
    }

    /// Re-baseline and reset. Scheduling behavior matches [`reset_core`].
    pub(crate) fn init(self: &Rc<Self>, value: Option<Value>) {
        self.initial_value
            .set(value.unwrap_or_else(|| self.orig_initial.clone()));
        reset_core(self);
    }
}

/// Run one full validation round and commit the results unless a newer
/// round started while this one was in flight.
pub(crate) async fn run_round(core: Rc<FieldCore>) {
    if core.lifecycle.is_destroyed() {
        return;
    }
    let run = core.run_id.get() + 1;
    core.run_id.set(run);
    core.pending_run.set(Some(run));

    let state = core.field_state();
    let values = core.values_view();
    let futs: Vec<_> = core
        .rules
        .iter()
        .map(|r| r.evaluate(&state, values.as_ref()))
        .collect();
    let results = join_all(futs).await;

    if core.run_id.get() == run && !core.lifecycle.is_destroyed() {
        core.issues.set(results.into_iter().map(Some).collect());
    }
    if core.pending_run.get() == Some(run) {
        core.pending_run.set(None);
    }
}

/// Fire-and-forget revalidation on the owning form's scheduler. No-op
/// until the field is linked.
pub(crate) fn spawn_round(core: &Rc<FieldCore>) {
    let sched = core.scheduler.borrow().clone();
    if let Some(sched) = sched {
        let core = Rc::clone(core);
        sched.spawn(run_round(core));
    }
}

pub(crate) fn link_core(core: &Rc<FieldCore>, form: &FormModel) {
    let inner = form.inner();
    *core.form.borrow_mut() = Some(Rc::downgrade(inner));
    *core.scheduler.borrow_mut() = Some(inner.scheduler.clone());

    // Revalidate on every value change.
    let weak = Rc::downgrade(core);
    let sched = inner.scheduler.clone();
    let sub = core.value.watch(move || {
        if let Some(core) = weak.upgrade() {
            sched.spawn(run_round(core));
        }
    });
    core.lifecycle.retain(sub);

    // Start displaying validation once the user has dirtied the field.
    let displayed = core.validation_displayed.clone();
    let (v, i) = (core.value.clone(), core.initial_value.clone());
    let handle = reaction(
        &[&core.value, &core.initial_value],
        move || v.get() != i.get(),
        move |dirty, _| {
            if *dirty {
                displayed.set(true);
            }
        },
        ReactionOptions::default(),
    );
    core.lifecycle.retain(handle);

    // First autonomous round, now that every sibling exists.
    spawn_round(core);
}

pub(crate) fn reset_core(core: &Rc<FieldCore>) {
    core.value.set(core.initial_value.get());
    core.issues
        .set(vec![None; core.rules.len()]);
    core.validation_displayed.set(false);

    // Deferred single-shot recheck: skipped if a round is already in
    // flight or something else settled the state by then.
    let sched = core.scheduler.borrow().clone();
    if let Some(sched) = sched {
        let weak = Rc::downgrade(core);
        sched.spawn(async move {
            if let Some(core) = weak.upgrade()
                && core.pending_run.get().is_none()
                && core.state() == ValidationState::Unknown
            {
                run_round(core).await;
            }
        });
    }
}

/// A plain field: one value, its rules and derived validation state.
#[derive(Clone)]
pub struct FieldModel {
    core: Rc<FieldCore>,
}

impl FieldModel {
    #[must_use]
    pub fn new(config: FieldConfig) -> Self {
        Self {
            core: FieldCore::new(config),
        }
    }
}

impl FormField for FieldModel {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn display_name(&self) -> &str {
        &self.core.display_name
    }

    fn value(&self) -> Value {
        self.core.value.get()
    }

    fn set_value(&self, value: Value) -> Result<(), FormError> {
        self.core.value.set(value);
        Ok(())
    }

    fn initial_value(&self) -> Value {
        self.core.initial_value.get()
    }

    fn init(&self, value: Option<Value>) -> Result<(), FormError> {
        self.core.init(value);
        Ok(())
    }

    fn reset(&self) {
        reset_core(&self.core);
    }

    fn get_data(&self) -> Value {
        self.core.value.get()
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn is_required(&self) -> bool {
        self.core.is_required()
    }

    fn is_disabled(&self) -> bool {
        self.core.is_disabled()
    }

    fn set_disabled(&self, disabled: bool) {
        self.core.disabled.set(disabled);
    }

    fn is_readonly(&self) -> bool {
        self.core.is_readonly()
    }

    fn set_readonly(&self, readonly: bool) {
        self.core.readonly.set(readonly);
    }

    fn errors(&self) -> Vec<String> {
        self.core.errors()
    }

    fn warnings(&self) -> Vec<String> {
        self.core.warnings()
    }

    fn all_errors(&self) -> Vec<String> {
        self.core.errors()
    }

    fn all_warnings(&self) -> Vec<String> {
        self.core.warnings()
    }

    fn validation_state(&self) -> ValidationState {
        self.core.state()
    }

    fn is_validation_pending(&self) -> bool {
        self.core.pending_run.get().is_some()
    }

    fn validation_displayed(&self) -> bool {
        self.core.validation_displayed.get()
    }

    fn display_validation(&self, _include_subforms: bool) {
        self.core.validation_displayed.set(true);
    }

    fn validate(&self, display: bool) -> LocalBoxFuture<'static, bool> {
        let core = Rc::clone(&self.core);
        Box::pin(async move {
            run_round(Rc::clone(&core)).await;
            if display {
                core.validation_displayed.set(true);
            }
            core.state().is_valid()
        })
    }

    fn has_focus(&self) -> bool {
        self.core.focused.get()
    }

    fn focus(&self) {
        self.core.focused.set(true);
    }

    fn blur(&self) {
        self.core.focused.set(false);
    }

    fn watch_value(&self, f: Box<dyn Fn(&Value)>) -> Subscription {
        self.core.value.subscribe(move |v| f(v))
    }

    fn link_to_form(&self, form: &FormModel) {
        link_core(&self.core, form);
    }

    fn destroy(&self) {
        self.core.lifecycle.destroy();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for FieldModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldModel")
            .field("name", &self.core.name)
            .field("value", &self.core.value.get())
            .field("state", &self.core.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
