#![forbid(unsafe_code)]

//! A field whose value is a managed collection of child forms.
//!
//! # Design
//!
//! Children are built from a shared template config. A bulk `set_value`
//! or `init` rebuilds the full child set from scratch rather than diffing
//! against existing instances; clean-reset semantics are part of the
//! contract. Every model this field created is tracked, and any created
//! model no longer reachable from the current or baseline children is
//! destroyed on the spot.
//!
//! # Invariants
//!
//! 1. The collection's value is always a list.
//! 2. Every child in `children` or `initial_children` was created by this
//!    instance.
//! 3. Dirty-by-shape: the collection is dirty when any child is dirty or
//!    when the exported child data differs from the baseline export, which
//!    catches reorder, insert and remove even with unchanged child values.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use formant_core::Value;
use formant_reactive::{Scheduler, Subscription};
use futures::future::{LocalBoxFuture, join_all};

use crate::error::FormError;
use crate::field::{FieldConfig, FieldCore, FormField, reset_core, run_round, spawn_round};
use crate::form::{FormConfig, FormModel};
use crate::rule::Rule;
use crate::validation::ValidationState;

/// Construction config for a subforms field: collection-level field
/// settings plus the template every child is built from.
#[derive(Clone)]
pub struct SubformsFieldConfig {
    pub(crate) field: FieldConfig,
    pub(crate) template: FormConfig,
    pub(crate) initial_value: Vec<Value>,
}

impl SubformsFieldConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, template: FormConfig) -> Self {
        Self {
            field: FieldConfig::new(name),
            template,
            initial_value: Vec::new(),
        }
    }

    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.field = self.field.display_name(display_name);
        self
    }

    /// Baseline children, one map of initial values per child.
    #[must_use]
    pub fn initial_value(mut self, items: Vec<Value>) -> Self {
        self.initial_value = items;
        self
    }

    /// Collection-level rule (e.g. a length constraint on the list).
    #[must_use]
    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.field = self.field.rule(rule);
        self
    }
}

struct SubState {
    template: FormConfig,
    orig_initial: Vec<Value>,
    scheduler: Scheduler,
    children: RefCell<Vec<FormModel>>,
    initial_children: RefCell<Vec<FormModel>>,
    created: RefCell<Vec<FormModel>>,
}

/// A field managing a dynamic collection of child [`FormModel`]s.
#[derive(Clone)]
pub struct SubformsFieldModel {
    core: Rc<FieldCore>,
    sub: Rc<SubState>,
}

impl SubformsFieldModel {
    #[must_use]
    pub fn new(config: SubformsFieldConfig, scheduler: &Scheduler) -> Self {
        let core = FieldCore::new(config.field);
        let sub = Rc::new(SubState {
            template: config.template,
            orig_initial: config.initial_value,
            scheduler: scheduler.clone(),
            children: RefCell::new(Vec::new()),
            initial_children: RefCell::new(Vec::new()),
            created: RefCell::new(Vec::new()),
        });
        // Collection-level rules see the children's data as the value.
        let sub_c = Rc::clone(&sub);
        *core.data_snapshot.borrow_mut() = Some(Box::new(move || {
            Value::List(
                sub_c
                    .children
                    .borrow()
                    .iter()
                    .map(|c| c.get_data(false))
                    .collect(),
            )
        }));
        Self { core, sub }
    }

    /// Current child forms, in collection order.
    #[must_use]
    pub fn forms(&self) -> Vec<FormModel> {
        self.sub.children.borrow().clone()
    }

    /// Build one child from the template, overlaying `initial_values` on
    /// the template's defaults, and insert it at `index` (default: end).
    pub fn add(
        &self,
        initial_values: BTreeMap<String, Value>,
        index: Option<usize>,
    ) -> Result<FormModel, FormError> {
        let child = self.build_child(&initial_values)?;
        {
            let mut children = self.sub.children.borrow_mut();
            let at = index.unwrap_or(children.len()).min(children.len());
            children.insert(at, child.clone());
        }
        self.after_change();
        Ok(child)
    }

    /// Remove one child instance. Created models no longer reachable from
    /// the current or baseline children are destroyed.
    pub fn remove(&self, child: &FormModel) {
        self.sub
            .children
            .borrow_mut()
            .retain(|c| !c.ptr_eq(child));
        self.cleanup();
        self.after_change();
    }

    fn build_child(
        &self,
        initial_values: &BTreeMap<String, Value>,
    ) -> Result<FormModel, FormError> {
        let mut cfg = self.sub.template.clone();
        for (k, v) in initial_values {
            cfg.initial_values.insert(k.clone(), v.clone());
        }
        let child = FormModel::build(cfg, &self.sub.scheduler)?;
        if let Some(owner) = self.core.form_inner() {
            child.set_parent_inner(Some(&owner));
        }
        if self.is_disabled() {
            child.set_disabled(true);
        }
        if self.is_readonly() {
            child.set_readonly(true);
        }
        self.sub.created.borrow_mut().push(child.clone());
        Ok(child)
    }

    /// Rebuild the full child set from a raw list; each element is the
    /// initial-values map for one fresh child. Non-map elements contribute
    /// no overrides.
    fn parse_value(&self, items: &[Value]) -> Result<Vec<FormModel>, FormError> {
        items
            .iter()
            .map(|item| {
                let empty = BTreeMap::new();
                let map = item.as_map().unwrap_or(&empty);
                self.build_child(map)
            })
            .collect()
    }

    fn cleanup(&self) {
        let children = self.sub.children.borrow();
        let baseline = self.sub.initial_children.borrow();
        self.sub.created.borrow_mut().retain(|m| {
            let reachable = children.iter().any(|c| c.ptr_eq(m))
                || baseline.iter().any(|c| c.ptr_eq(m));
            if !reachable {
                m.destroy();
            }
            reachable
        });
    }

    fn after_change(&self) {
        spawn_round(&self.core);
        if self.is_dirty() {
            self.core.validation_displayed.set(true);
        }
    }

    fn children_data(&self) -> Vec<Value> {
        self.sub
            .children
            .borrow()
            .iter()
            .map(|c| c.get_data(false))
            .collect()
    }

    fn baseline_data(&self) -> Vec<Value> {
        self.sub
            .initial_children
            .borrow()
            .iter()
            .map(|c| c.get_data(false))
            .collect()
    }

    fn expect_list<'a>(&self, value: &'a Value) -> Result<&'a [Value], FormError> {
        value.as_list().ok_or_else(|| FormError::ExpectedList {
            name: self.core.name.clone(),
        })
    }
}

impl FormField for SubformsFieldModel {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn display_name(&self) -> &str {
        &self.core.display_name
    }

    fn value(&self) -> Value {
        Value::List(self.children_data())
    }

    fn set_value(&self, value: Value) -> Result<(), FormError> {
        let items = self.expect_list(&value)?.to_vec();
        let rebuilt = self.parse_value(&items)?;
        *self.sub.children.borrow_mut() = rebuilt;
        self.cleanup();
        self.after_change();
        Ok(())
    }

    fn initial_value(&self) -> Value {
        Value::List(self.baseline_data())
    }

    fn init(&self, value: Option<Value>) -> Result<(), FormError> {
        let items = match value {
            None => self.sub.orig_initial.clone(),
            Some(v) => self.expect_list(&v)?.to_vec(),
        };
        let rebuilt = self.parse_value(&items)?;
        *self.sub.children.borrow_mut() = rebuilt.clone();
        *self.sub.initial_children.borrow_mut() = rebuilt;
        self.cleanup();
        reset_core(&self.core);
        Ok(())
    }

    fn reset(&self) {
        let baseline = self.sub.initial_children.borrow().clone();
        *self.sub.children.borrow_mut() = baseline;
        self.cleanup();
        for child in self.sub.children.borrow().iter() {
            child.reset();
        }
        reset_core(&self.core);
    }

    fn get_data(&self) -> Value {
        Value::List(self.children_data())
    }

    fn is_dirty(&self) -> bool {
        self.sub.children.borrow().iter().any(FormModel::is_dirty)
            || self.children_data() != self.baseline_data()
    }

    fn is_required(&self) -> bool {
        self.core.is_required()
    }

    fn is_disabled(&self) -> bool {
        self.core.is_disabled()
    }

    fn set_disabled(&self, disabled: bool) {
        self.core.disabled.set(disabled);
        for child in self.sub.children.borrow().iter() {
            child.set_disabled(disabled);
        }
    }

    fn is_readonly(&self) -> bool {
        self.core.is_readonly()
    }

    fn set_readonly(&self, readonly: bool) {
        self.core.readonly.set(readonly);
        for child in self.sub.children.borrow().iter() {
            child.set_readonly(readonly);
        }
    }

    fn errors(&self) -> Vec<String> {
        self.core.errors()
    }

    fn warnings(&self) -> Vec<String> {
        self.core.warnings()
    }

    fn all_errors(&self) -> Vec<String> {
        let mut out = self.core.errors();
        for child in self.sub.children.borrow().iter() {
            out.extend(child.all_errors());
        }
        out
    }

    fn all_warnings(&self) -> Vec<String> {
        let mut out = self.core.warnings();
        for child in self.sub.children.borrow().iter() {
            out.extend(child.all_warnings());
        }
        out
    }

    /// Own rule state folded with every child's, NotValid dominating
    /// Unknown dominating Valid.
    fn validation_state(&self) -> ValidationState {
        let own = self.core.state();
        let children: Vec<ValidationState> = self
            .sub
            .children
            .borrow()
            .iter()
            .map(FormModel::validation_state)
            .collect();
        ValidationState::fold(std::iter::once(own).chain(children))
    }

    fn is_validation_pending(&self) -> bool {
        self.core.pending_run.get().is_some()
    }

    fn validation_displayed(&self) -> bool {
        self.core.validation_displayed.get()
    }

    fn display_validation(&self, include_subforms: bool) {
        self.core.validation_displayed.set(true);
        if include_subforms {
            for child in self.sub.children.borrow().iter() {
                child.display_validation(include_subforms);
            }
        }
    }

    fn validate(&self, display: bool) -> LocalBoxFuture<'static, bool> {
        let this = self.clone();
        let children = self.forms();
        Box::pin(async move {
            let own = run_round(Rc::clone(&this.core));
            let child_futs: Vec<_> = children.iter().map(|c| c.validate(display)).collect();
            futures::join!(own, join_all(child_futs));
            if display {
                this.core.validation_displayed.set(true);
            }
            this.validation_state().is_valid()
        })
    }

    fn has_focus(&self) -> bool {
        false
    }

    fn focus(&self) {}

    fn blur(&self) {}

    fn watch_value(&self, _f: Box<dyn Fn(&Value)>) -> Subscription {
        // Collection values are not observable as a unit; the persistence
        // bridge skips subform fields.
        Subscription::inert()
    }

    fn link_to_form(&self, form: &FormModel) {
        let inner = form.inner();
        *self.core.form.borrow_mut() = Some(Rc::downgrade(inner));
        *self.core.scheduler.borrow_mut() = Some(inner.scheduler.clone());
        // Children built during init predate the back-reference.
        for child in self.sub.children.borrow().iter() {
            child.set_parent_inner(Some(inner));
        }
        spawn_round(&self.core);
    }

    fn destroy(&self) {
        self.core.lifecycle.destroy();
        for child in self.sub.created.borrow().iter() {
            child.destroy();
        }
        self.sub.created.borrow_mut().clear();
        self.sub.children.borrow_mut().clear();
        self.sub.initial_children.borrow_mut().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for SubformsFieldModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubformsFieldModel")
            .field("name", &self.core.name)
            .field("children", &self.sub.children.borrow().len())
            .field("created", &self.sub.created.borrow().len())
            .finish()
    }
}
