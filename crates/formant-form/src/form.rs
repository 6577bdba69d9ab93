#![forbid(unsafe_code)]

//! The form aggregate: an ordered, unique-named collection of fields with
//! form-level dirty state, validation fold, bulk operations and optional
//! cross-session persistence of field values.
//!
//! # Design
//!
//! Construction order is load-bearing: field names are checked before any
//! model is built, fields are seeded with their initial values, the
//! persistence bridge restores saved values, and only then does each field
//! receive its form back-reference. The back-reference is what activates a
//! field's autonomous validation reactions, and it must land after every
//! sibling exists so the first cross-field rule evaluation sees a fully
//! populated values view.
//!
//! # Failure Modes
//!
//! - **Duplicate field name**: construction fails before any field model
//!   is built.
//! - **Persistence backend broken**: logged at warn, the field keeps
//!   working with in-memory state only. Never fatal.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};
use std::sync::OnceLock;

use chrono::NaiveDate;
use formant_core::{Lifecycle, PersistenceBackend, PersistenceProvider, Value};
use formant_reactive::{Observable, Scheduler};
use futures::future::{LocalBoxFuture, join_all};
use regex::Regex;
use tracing::warn;

use crate::error::FormError;
use crate::field::{FieldConfig, FieldModel, FormField};
use crate::subforms::{SubformsFieldConfig, SubformsFieldModel};
use crate::validation::ValidationState;

/// One member of a form config: a plain field, a subform collection, or a
/// pre-built instance.
#[derive(Clone)]
pub(crate) enum FieldSpec {
    Field(FieldConfig),
    Subforms(SubformsFieldConfig),
    Instance(Rc<dyn FormField>),
}

impl FieldSpec {
    fn name(&self) -> &str {
        match self {
            FieldSpec::Field(cfg) => &cfg.name,
            FieldSpec::Subforms(cfg) => &cfg.field.name,
            FieldSpec::Instance(f) => f.name(),
        }
    }
}

/// Declarative form construction config. Also serves as the shared child
/// template for subform collections.
#[derive(Clone, Default)]
pub struct FormConfig {
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) initial_values: BTreeMap<String, Value>,
    pub(crate) disabled: bool,
    pub(crate) readonly: bool,
    pub(crate) persist: Option<FormPersistOptions>,
}

impl FormConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, config: FieldConfig) -> Self {
        self.fields.push(FieldSpec::Field(config));
        self
    }

    #[must_use]
    pub fn subforms(mut self, config: SubformsFieldConfig) -> Self {
        self.fields.push(FieldSpec::Subforms(config));
        self
    }

    /// Adopt a pre-built field instance. Avoid in templates shared by
    /// subform collections: cloning the template shares the instance.
    #[must_use]
    pub fn instance(mut self, field: Rc<dyn FormField>) -> Self {
        self.fields.push(FieldSpec::Instance(field));
        self
    }

    /// Seed value for one field, overriding its config-level initial value.
    #[must_use]
    pub fn initial_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.initial_values.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn initial_values(mut self, values: BTreeMap<String, Value>) -> Self {
        self.initial_values.extend(values);
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
    pub fn persist(mut self, options: FormPersistOptions) -> Self {
        self.persist = Some(options);
        self
    }
}

/// Cross-session persistence of field values.
#[derive(Clone)]
pub struct FormPersistOptions {
    pub(crate) backend: Rc<dyn PersistenceBackend>,
    pub(crate) path: String,
    pub(crate) fields: Option<Vec<String>>,
}

impl FormPersistOptions {
    #[must_use]
    pub fn new(backend: Rc<dyn PersistenceBackend>) -> Self {
        Self {
            backend,
            path: "form".to_string(),
            fields: None,
        }
    }

    /// Base path within the backend document. Defaults to `form`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Restrict persistence to the named fields. Defaults to all fields.
    #[must_use]
    pub fn fields(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

pub(crate) struct FormInner {
    pub(crate) fields: Vec<Rc<dyn FormField>>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) parent: RefCell<Option<Weak<FormInner>>>,
    pub(crate) disabled: Observable<bool>,
    pub(crate) readonly: Observable<bool>,
    pub(crate) scheduler: Scheduler,
    pub(crate) lifecycle: Lifecycle,
}

/// Aggregate of named fields. Cheap-clone handle to shared state.
#[derive(Clone)]
pub struct FormModel {
    inner: Rc<FormInner>,
}

impl FormModel {
    /// Build a form from its config. Fails on duplicate field names before
    /// any field model is constructed.
    pub fn build(config: FormConfig, scheduler: &Scheduler) -> Result<Self, FormError> {
        let mut seen = HashSet::new();
        for spec in &config.fields {
            if !seen.insert(spec.name().to_string()) {
                return Err(FormError::DuplicateField {
                    name: spec.name().to_string(),
                });
            }
        }

        let mut fields: Vec<Rc<dyn FormField>> = Vec::with_capacity(config.fields.len());
        for spec in config.fields {
            fields.push(match spec {
                FieldSpec::Field(cfg) => Rc::new(FieldModel::new(cfg)),
                FieldSpec::Subforms(cfg) => Rc::new(SubformsFieldModel::new(cfg, scheduler)),
                FieldSpec::Instance(f) => f,
            });
        }
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();

        let form = Self {
            inner: Rc::new(FormInner {
                fields,
                index,
                parent: RefCell::new(None),
                disabled: Observable::new(config.disabled),
                readonly: Observable::new(config.readonly),
                scheduler: scheduler.clone(),
                lifecycle: Lifecycle::new(),
            }),
        };

        for field in &form.inner.fields {
            field.init(config.initial_values.get(field.name()).cloned())?;
        }
        if let Some(persist) = config.persist {
            init_persist(&form, persist);
        }
        // Back-references last: this activates autonomous validation.
        for field in &form.inner.fields {
            field.link_to_form(&form);
        }
        Ok(form)
    }

    pub(crate) fn inner(&self) -> &Rc<FormInner> {
        &self.inner
    }

    /// Identity comparison; forms are handles to shared state.
    #[must_use]
    pub fn ptr_eq(&self, other: &FormModel) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn fields(&self) -> &[Rc<dyn FormField>] {
        &self.inner.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Rc<dyn FormField>> {
        self.inner
            .index
            .get(name)
            .map(|&i| &self.inner.fields[i])
    }

    /// Read-only view over current field values, for cross-field rules.
    #[must_use]
    pub fn values(&self) -> ValuesView {
        ValuesView::from_weak(Rc::downgrade(&self.inner))
    }

    #[must_use]
    pub fn parent(&self) -> Option<FormModel> {
        self.inner
            .parent
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| FormModel { inner })
    }

    pub(crate) fn set_parent_inner(&self, parent: Option<&Rc<FormInner>>) {
        *self.inner.parent.borrow_mut() = parent.map(Rc::downgrade);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.fields.iter().any(|f| f.is_dirty())
    }

    /// NotValid dominates Unknown dominates Valid. Field-level warnings do
    /// not surface at the form level.
    #[must_use]
    pub fn validation_state(&self) -> ValidationState {
        ValidationState::fold(self.inner.fields.iter().map(|f| f.validation_state()))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_state().is_valid()
    }

    #[must_use]
    pub fn is_validation_pending(&self) -> bool {
        self.inner.fields.iter().any(|f| f.is_validation_pending())
    }

    #[must_use]
    pub fn all_errors(&self) -> Vec<String> {
        self.inner
            .fields
            .iter()
            .flat_map(|f| f.all_errors())
            .collect()
    }

    #[must_use]
    pub fn all_warnings(&self) -> Vec<String> {
        self.inner
            .fields
            .iter()
            .flat_map(|f| f.all_warnings())
            .collect()
    }

    /// Export a plain snapshot keyed by field name. With `dirty_only`,
    /// clean fields are omitted entirely.
    #[must_use]
    pub fn get_data(&self, dirty_only: bool) -> Value {
        let mut map = BTreeMap::new();
        for field in &self.inner.fields {
            if dirty_only && !field.is_dirty() {
                continue;
            }
            map.insert(field.name().to_string(), field.get_data());
        }
        Value::Map(map)
    }

    /// Reinitialize every field; fields absent from `values` fall back to
    /// their construction-time defaults.
    pub fn init(&self, values: Option<&BTreeMap<String, Value>>) -> Result<(), FormError> {
        for field in &self.inner.fields {
            field.init(values.and_then(|m| m.get(field.name())).cloned())?;
        }
        Ok(())
    }

    /// Restore every field to its baseline.
    pub fn reset(&self) {
        for field in &self.inner.fields {
            field.reset();
        }
    }

    /// Push new values into matching-named fields. Unknown keys are
    /// silently ignored; unspecified fields are left untouched.
    pub fn set_values(&self, values: &BTreeMap<String, Value>) -> Result<(), FormError> {
        for (name, value) in values {
            if let Some(field) = self.field(name) {
                field.set_value(value.clone())?;
            }
        }
        Ok(())
    }

    /// Validate every field concurrently, then optionally display
    /// validation. Resolves to the overall validity.
    pub fn validate(&self, display: bool) -> LocalBoxFuture<'static, bool> {
        let form = self.clone();
        Box::pin(async move {
            let futs: Vec<_> = form.inner.fields.iter().map(|f| f.validate(false)).collect();
            join_all(futs).await;
            if display {
                form.display_validation(true);
            }
            form.is_valid()
        })
    }

    pub fn display_validation(&self, include_subforms: bool) {
        for field in &self.inner.fields {
            field.display_validation(include_subforms);
        }
    }

    #[must_use]
    pub fn focused_field(&self) -> Option<&Rc<dyn FormField>> {
        self.inner.fields.iter().find(|f| f.has_focus())
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.get()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.inner.disabled.set(disabled);
    }

    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.inner.readonly.get()
    }

    pub fn set_readonly(&self, readonly: bool) {
        self.inner.readonly.set(readonly);
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.lifecycle.is_destroyed()
    }

    /// Tear down: dispose subscriptions and persistence first, then
    /// destroy every field (recursing through subform children).
    pub fn destroy(&self) {
        self.inner.lifecycle.destroy();
        for field in &self.inner.fields {
            field.destroy();
        }
    }
}

impl std::fmt::Debug for FormModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormModel")
            .field("fields", &self.inner.index.keys().collect::<Vec<_>>())
            .field("state", &self.validation_state())
            .finish()
    }
}

/// Read-only, name-keyed view of a form's current values.
///
/// Holds the form weakly: a view outliving its form answers `None` to
/// everything.
#[derive(Clone)]
pub struct ValuesView {
    form: Weak<FormInner>,
}

impl ValuesView {
    pub(crate) fn from_weak(form: Weak<FormInner>) -> Self {
        Self { form }
    }

    /// A view bound to nothing; every lookup misses.
    #[must_use]
    pub fn detached() -> Self {
        Self { form: Weak::new() }
    }

    /// The named field's current data: a scalar for plain fields, a list
    /// of child data for subform collections. `None` for unknown names.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.form.upgrade()?;
        let form = FormModel { inner };
        form.field(name).map(|f| f.get_data())
    }

    /// Views over the named subform collection's children, in order.
    /// `None` when the name does not refer to a subforms field.
    #[must_use]
    pub fn subforms(&self, name: &str) -> Option<Vec<ValuesView>> {
        let inner = self.form.upgrade()?;
        let form = FormModel { inner };
        let field = form.field(name)?;
        let sub = field.as_any().downcast_ref::<SubformsFieldModel>()?;
        Some(sub.forms().iter().map(FormModel::values).collect())
    }

    /// The enclosing form's view, for rules that reach an ancestor scope.
    #[must_use]
    pub fn parent(&self) -> Option<ValuesView> {
        let inner = self.form.upgrade()?;
        let parent = inner.parent.borrow().clone()?;
        parent.upgrade()?;
        Some(ValuesView::from_weak(parent))
    }
}

impl std::fmt::Debug for ValuesView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValuesView")
            .field("attached", &(self.form.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Persistence bridge
// ---------------------------------------------------------------------------

fn date_shaped() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"))
}

/// Restore a persisted JSON value, reinterpreting date-shaped strings as
/// dates. Known limitation: a literal string field matching the shape is
/// misread as a date.
fn value_from_persisted(json: serde_json::Value) -> Value {
    if let serde_json::Value::String(s) = &json
        && date_shaped().is_match(s)
        && let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
    {
        return Value::Date(d);
    }
    Value::from_json(json)
}

/// Bind each persisted field's value to its own provider at
/// `{base}.{field}.value`. Best-effort throughout: any failure logs and
/// leaves that field un-persisted.
fn init_persist(form: &FormModel, opts: FormPersistOptions) {
    let inner = form.inner();
    let names: Vec<String> = opts.fields.unwrap_or_else(|| {
        inner
            .fields
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    });

    for name in names {
        let Some(field) = form.field(&name) else {
            warn!(field = %name, "persist options name an unknown field; skipping");
            continue;
        };
        if field.as_any().downcast_ref::<SubformsFieldModel>().is_some() {
            warn!(field = %name, "subform collections are not persisted; skipping");
            continue;
        }

        let path = format!("{}.{}.value", opts.path, name);
        let provider = match PersistenceProvider::new(
            Rc::clone(&opts.backend),
            &path,
            Some(inner.scheduler.clone()),
        ) {
            Ok(p) => Rc::new(p),
            Err(e) => {
                warn!(field = %name, error = %e, "persistence disabled for field");
                continue;
            }
        };

        // Capture the default before reading, so a later return to this
        // value clears the stored state instead of re-writing it.
        let default = field.value();
        match provider.read() {
            Ok(Some(json)) => {
                if let Err(e) = field.set_value(value_from_persisted(json)) {
                    warn!(field = %name, error = %e, "failed to restore persisted value");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(field = %name, error = %e, "failed to read persisted value"),
        }

        let p = Rc::clone(&provider);
        let fname = name.clone();
        let sub = field.watch_value(Box::new(move |v: &Value| {
            let result = if *v == default {
                p.clear()
            } else {
                match v.to_json() {
                    Ok(json) => p.write(json),
                    Err(e) => {
                        warn!(field = %fname, error = %e, "value not serializable; not persisted");
                        return;
                    }
                }
            };
            if let Err(e) = result {
                warn!(field = %fname, error = %e, "persist write failed");
            }
        }));
        inner.lifecycle.retain(sub);
        inner.lifecycle.mark_managed(provider);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::required;

    #[test]
    fn duplicate_names_rejected_up_front() {
        let sched = Scheduler::new();
        let config = FormConfig::new()
            .field(FieldConfig::new("email"))
            .field(FieldConfig::new("email").rule(required()));
        let err = FormModel::build(config, &sched).unwrap_err();
        assert!(matches!(err, FormError::DuplicateField { name } if name == "email"));
    }

    #[test]
    fn initial_values_override_field_defaults() {
        let sched = Scheduler::new();
        let form = FormModel::build(
            FormConfig::new()
                .field(FieldConfig::new("a").initial_value(1i64))
                .field(FieldConfig::new("b").initial_value(2i64))
                .initial_value("b", 20i64),
            &sched,
        )
        .unwrap();

        assert_eq!(form.values().get("a"), Some(Value::Int(1)));
        assert_eq!(form.values().get("b"), Some(Value::Int(20)));
        assert!(!form.is_dirty());
    }

    #[test]
    fn unknown_keys_in_set_values_are_ignored() {
        let sched = Scheduler::new();
        let form = FormModel::build(
            FormConfig::new().field(FieldConfig::new("a").initial_value(1i64)),
            &sched,
        )
        .unwrap();

        let mut values = BTreeMap::new();
        values.insert("a".to_string(), Value::Int(5));
        values.insert("nope".to_string(), Value::Int(99));
        form.set_values(&values).unwrap();

        assert_eq!(form.values().get("a"), Some(Value::Int(5)));
        assert_eq!(form.values().get("nope"), None);
    }

    #[test]
    fn date_shaped_strings_restore_as_dates() {
        let restored = value_from_persisted(serde_json::json!("2024-03-15"));
        assert_eq!(
            restored,
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        // Near-misses stay strings.
        assert_eq!(
            value_from_persisted(serde_json::json!("2024-3-15")),
            Value::Str("2024-3-15".into())
        );
        assert_eq!(
            value_from_persisted(serde_json::json!(7)),
            Value::Int(7)
        );
    }
}
