#![forbid(unsafe_code)]

//! Form and field models: declarative rules with async validation, dirty
//! tracking, nested subform collections and best-effort value persistence.
//!
//! # Architecture
//!
//! - [`rule`] / [`constraints`]: immutable validation rules and the
//!   reusable check library.
//! - [`field`]: the per-field reactive state machine with run-counter
//!   race discipline for async checks.
//! - [`subforms`]: fields whose value is a managed collection of child
//!   forms, with create/destroy lifecycle tracking.
//! - [`form`]: the aggregate model, cross-field values view and the
//!   persistence bridge.

pub mod constraints;
pub mod error;
pub mod field;
pub mod form;
pub mod rule;
pub mod subforms;
pub mod util;
pub mod validation;

pub use error::FormError;
pub use field::{FieldConfig, FieldModel, FormField};
pub use form::{FormConfig, FormModel, FormPersistOptions, ValuesView};
pub use rule::{CheckFuture, Constraint, FieldState, Rule};
pub use subforms::{SubformsFieldConfig, SubformsFieldModel};
pub use validation::{IssueSlots, Severity, ValidationIssue, ValidationState};
