#![forbid(unsafe_code)]

//! Formant public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use formant_core as core;
    pub use formant_form as form;
    pub use formant_reactive as reactive;

    pub use formant_core::{Lifecycle, LoadSpec, LoadSupport, Loadable, Value};
    pub use formant_form::{
        Constraint, FieldConfig, FieldModel, FormConfig, FormField, FormModel,
        FormPersistOptions, Rule, SubformsFieldConfig, SubformsFieldModel, ValidationIssue,
        ValidationState, ValuesView,
    };
    pub use formant_reactive::{Computed, Observable, Scheduler};
}
