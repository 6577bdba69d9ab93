#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormError {
    /// Two field specs in one form share a name.
    #[error("duplicate field name: {name}")]
    DuplicateField { name: String },

    /// A subforms field was given a non-list value.
    #[error("field '{name}' expects a list value")]
    ExpectedList { name: String },
}
