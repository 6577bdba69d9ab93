#![forbid(unsafe_code)]

//! Validation outcomes: issues produced by checks and the derived
//! per-field / aggregate validation states.

/// How severe a validation finding is. Errors block validity; warnings
/// do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One finding produced by a failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    message: String,
    severity: Severity,
}

impl ValidationIssue {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

/// Per-rule result slots, index-aligned with a field's rules.
/// `None` means that rule has not been evaluated yet.
pub type IssueSlots = Vec<Option<Vec<ValidationIssue>>>;

/// Validation state of a field, subform collection or form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Valid,
    ValidWithWarnings,
    NotValid,
    /// At least one rule has not resolved yet.
    Unknown,
}

impl ValidationState {
    /// Derive a field-level state from its per-rule issue slots.
    ///
    /// Unknown while any slot is unresolved; otherwise NotValid if any
    /// error is present, ValidWithWarnings if only warnings, else Valid.
    #[must_use]
    pub fn from_slots(slots: &IssueSlots) -> Self {
        if slots.iter().any(Option::is_none) {
            return ValidationState::Unknown;
        }
        let all = slots.iter().flatten().flatten();
        let mut saw_warning = false;
        for issue in all {
            match issue.severity() {
                Severity::Error => return ValidationState::NotValid,
                Severity::Warning => saw_warning = true,
            }
        }
        if saw_warning {
            ValidationState::ValidWithWarnings
        } else {
            ValidationState::Valid
        }
    }

    /// Aggregate fold used at the form and subform-collection level:
    /// NotValid dominates Unknown dominates Valid. Warnings do not
    /// surface in the aggregate.
    #[must_use]
    pub fn fold(states: impl IntoIterator<Item = ValidationState>) -> Self {
        let mut saw_unknown = false;
        for state in states {
            match state {
                ValidationState::NotValid => return ValidationState::NotValid,
                ValidationState::Unknown => saw_unknown = true,
                ValidationState::Valid | ValidationState::ValidWithWarnings => {}
            }
        }
        if saw_unknown {
            ValidationState::Unknown
        } else {
            ValidationState::Valid
        }
    }

    /// Valid and ValidWithWarnings both count as usable.
    #[must_use]
    pub fn is_valid(self) -> bool {
        matches!(
            self,
            ValidationState::Valid | ValidationState::ValidWithWarnings
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
