#![forbid(unsafe_code)]

//! Reusable constraint factories for field rules.
//!
//! Every factory returns a [`Constraint`] whose check is a pure function
//! of its inputs at call time. Apart from [`required`], all constraints
//! pass on nil values; combine with `required` separately when a value
//! must be present.

use std::sync::OnceLock;

use chrono::{Local, NaiveDate};
use formant_core::Value;
use regex::Regex;

use crate::rule::{Constraint, FieldState};
use crate::validation::ValidationIssue;

fn fail(message: String) -> Vec<ValidationIssue> {
    vec![ValidationIssue::error(message)]
}

/// Fails on nil values, empty or whitespace-only strings, and empty lists.
#[must_use]
pub fn required() -> Constraint {
    Constraint::new(|state: &FieldState, _| {
        let missing = match &state.value {
            Value::Null => true,
            Value::Str(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        };
        if missing {
            fail(format!("{} is required.", state.display_name))
        } else {
            Vec::new()
        }
    })
    .marking_required()
}

/// Bounds for [`length_is`]. Unset bounds are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthIs {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

/// Checks string character count or list element count against bounds.
#[must_use]
pub fn length_is(opts: LengthIs) -> Constraint {
    Constraint::new(move |state: &FieldState, _| {
        let Some(len) = state.value.len() else {
            return Vec::new();
        };
        if let Some(min) = opts.min
            && len < min
        {
            return fail(format!(
                "{} must contain at least {min} characters.",
                state.display_name
            ));
        }
        if let Some(max) = opts.max
            && len > max
        {
            return fail(format!(
                "{} must contain no more than {max} characters.",
                state.display_name
            ));
        }
        Vec::new()
    })
}

/// Bounds for [`number_is`]. `min`/`max` are inclusive, `gt`/`lt` strict.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberIs {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub gt: Option<f64>,
    pub lt: Option<f64>,
    pub not_zero: bool,
}

/// Checks a numeric value against bounds. Non-numeric values fail.
#[must_use]
pub fn number_is(opts: NumberIs) -> Constraint {
    Constraint::new(move |state: &FieldState, _| {
        if state.value.is_nil() {
            return Vec::new();
        }
        let Some(n) = state.value.as_f64() else {
            return fail(format!("{} must be a valid number.", state.display_name));
        };
        let name = &state.display_name;
        if opts.not_zero && n == 0.0 {
            return fail(format!("{name} must not be zero."));
        }
        if let Some(min) = opts.min
            && n < min
        {
            return fail(format!("{name} must be greater than or equal to {min}."));
        }
        if let Some(max) = opts.max
            && n > max
        {
            return fail(format!("{name} must be less than or equal to {max}."));
        }
        if let Some(gt) = opts.gt
            && n <= gt
        {
            return fail(format!("{name} must be greater than {gt}."));
        }
        if let Some(lt) = opts.lt
            && n >= lt
        {
            return fail(format!("{name} must be less than {lt}."));
        }
        Vec::new()
    })
}

/// One end of a [`date_is`] range. The sentinels resolve at validation
/// time, not at rule construction.
#[derive(Debug, Clone, Copy)]
pub enum DateBound {
    On(NaiveDate),
    /// The current instant, at date granularity.
    Now,
    /// Start of today when used as a minimum, end of today as a maximum.
    Today,
}

impl DateBound {
    fn resolve(self) -> NaiveDate {
        match self {
            DateBound::On(d) => d,
            DateBound::Now | DateBound::Today => Local::now().date_naive(),
        }
    }
}

/// Bounds and message format for [`date_is`].
#[derive(Debug, Clone, Default)]
pub struct DateIs {
    pub min: Option<DateBound>,
    pub max: Option<DateBound>,
    /// chrono format string used for literal bounds in messages.
    /// Defaults to `%Y-%m-%d`.
    pub fmt: Option<String>,
}

/// Checks a date value against bounds. Values without a date reading pass.
#[must_use]
pub fn date_is(opts: DateIs) -> Constraint {
    Constraint::new(move |state: &FieldState, _| {
        let Some(date) = state.value.as_date() else {
            return Vec::new();
        };
        let name = &state.display_name;
        let fmt = opts.fmt.as_deref().unwrap_or("%Y-%m-%d");
        if let Some(min) = opts.min
            && date < min.resolve()
        {
            return fail(match min {
                DateBound::Now => format!("{name} must not be in the past."),
                DateBound::Today => format!("{name} must not be before today."),
                DateBound::On(d) => format!("{name} must not be before {}.", d.format(fmt)),
            });
        }
        if let Some(max) = opts.max
            && date > max.resolve()
        {
            return fail(match max {
                DateBound::Now => format!("{name} must not be in the future."),
                DateBound::Today => format!("{name} must not be after today."),
                DateBound::On(d) => format!("{name} must not be after {}.", d.format(fmt)),
            });
        }
        Vec::new()
    })
}

/// Fails if the string value contains any of the forbidden substrings,
/// one issue per match.
#[must_use]
pub fn string_excludes(substrings: impl IntoIterator<Item = impl Into<String>>) -> Constraint {
    let forbidden: Vec<String> = substrings.into_iter().map(Into::into).collect();
    Constraint::new(move |state: &FieldState, _| {
        let Some(s) = state.value.as_str() else {
            return Vec::new();
        };
        forbidden
            .iter()
            .filter(|sub| s.contains(sub.as_str()))
            .map(|sub| {
                ValidationIssue::error(format!(
                    "{} must not include \"{sub}\".",
                    state.display_name
                ))
            })
            .collect()
    })
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Checks that a string value looks like an email address.
#[must_use]
pub fn valid_email() -> Constraint {
    Constraint::new(|state: &FieldState, _| {
        let Some(s) = state.value.as_str() else {
            return Vec::new();
        };
        if email_regex().is_match(s) {
            Vec::new()
        } else {
            fail(format!(
                "{} is not a properly formatted address.",
                state.display_name
            ))
        }
    })
}

/// Checks that a string value parses as JSON.
#[must_use]
pub fn valid_json() -> Constraint {
    Constraint::new(|state: &FieldState, _| {
        let Some(s) = state.value.as_str() else {
            return Vec::new();
        };
        if serde_json::from_str::<serde_json::Value>(s).is_ok() {
            Vec::new()
        } else {
            fail(format!("{} is not valid JSON.", state.display_name))
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::ValuesView;
    use futures::executor::block_on;

    fn check(c: &Constraint, value: Value) -> Vec<String> {
        let state = FieldState {
            value,
            name: "field".into(),
            display_name: "Field".into(),
        };
        let view = ValuesView::detached();
        block_on(c.run(&state, &view))
            .into_iter()
            .map(|i| i.message().to_string())
            .collect()
    }

    #[test]
    fn required_rejects_blank_inputs() {
        let c = required();
        assert_eq!(check(&c, Value::Null), vec!["Field is required."]);
        assert_eq!(check(&c, Value::from("   ")), vec!["Field is required."]);
        assert_eq!(check(&c, Value::List(vec![])), vec!["Field is required."]);
        assert!(check(&c, Value::from("x")).is_empty());
        assert!(check(&c, Value::Int(0)).is_empty());
        assert!(check(&c, Value::Bool(false)).is_empty());
    }

    #[test]
    fn length_bounds() {
        let c = length_is(LengthIs {
            min: Some(3),
            max: Some(5),
        });
        assert_eq!(
            check(&c, Value::from("ab")),
            vec!["Field must contain at least 3 characters."]
        );
        assert_eq!(
            check(&c, Value::from("abcdef")),
            vec!["Field must contain no more than 5 characters."]
        );
        assert!(check(&c, Value::from("abc")).is_empty());
        // Nil and non-measurable values pass.
        assert!(check(&c, Value::Null).is_empty());
        assert!(check(&c, Value::Int(1)).is_empty());
        // Lists measure by element count.
        assert!(!check(&c, Value::from(vec![1i64])).is_empty());
    }

    #[test]
    fn number_bounds() {
        let c = number_is(NumberIs {
            min: Some(0.0),
            max: Some(10.0),
            not_zero: true,
            ..Default::default()
        });
        assert_eq!(check(&c, Value::Int(0)), vec!["Field must not be zero."]);
        assert_eq!(
            check(&c, Value::Float(-1.0)),
            vec!["Field must be greater than or equal to 0."]
        );
        assert_eq!(
            check(&c, Value::Int(11)),
            vec!["Field must be less than or equal to 10."]
        );
        assert!(check(&c, Value::Int(5)).is_empty());
        assert!(check(&c, Value::Null).is_empty());
        assert_eq!(
            check(&c, Value::from("five")),
            vec!["Field must be a valid number."]
        );
    }

    #[test]
    fn strict_number_bounds() {
        let c = number_is(NumberIs {
            gt: Some(0.0),
            lt: Some(1.0),
            ..Default::default()
        });
        assert_eq!(check(&c, Value::Int(0)), vec!["Field must be greater than 0."]);
        assert_eq!(check(&c, Value::Int(1)), vec!["Field must be less than 1."]);
        assert!(check(&c, Value::Float(0.5)).is_empty());
    }

    #[test]
    fn today_bound_resolves_at_check_time() {
        let c = date_is(DateIs {
            min: Some(DateBound::Today),
            ..Default::default()
        });
        let today = Local::now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        assert_eq!(
            check(&c, Value::Date(yesterday)),
            vec!["Field must not be before today."]
        );
        assert!(check(&c, Value::Date(today)).is_empty());
        assert!(check(&c, Value::Null).is_empty());
    }

    #[test]
    fn literal_date_bound_formats_message() {
        let limit = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let c = date_is(DateIs {
            max: Some(DateBound::On(limit)),
            ..Default::default()
        });
        let late = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            check(&c, Value::Date(late)),
            vec!["Field must not be after 2024-06-01."]
        );
        // Date-shaped strings get the date reading too.
        assert_eq!(
            check(&c, Value::from("2024-07-01")),
            vec!["Field must not be after 2024-06-01."]
        );
    }

    #[test]
    fn string_exclusions_report_each_match() {
        let c = string_excludes(["foo", "bar"]);
        assert_eq!(
            check(&c, Value::from("foo and bar")),
            vec![
                "Field must not include \"foo\".",
                "Field must not include \"bar\"."
            ]
        );
        assert!(check(&c, Value::from("clean")).is_empty());
        assert!(check(&c, Value::Null).is_empty());
    }

    #[test]
    fn email_shapes() {
        let c = valid_email();
        assert!(check(&c, Value::from("a.user@example.com")).is_empty());
        assert_eq!(
            check(&c, Value::from("not-an-address")),
            vec!["Field is not a properly formatted address."]
        );
        assert!(check(&c, Value::Null).is_empty());
    }

    #[test]
    fn json_strings() {
        let c = valid_json();
        assert!(check(&c, Value::from(r#"{"a": 1}"#)).is_empty());
        assert_eq!(
            check(&c, Value::from("{nope")),
            vec!["Field is not valid JSON."]
        );
        assert!(check(&c, Value::Null).is_empty());
    }
}
