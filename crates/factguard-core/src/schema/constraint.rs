//! Cross-field and value constraints.
//!
//! Constraints run after every declared field has been assembled (defaults
//! applied), so they always see final values. A constraint that reads a
//! field holding the wrong type stays silent: the type check has already
//! reported that field.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Predicate used by [`Constraint::Custom`].
pub type ConstraintFn = Arc<dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// A single constraint failure.
///
/// Type errors, missing fields and cross-field rules all use this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Field the violation is reported against
    pub field: String,

    /// Identifier of the failed rule (e.g. "type", "required", "range")
    pub rule: String,

    /// Human-readable explanation
    pub reason: String,
}

impl Violation {
    pub fn new(
        field: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.rule, self.reason)
    }
}

/// A declared constraint over the assembled record.
#[derive(Clone)]
pub enum Constraint {
    /// `min <= field <= max`, inclusive. `null` is not checked.
    Range { field: String, min: f64, max: f64 },

    /// `list_field` must be non-empty whenever `numeric_field > threshold`.
    NonEmptyWhenAbove {
        list_field: String,
        numeric_field: String,
        threshold: f64,
    },

    /// Named predicate for rules the built-in variants cannot express.
    Custom {
        name: String,
        field: String,
        check: ConstraintFn,
    },
}

impl Constraint {
    /// Inclusive numeric range.
    pub fn range(field: impl Into<String>, min: f64, max: f64) -> Self {
        Constraint::Range {
            field: field.into(),
            min,
            max,
        }
    }

    /// Conditional non-empty requirement.
    pub fn non_empty_when_above(
        list_field: impl Into<String>,
        numeric_field: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Constraint::NonEmptyWhenAbove {
            list_field: list_field.into(),
            numeric_field: numeric_field.into(),
            threshold,
        }
    }

    /// Custom predicate reported against `field`.
    pub fn custom<F>(name: impl Into<String>, field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        Constraint::Custom {
            name: name.into(),
            field: field.into(),
            check: Arc::new(check),
        }
    }

    /// Rule identifier used in violations.
    pub fn rule_name(&self) -> &str {
        match self {
            Constraint::Range { .. } => "range",
            Constraint::NonEmptyWhenAbove { .. } => "required_when",
            Constraint::Custom { name, .. } => name.as_str(),
        }
    }

    /// Fields this constraint reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Constraint::Range { field, .. } => vec![field.as_str()],
            Constraint::NonEmptyWhenAbove {
                list_field,
                numeric_field,
                ..
            } => vec![list_field.as_str(), numeric_field.as_str()],
            Constraint::Custom { field, .. } => vec![field.as_str()],
        }
    }

    /// Evaluate against a fully assembled record.
    pub fn evaluate(&self, record: &Map<String, Value>) -> Result<(), Violation> {
        match self {
            Constraint::Range { field, min, max } => {
                let Some(value) = record.get(field).and_then(Value::as_f64) else {
                    return Ok(());
                };
                if *min <= value && value <= *max {
                    Ok(())
                } else {
                    Err(Violation::new(
                        field.as_str(),
                        self.rule_name(),
                        format!("{} is out of plausible range [{}, {}]", value, min, max),
                    ))
                }
            }
            Constraint::NonEmptyWhenAbove {
                list_field,
                numeric_field,
                threshold,
            } => {
                let Some(value) = record.get(numeric_field).and_then(Value::as_f64) else {
                    return Ok(());
                };
                let Some(items) = record.get(list_field).and_then(Value::as_array) else {
                    return Ok(());
                };
                if value > *threshold && items.is_empty() {
                    Err(Violation::new(
                        list_field.as_str(),
                        self.rule_name(),
                        format!(
                            "'{}' cannot be empty when '{}' is above {}",
                            list_field, numeric_field, threshold
                        ),
                    ))
                } else {
                    Ok(())
                }
            }
            Constraint::Custom { name, field, check } => {
                check(record)
                    .map_err(|reason| Violation::new(field.as_str(), name.as_str(), reason))
            }
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Range { field, min, max } => f
                .debug_struct("Range")
                .field("field", field)
                .field("min", min)
                .field("max", max)
                .finish(),
            Constraint::NonEmptyWhenAbove {
                list_field,
                numeric_field,
                threshold,
            } => f
                .debug_struct("NonEmptyWhenAbove")
                .field("list_field", list_field)
                .field("numeric_field", numeric_field)
                .field("threshold", threshold)
                .finish(),
            Constraint::Custom { name, field, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("field", field)
                .finish_non_exhaustive(),
        }
    }
}
