//! Schema validation of candidate records.
//!
//! The validator accepts or rejects; it never repairs. A rejected candidate
//! is discarded and the caller falls back to a safe default.

use thiserror::Error;

use crate::outcome::{ReasonCode, ReasonCoded};
use crate::record::{CandidateRecord, ValidatedRecord};
use crate::schema::{SchemaModel, Violation};

/// The candidate failed one or more schema constraints.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema '{schema}' rejected candidate: {}", summarize(.violations))]
pub struct SchemaViolation {
    pub schema: String,
    pub violations: Vec<Violation>,
}

impl SchemaViolation {
    /// Whether a violation was reported for `field` under `rule`.
    pub fn has(&self, field: &str, rule: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && v.rule == rule)
    }
}

impl ReasonCoded for SchemaViolation {
    fn reason_code(&self) -> ReasonCode {
        ReasonCode::UnknownValidationFailed
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs a schema model against candidate records.
pub struct Validator<'a> {
    schema: &'a SchemaModel,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self { schema }
    }

    /// Build a validated record or report every violation.
    pub fn validate(
        &self,
        candidate: &CandidateRecord,
    ) -> Result<ValidatedRecord, SchemaViolation> {
        match self.schema.check(candidate.fields()) {
            Ok(fields) => {
                tracing::debug!(schema = self.schema.name(), "Candidate passed schema validation");
                Ok(ValidatedRecord::new(self.schema.name(), fields))
            }
            Err(violations) => {
                tracing::warn!(
                    schema = self.schema.name(),
                    violations = violations.len(),
                    "Candidate failed schema validation"
                );
                Err(SchemaViolation {
                    schema: self.schema.name().to_string(),
                    violations,
                })
            }
        }
    }
}
