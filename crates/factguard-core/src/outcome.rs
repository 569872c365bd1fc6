//! Outcomes and the normalizer that produces them.
//!
//! Every way a guarded call can end maps to exactly one [`Outcome`]:
//! either an accepted record (possibly flagged or demoted) or a rejection
//! carrying a fully formed safe default. Callers never see a partial record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::record::ValidatedRecord;
use crate::schema::SchemaModel;
use crate::trust::{TrustAssessment, TrustLevel};

/// Closed set of reason codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Payload decoded but failed schema constraints
    UnknownValidationFailed,

    /// Payload could not be decoded
    UnknownJsonInvalid,

    /// Backend call failed, or processing faulted unexpectedly
    UnknownApiError,

    /// Demotion note: a source failed the provenance check
    SourceFormatInvalid,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::UnknownValidationFailed => "unknown_validation_failed",
            ReasonCode::UnknownJsonInvalid => "unknown_json_invalid",
            ReasonCode::UnknownApiError => "unknown_api_error",
            ReasonCode::SourceFormatInvalid => "source_format_invalid",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know which reason code they surface as.
pub trait ReasonCoded {
    fn reason_code(&self) -> ReasonCode;
}

/// The record returned in place of a rejected result.
///
/// Always carries the subject field (echoing the query), `confidence: 0.0`,
/// `sources: []` and the reason code as `note`.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeDefault {
    fields: Map<String, Value>,
}

impl SafeDefault {
    pub fn new(subject_field: &str, query: &str, reason: ReasonCode) -> Self {
        let mut fields = Map::new();
        fields.insert(subject_field.to_string(), json!(query));
        fields.insert("confidence".to_string(), json!(0.0));
        fields.insert("sources".to_string(), json!([]));
        fields.insert("note".to_string(), json!(reason.as_str()));
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl Serialize for SafeDefault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Uniform result of a guarded generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        trust: TrustLevel,
        record: ValidatedRecord,
        evaluated_at: DateTime<Utc>,
    },
    Rejected {
        reason: ReasonCode,
        record: SafeDefault,
        /// Diagnostic text from the failing stage (never shown as data)
        detail: String,
        evaluated_at: DateTime<Utc>,
    },
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    /// Reason code for rejections, or the demotion note for demoted records.
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Outcome::Rejected { reason, .. } => Some(*reason),
            Outcome::Accepted {
                trust: TrustLevel::Demoted,
                ..
            } => Some(ReasonCode::SourceFormatInvalid),
            Outcome::Accepted { .. } => None,
        }
    }

    pub fn trust(&self) -> Option<TrustLevel> {
        match self {
            Outcome::Accepted { trust, .. } => Some(*trust),
            Outcome::Rejected { .. } => None,
        }
    }

    /// The caller-facing mapping: the record fields or the safe default.
    pub fn to_payload(&self) -> Value {
        match self {
            Outcome::Accepted { record, .. } => record.to_value(),
            Outcome::Rejected { record, .. } => record.to_value(),
        }
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        match self {
            Outcome::Accepted { evaluated_at, .. } | Outcome::Rejected { evaluated_at, .. } => {
                *evaluated_at
            }
        }
    }
}

/// Converts stage results into outcomes.
pub struct OutcomeNormalizer<'a> {
    schema: &'a SchemaModel,
}

impl<'a> OutcomeNormalizer<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self { schema }
    }

    /// Accepted path.
    pub fn accept(&self, assessment: TrustAssessment) -> Outcome {
        Outcome::Accepted {
            trust: assessment.level,
            record: assessment.record,
            evaluated_at: Utc::now(),
        }
    }

    /// Rejected path with a safe default built from the query.
    pub fn reject(&self, query: &str, reason: ReasonCode, detail: impl Into<String>) -> Outcome {
        let detail = detail.into();
        tracing::warn!(
            schema = self.schema.name(),
            reason = %reason,
            detail = %detail,
            "Rejecting result; returning safe default"
        );
        Outcome::Rejected {
            reason,
            record: SafeDefault::new(self.schema.subject_field(), query, reason),
            detail,
            evaluated_at: Utc::now(),
        }
    }

    /// Map any stage result onto an outcome.
    pub fn normalize<E>(&self, query: &str, result: Result<TrustAssessment, E>) -> Outcome
    where
        E: ReasonCoded + fmt::Display,
    {
        match result {
            Ok(assessment) => self.accept(assessment),
            Err(e) => self.reject(query, e.reason_code(), e.to_string()),
        }
    }
}
