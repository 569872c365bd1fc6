//! Trust policy applied to schema-valid records.
//!
//! Schema validity says the shape is right. The trust policy decides how far
//! the content can be believed:
//!
//! 1. **Confidence gate**: a record whose declared confidence is at or below
//!    the acceptance threshold is passed through untouched and flagged
//!    [`TrustLevel::LowConfidence`]. "I don't know" is a usable answer.
//! 2. **Provenance gate**: otherwise every source must start with an approved
//!    URI scheme. The first offending source demotes the whole record
//!    (confidence lowered, note set to `source_format_invalid`, sources
//!    cleared) and the remaining sources are not inspected.
//!
//! Provenance is never checked on a record the model itself flagged as
//! uncertain.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::outcome::ReasonCode;
use crate::record::ValidatedRecord;

/// Confidence at or below which a record is treated as uncertain.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.5;

/// Confidence written into demoted records.
pub const DEMOTED_CONFIDENCE: f64 = 0.45;

/// Note sentinel the model is asked to emit when it does not know.
pub const UNKNOWN_NOTE: &str = "unknown";

/// How much a returned record can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Confident and every source carries an approved scheme
    Trusted,

    /// The model declared confidence at or below the threshold
    LowConfidence,

    /// A source failed the format check; trust fields were overwritten
    Demoted,

    /// The schema declares no confidence field
    Unscored,
}

impl TrustLevel {
    pub fn is_trusted(&self) -> bool {
        matches!(self, TrustLevel::Trusted)
    }
}

/// Policy values and the record fields they apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    pub acceptance_threshold: f64,
    pub demoted_confidence: f64,
    pub approved_prefixes: Vec<String>,
    pub confidence_field: String,
    pub sources_field: String,
    pub note_field: String,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            acceptance_threshold: ACCEPTANCE_THRESHOLD,
            demoted_confidence: DEMOTED_CONFIDENCE,
            approved_prefixes: vec!["http://".to_string(), "https://".to_string()],
            confidence_field: "confidence".to_string(),
            sources_field: "sources".to_string(),
            note_field: "note".to_string(),
        }
    }
}

impl TrustPolicy {
    /// Whether a source string carries an approved scheme prefix.
    pub fn is_approved_source(&self, source: &str) -> bool {
        self.approved_prefixes
            .iter()
            .any(|prefix| source.starts_with(prefix.as_str()))
    }
}

/// A record together with the trust decision taken on it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustAssessment {
    pub record: ValidatedRecord,
    pub level: TrustLevel,
}

/// Applies a [`TrustPolicy`] to validated records.
#[derive(Debug, Clone, Default)]
pub struct TrustEngine {
    policy: TrustPolicy,
}

impl TrustEngine {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Apply the confidence gate, then the provenance gate.
    pub fn assess(&self, mut record: ValidatedRecord) -> TrustAssessment {
        let policy = &self.policy;

        let Some(confidence) = record.get(&policy.confidence_field).and_then(Value::as_f64) else {
            return TrustAssessment {
                record,
                level: TrustLevel::Unscored,
            };
        };

        if confidence <= policy.acceptance_threshold {
            tracing::info!(
                schema = record.schema_name(),
                confidence,
                "Model stated low confidence; record flagged as unverified"
            );
            return TrustAssessment {
                record,
                level: TrustLevel::LowConfidence,
            };
        }

        let offending = record
            .get(&policy.sources_field)
            .and_then(Value::as_array)
            .and_then(|sources| {
                sources
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|s| !policy.is_approved_source(s))
                    .map(str::to_string)
            });

        if let Some(source) = offending {
            tracing::warn!(
                schema = record.schema_name(),
                source = %source,
                "Source without approved URI scheme; demoting record"
            );
            record.overwrite(&policy.confidence_field, json!(policy.demoted_confidence));
            record.overwrite(&policy.note_field, json!(ReasonCode::SourceFormatInvalid.as_str()));
            record.overwrite(&policy.sources_field, json!([]));
            return TrustAssessment {
                record,
                level: TrustLevel::Demoted,
            };
        }

        tracing::info!(schema = record.schema_name(), confidence, "Record validated and plausible");
        TrustAssessment {
            record,
            level: TrustLevel::Trusted,
        }
    }
}
