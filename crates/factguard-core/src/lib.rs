//! # factguard-core
//!
//! Deterministic guardrails for structured LLM output.
//!
//! This crate answers, for a payload that has already been decoded:
//! - Does it have the declared shape?
//! - How far can its content be trusted?
//! - What does the caller receive if either answer is "no"?
//!
//! ## Key Guarantees
//!
//! 1. **No LLM calls**: everything here is pure and synchronous
//! 2. **No partial records**: callers get a validated record or a safe default
//! 3. **Closed taxonomy**: every rejection carries one [`ReasonCode`]
//! 4. **Deterministic**: constraint order and trust decisions never vary
//!
//! ## Example
//!
//! ```rust
//! use factguard_core::{fact_card, CandidateRecord, OutcomeNormalizer, TrustEngine, Validator};
//! use serde_json::json;
//!
//! let schema = fact_card();
//! let candidate = CandidateRecord::from_value(json!({
//!     "claim": "The ISS was launched in 1998.",
//!     "confidence": 0.9,
//!     "sources": ["wikipedia"]
//! })).unwrap();
//!
//! let normalizer = OutcomeNormalizer::new(&schema);
//! let outcome = normalizer.normalize(
//!     "When was the ISS launched?",
//!     Validator::new(&schema)
//!         .validate(&candidate)
//!         .map(|record| TrustEngine::default().assess(record)),
//! );
//!
//! assert_eq!(outcome.to_payload()["note"], "source_format_invalid");
//! ```

pub mod catalog;
pub mod outcome;
pub mod record;
pub mod schema;
pub mod transcript;
pub mod trust;
pub mod validator;

// Re-export main types at crate root
pub use catalog::{book_card, fact_card, BookCard, FactCard};
pub use outcome::{Outcome, OutcomeNormalizer, ReasonCode, ReasonCoded, SafeDefault};
pub use record::{CandidateRecord, ValidatedRecord};
pub use schema::{
    Constraint, FieldSpec, FieldType, Presence, SchemaBuilder, SchemaError, SchemaModel, Violation,
};
pub use transcript::{Role, Transcript, Turn};
pub use trust::{
    TrustAssessment, TrustEngine, TrustLevel, TrustPolicy, ACCEPTANCE_THRESHOLD,
    DEMOTED_CONFIDENCE, UNKNOWN_NOTE,
};
pub use validator::{SchemaViolation, Validator};
