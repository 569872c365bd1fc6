//! Structured payload extraction from response envelopes.
//!
//! Purely syntactic: locate the payload, decode it, require a JSON object.
//! Whether the object has the right fields is the validator's concern.

use factguard_core::schema::json_kind;
use factguard_core::{CandidateRecord, ReasonCode, ReasonCoded};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::providers::ResponseEnvelope;

lazy_static! {
    /// A whole body wrapped in a Markdown code fence, optionally tagged `json`.
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```(?:json|JSON)?[ \t]*\n?(.*?)\s*```\s*$").unwrap();
}

/// The payload could not be turned into a candidate record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("expected a call to '{expected}' but the response carried no tool call")]
    MissingToolCall { expected: String },

    #[error("expected a call to '{expected}', got '{actual}'")]
    UnexpectedTool { expected: String, actual: String },

    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is JSON but not an object (found {0})")]
    NotAnObject(&'static str),
}

impl ReasonCoded for ExtractionError {
    fn reason_code(&self) -> ReasonCode {
        ReasonCode::UnknownJsonInvalid
    }
}

/// Extracts candidate records for one expected tool.
#[derive(Debug, Clone)]
pub struct StructuredParser {
    tool_name: String,
    require_tool_call: bool,
}

impl StructuredParser {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            require_tool_call: true,
        }
    }

    /// Accept plain message bodies as well as tool calls.
    pub fn allow_message_body(mut self) -> Self {
        self.require_tool_call = false;
        self
    }

    pub fn extract(&self, envelope: &ResponseEnvelope) -> Result<CandidateRecord, ExtractionError> {
        let text = match envelope {
            ResponseEnvelope::ToolCall(call) => {
                if call.name != self.tool_name {
                    return Err(ExtractionError::UnexpectedTool {
                        expected: self.tool_name.clone(),
                        actual: call.name.clone(),
                    });
                }
                call.arguments.as_str()
            }
            ResponseEnvelope::Message(_) if self.require_tool_call => {
                return Err(ExtractionError::MissingToolCall {
                    expected: self.tool_name.clone(),
                });
            }
            ResponseEnvelope::Message(content) => unwrap_code_fence(content),
        };

        debug!(tool = %self.tool_name, bytes = text.len(), "Decoding payload");
        decode(text)
    }
}

fn unwrap_code_fence(content: &str) -> &str {
    CODE_FENCE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map_or(content, |m| m.as_str())
}

fn decode(text: &str) -> Result<CandidateRecord, ExtractionError> {
    if text.trim().is_empty() {
        return Err(ExtractionError::EmptyPayload);
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

    CandidateRecord::from_value(value)
        .map_err(|other| ExtractionError::NotAnObject(json_kind(&other)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolCall;
    use proptest::prelude::*;

    fn call(name: &str, arguments: &str) -> ResponseEnvelope {
        ResponseEnvelope::ToolCall(ToolCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    #[test]
    fn test_extracts_tool_call_arguments() {
        let parser = StructuredParser::new("fact_card");
        let record = parser
            .extract(&call("fact_card", r#"{"claim": "x", "confidence": 0.2}"#))
            .unwrap();
        assert_eq!(record.get("claim").unwrap(), "x");
    }

    #[test]
    fn test_truncated_json_is_malformed() {
        let parser = StructuredParser::new("fact_card");
        let err = parser
            .extract(&call("fact_card", r#"{"claim": "The ISS"#))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidJson(_)));
        assert_eq!(err.reason_code(), ReasonCode::UnknownJsonInvalid);
    }

    #[test]
    fn test_wrong_tool_name() {
        let parser = StructuredParser::new("fact_card");
        assert_eq!(
            parser.extract(&call("book_card", "{}")).unwrap_err(),
            ExtractionError::UnexpectedTool {
                expected: "fact_card".to_string(),
                actual: "book_card".to_string(),
            }
        );
    }

    #[test]
    fn test_message_rejected_when_tool_call_required() {
        let parser = StructuredParser::new("fact_card");
        let err = parser
            .extract(&ResponseEnvelope::Message(r#"{"claim": "x"}"#.to_string()))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingToolCall { .. }));
    }

    #[test]
    fn test_message_body_with_code_fence() {
        let parser = StructuredParser::new("fact_card").allow_message_body();
        let body = "```json\n{\"claim\": \"x\", \"confidence\": 0.1}\n```";
        let record = parser
            .extract(&ResponseEnvelope::Message(body.to_string()))
            .unwrap();
        assert_eq!(record.get("confidence").unwrap(), 0.1);

        let bare = "```\n{\"claim\": \"y\"}\n```\n";
        let record = parser
            .extract(&ResponseEnvelope::Message(bare.to_string()))
            .unwrap();
        assert_eq!(record.get("claim").unwrap(), "y");
    }

    #[test]
    fn test_non_object_payloads() {
        let parser = StructuredParser::new("fact_card");
        assert_eq!(
            parser.extract(&call("fact_card", "[1, 2]")).unwrap_err(),
            ExtractionError::NotAnObject("array")
        );
        assert_eq!(
            parser.extract(&call("fact_card", "\"text\"")).unwrap_err(),
            ExtractionError::NotAnObject("string")
        );
        assert_eq!(
            parser.extract(&call("fact_card", "  ")).unwrap_err(),
            ExtractionError::EmptyPayload
        );
    }

    proptest! {
        #[test]
        fn prop_fenced_and_bare_bodies_decode_alike(
            fields in proptest::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 0..6),
        ) {
            let object: serde_json::Map<String, serde_json::Value> = fields
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            let text = serde_json::Value::Object(object.clone()).to_string();
            let parser = StructuredParser::new("fact_card").allow_message_body();

            let bare = parser.extract(&ResponseEnvelope::Message(text.clone())).unwrap();
            let fenced = parser
                .extract(&ResponseEnvelope::Message(format!("```json\n{}\n```", text)))
                .unwrap();

            prop_assert_eq!(bare.fields(), &object);
            prop_assert_eq!(fenced.fields(), &object);
        }
    }

    #[test]
    fn test_prose_body_is_invalid_json() {
        let parser = StructuredParser::new("fact_card").allow_message_body();
        let err = parser
            .extract(&ResponseEnvelope::Message("I think it was 1998.".to_string()))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidJson(_)));
    }
}
