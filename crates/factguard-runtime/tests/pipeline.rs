//! End-to-end pipeline behaviour against a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use factguard_core::{ReasonCode, Role, Transcript, TrustLevel};
use factguard_runtime::{
    GenerationRequest, GenerationResponse, Guardrail, LlmProvider, OutputShape, ProviderError,
    ResponseEnvelope, RuntimeConfig, TokenUsage, ToolCall,
};
use serde_json::{json, Value};

const QUERY: &str = "In what year was the International Space Station (ISS) launched?";

enum Reply {
    Tool(Value),
    Raw(String),
    Body(String),
    Fail(ProviderError),
}

/// Plays back replies in order and records what it was asked.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let tool_name = request
            .tool
            .as_ref()
            .map(|tool| tool.name.clone())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");

        let envelope = match reply {
            Reply::Tool(arguments) => ResponseEnvelope::ToolCall(ToolCall {
                name: tool_name,
                arguments: arguments.to_string(),
            }),
            Reply::Raw(arguments) => ResponseEnvelope::ToolCall(ToolCall {
                name: tool_name,
                arguments,
            }),
            Reply::Body(content) => ResponseEnvelope::Message(content),
            Reply::Fail(error) => return Err(error),
        };

        Ok(GenerationResponse {
            envelope,
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 40,
            },
            model: "scripted".to_string(),
            stop_reason: Some("tool_calls".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn guardrail(provider: Arc<ScriptedProvider>) -> Guardrail {
    Guardrail::fact_card(provider, &RuntimeConfig::default())
}

fn iss_card(confidence: f64, sources: Value) -> Value {
    json!({
        "claim": "The ISS's first module was launched in 1998.",
        "provenance": "NASA mission history",
        "year": 1998,
        "confidence": confidence,
        "sources": sources,
        "note": null
    })
}

#[tokio::test]
async fn test_trusted_record_is_unchanged() {
    let card = iss_card(0.9, json!(["https://x.org"]));
    let provider = ScriptedProvider::new(vec![Reply::Tool(card.clone())]);

    let outcome = guardrail(provider.clone()).evaluate(QUERY).await;

    assert!(outcome.is_accepted());
    assert_eq!(outcome.trust(), Some(TrustLevel::Trusted));
    assert_eq!(outcome.reason(), None);
    assert_eq!(outcome.to_payload(), card);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_bare_source_name_demotes() {
    let provider = ScriptedProvider::new(vec![Reply::Tool(iss_card(0.9, json!(["wikipedia"])))]);

    let outcome = guardrail(provider).evaluate(QUERY).await;

    assert!(outcome.is_accepted());
    assert_eq!(outcome.trust(), Some(TrustLevel::Demoted));
    assert_eq!(outcome.reason(), Some(ReasonCode::SourceFormatInvalid));

    let payload = outcome.to_payload();
    assert_eq!(payload["confidence"], 0.45);
    assert_eq!(payload["sources"], json!([]));
    assert_eq!(payload["note"], "source_format_invalid");
    assert_eq!(payload["claim"], "The ISS's first module was launched in 1998.");
    assert_eq!(payload["year"], 1998);
}

#[tokio::test]
async fn test_first_bad_source_discards_later_good_ones() {
    let provider = ScriptedProvider::new(vec![Reply::Tool(iss_card(
        0.95,
        json!(["https://nasa.gov/iss", "NASA website", "https://esa.int"]),
    ))]);

    let payload = guardrail(provider).evaluate(QUERY).await.to_payload();
    assert_eq!(payload["sources"], json!([]));
    assert_eq!(payload["confidence"], 0.45);
}

#[tokio::test]
async fn test_low_confidence_passes_through() {
    let mut card = iss_card(0.3, json!([]));
    card["note"] = json!("unknown");
    let provider = ScriptedProvider::new(vec![Reply::Tool(card.clone())]);

    let outcome = guardrail(provider).evaluate(QUERY).await;

    assert!(outcome.is_accepted());
    assert_eq!(outcome.trust(), Some(TrustLevel::LowConfidence));
    assert_eq!(outcome.to_payload(), card);
}

#[tokio::test]
async fn test_low_confidence_skips_provenance_check() {
    let card = iss_card(0.5, json!(["wikipedia"]));
    let provider = ScriptedProvider::new(vec![Reply::Tool(card.clone())]);

    let outcome = guardrail(provider).evaluate(QUERY).await;
    assert_eq!(outcome.trust(), Some(TrustLevel::LowConfidence));
    assert_eq!(outcome.to_payload()["sources"], json!(["wikipedia"]));
}

#[tokio::test]
async fn test_missing_required_field_is_rejected() {
    let provider = ScriptedProvider::new(vec![Reply::Tool(json!({
        "claim": "The ISS launched in 1998.",
        "sources": []
    }))]);

    let outcome = guardrail(provider).evaluate(QUERY).await;

    assert!(!outcome.is_accepted());
    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownValidationFailed));
    assert_eq!(
        outcome.to_payload(),
        json!({
            "claim": QUERY,
            "confidence": 0.0,
            "sources": [],
            "note": "unknown_validation_failed"
        })
    );
}

#[tokio::test]
async fn test_confident_without_sources_is_rejected() {
    let provider = ScriptedProvider::new(vec![Reply::Tool(iss_card(0.8, json!([])))]);
    let outcome = guardrail(provider).evaluate(QUERY).await;
    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownValidationFailed));
}

#[tokio::test]
async fn test_implausible_year_is_rejected() {
    let mut card = iss_card(0.9, json!(["https://x.org"]));
    card["year"] = json!(2150);
    let provider = ScriptedProvider::new(vec![Reply::Tool(card)]);

    let outcome = guardrail(provider).evaluate(QUERY).await;
    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownValidationFailed));
}

#[tokio::test]
async fn test_unparseable_payload_is_rejected() {
    let provider = ScriptedProvider::new(vec![Reply::Raw(r#"{"claim": "The ISS was"#.to_string())]);

    let outcome = guardrail(provider).evaluate(QUERY).await;

    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownJsonInvalid));
    assert_eq!(outcome.to_payload()["note"], "unknown_json_invalid");
    assert_eq!(outcome.to_payload()["claim"], QUERY);
}

#[tokio::test]
async fn test_missing_tool_call_is_rejected() {
    let provider = ScriptedProvider::new(vec![Reply::Body("It launched in 1998.".to_string())]);
    let outcome = guardrail(provider).evaluate(QUERY).await;
    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownJsonInvalid));
}

#[tokio::test]
async fn test_json_body_mode_accepts_fenced_message() {
    let card = iss_card(0.9, json!(["https://x.org"]));
    let provider = ScriptedProvider::new(vec![Reply::Body(format!("```json\n{}\n```", card))]);
    let config = RuntimeConfig {
        output: OutputShape::JsonBody,
        ..RuntimeConfig::default()
    };

    let outcome = Guardrail::fact_card(provider.clone(), &config)
        .evaluate(QUERY)
        .await;

    assert_eq!(outcome.trust(), Some(TrustLevel::Trusted));
    let requests = provider.requests.lock().unwrap();
    assert!(requests[0].tool.is_none());
    assert!(requests[0].json_body);
}

#[tokio::test]
async fn test_transport_fault_is_rejected_and_rolled_back() {
    let provider = ScriptedProvider::new(vec![Reply::Fail(ProviderError::ApiError {
        status: 503,
        message: "overloaded".to_string(),
    })]);
    let mut transcript = Transcript::with_system("You are a factual assistant.");

    let outcome = guardrail(provider).evaluate_in(&mut transcript, QUERY).await;

    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownApiError));
    assert_eq!(outcome.to_payload()["note"], "unknown_api_error");
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript.last().unwrap().role, Role::System);
}

#[tokio::test]
async fn test_answered_exchange_is_recorded_even_when_rejected() {
    let raw = r#"{"claim": "x""#;
    let provider = ScriptedProvider::new(vec![Reply::Raw(raw.to_string())]);
    let mut transcript = Transcript::new();

    let outcome = guardrail(provider).evaluate_in(&mut transcript, QUERY).await;

    assert_eq!(outcome.reason(), Some(ReasonCode::UnknownJsonInvalid));
    let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(transcript.turns()[0].content, QUERY);
    assert_eq!(transcript.turns()[1].content, raw);
}

#[tokio::test]
async fn test_transcript_feeds_later_requests() {
    let provider = ScriptedProvider::new(vec![
        Reply::Tool(iss_card(0.9, json!(["https://x.org"]))),
        Reply::Tool(iss_card(0.3, json!([]))),
    ]);
    let guardrail = guardrail(provider.clone());
    let mut transcript = Transcript::new();

    guardrail.evaluate_in(&mut transcript, QUERY).await;
    guardrail
        .evaluate_in(&mut transcript, "Which agencies built it?")
        .await;

    assert_eq!(transcript.len(), 4);
    let requests = provider.requests.lock().unwrap();
    let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
}

#[tokio::test]
async fn test_request_shape() {
    let provider = ScriptedProvider::new(vec![Reply::Tool(iss_card(0.3, json!([])))]);
    guardrail(provider.clone()).evaluate(QUERY).await;

    let requests = provider.requests.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request.temperature, 0.0);
    assert!(request.force_tool);
    let tool = request.tool.as_ref().unwrap();
    assert_eq!(tool.name, "fact_card");
    assert_eq!(tool.parameters["required"], json!(["claim", "confidence"]));
    assert_eq!(request.messages.len(), 2);
    assert!(request.messages[1].content.contains(QUERY));
}

#[tokio::test]
async fn test_concurrent_evaluations() {
    let replies = (0..8)
        .map(|i| {
            let confidence = if i % 2 == 0 { 0.9 } else { 0.2 };
            Reply::Tool(iss_card(confidence, json!(["https://x.org"])))
        })
        .collect();
    let provider = ScriptedProvider::new(replies);
    let guardrail = Arc::new(guardrail(provider.clone()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let guardrail = Arc::clone(&guardrail);
            tokio::spawn(async move { guardrail.evaluate(&format!("query {}", i)).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_accepted() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 8);
    assert_eq!(provider.calls(), 8);
}
