//! Anthropic Messages API provider.
//!
//! Structured output is requested through a single tool whose `input_schema`
//! is the record schema. The first `tool_use` block in the reply becomes the
//! envelope's tool call; without one, the concatenated text blocks become the
//! message body.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, GenerationRequest, GenerationResponse, LlmProvider, ProviderError,
    ResponseEnvelope, TokenUsage, ToolCall,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    prompt_caching: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("prompt_caching", &self.prompt_caching)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Anthropic API key",
        ))
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        Ok(Self::with_credential(credential))
    }

    /// Create from JSON configuration, falling back to `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        let mut provider = Self::with_credential(credential);
        if let Some(url) = config["base_url"].as_str() {
            provider.base_url = url.to_string();
        }
        if let Some(caching) = config["prompt_caching"].as_bool() {
            provider.prompt_caching = caching;
        }
        Ok(provider)
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt_caching: false,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }

    fn build_request(&self, request: GenerationRequest) -> AnthropicRequest {
        let mut system = None;
        let mut messages = Vec::with_capacity(request.messages.len());

        for msg in request.messages {
            if msg.role == "system" {
                system = Some(msg.content);
            } else {
                messages.push(to_api_message(msg));
            }
        }

        // One breakpoint on the newest turn caches the whole prefix; the API
        // rejects more than four.
        if self.prompt_caching {
            if let Some(ContentBlock::Text { cache_control, .. }) = messages
                .last_mut()
                .and_then(|message| message.content.last_mut())
            {
                *cache_control = Some(CacheControl {
                    type_: "ephemeral".to_string(),
                });
            }
        }

        let tool_choice = match &request.tool {
            Some(tool) if request.force_tool => Some(ToolChoice {
                type_: "tool".to_string(),
                name: tool.name.clone(),
            }),
            _ => None,
        };

        let tools = request
            .tool
            .map(|tool| {
                vec![AnthropicTool {
                    name: tool.name,
                    description: tool.description,
                    input_schema: tool.parameters,
                }]
            })
            .unwrap_or_default();

        AnthropicRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: request.temperature,
            tools,
            tool_choice,
        }
    }

}

fn to_api_message(msg: ChatMessage) -> AnthropicMessage {
    AnthropicMessage {
        role: msg.role,
        content: vec![ContentBlock::Text {
            text: msg.content,
            cache_control: None,
        }],
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: JsonValue,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    type_: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn into_envelope(blocks: Vec<ResponseBlock>) -> ResponseEnvelope {
    let mut text = String::new();
    for block in blocks {
        match block {
            ResponseBlock::ToolUse { name, input } => {
                return ResponseEnvelope::ToolCall(ToolCall {
                    name,
                    arguments: input.to_string(),
                });
            }
            ResponseBlock::Text { text: part } => text.push_str(&part),
            ResponseBlock::Other => {}
        }
    }
    ResponseEnvelope::Message(text)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let timeout = request.timeout;
        let body = self.build_request(request);

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == 401 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let error_body = response
                .json::<AnthropicError>()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: error_body.error.message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(GenerationResponse {
            envelope: into_envelope(body.content),
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for creating Anthropic providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "sk-ant-...",       // Optional, falls back to ANTHROPIC_API_KEY env
///   "base_url": "https://...",      // Optional, custom API endpoint
///   "prompt_caching": true          // Optional
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "prompt_caching": false })
    }

    fn default_model(&self) -> Option<&'static str> {
        Some(DEFAULT_MODEL)
    }

    fn temperature_range(&self) -> std::ops::RangeInclusive<f32> {
        0.0..=1.0
    }

    fn description(&self) -> &'static str {
        "Anthropic Messages API with forced tool use"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolSpec;
    use factguard_core::fact_card;

    fn request(force_tool: bool) -> GenerationRequest {
        GenerationRequest {
            model: "claude-test".to_string(),
            messages: vec![
                ChatMessage::system("be factual"),
                ChatMessage::user("When was the ISS launched?"),
            ],
            tool: Some(ToolSpec::from_schema(&fact_card())),
            force_tool,
            json_body: false,
            temperature: 0.0,
            max_tokens: 512,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_request_forces_tool() {
        let provider = AnthropicProvider::new("test-key");
        let body = serde_json::to_value(provider.build_request(request(true))).unwrap();

        assert_eq!(body["system"], "be factual");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["tools"][0]["name"], "fact_card");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "fact_card");
        // Zero temperature is sent explicitly
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_request_without_forced_tool_omits_choice() {
        let provider = AnthropicProvider::new("test-key");
        let body = serde_json::to_value(provider.build_request(request(false))).unwrap();
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("tools").is_some());
    }

    #[test]
    fn test_prompt_caching_marks_blocks() {
        let provider = AnthropicProvider::new("test-key").with_prompt_caching(true);
        let body = serde_json::to_value(provider.build_request(request(true))).unwrap();
        assert_eq!(
            body["messages"][0]["content"][0]["cache_control"]["type"],
            "ephemeral"
        );

        let body = serde_json::to_value(
            AnthropicProvider::new("test-key").build_request(request(true)),
        )
        .unwrap();
        assert!(body["messages"][0]["content"][0]
            .get("cache_control")
            .is_none());
    }

    #[test]
    fn test_prompt_caching_marks_only_latest_turn_of_long_transcript() {
        let provider = AnthropicProvider::new("test-key").with_prompt_caching(true);
        let mut messages = vec![ChatMessage::system("be helpful")];
        for i in 0..3 {
            messages.push(ChatMessage::user(format!("question {}", i)));
            messages.push(ChatMessage::assistant(format!("answer {}", i)));
        }
        messages.push(ChatMessage::user("last question"));

        let body = serde_json::to_value(provider.build_request(GenerationRequest {
            messages,
            ..request(false)
        }))
        .unwrap();

        let turns = body["messages"].as_array().unwrap();
        assert_eq!(turns.len(), 7);
        let marked: Vec<usize> = turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn["content"][0].get("cache_control").is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(marked, vec![6]);
    }

    #[test]
    fn test_tool_use_block_becomes_tool_call() {
        let blocks: Vec<ResponseBlock> = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "Here you go"},
            {"type": "tool_use", "id": "t1", "name": "fact_card", "input": {"claim": "x"}}
        ]))
        .unwrap();

        match into_envelope(blocks) {
            ResponseEnvelope::ToolCall(call) => {
                assert_eq!(call.name, "fact_card");
                assert_eq!(call.arguments, r#"{"claim":"x"}"#);
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let blocks: Vec<ResponseBlock> = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "{\"a\":"},
            {"type": "thinking", "thinking": "..."},
            {"type": "text", "text": "1}"}
        ]))
        .unwrap();
        assert_eq!(
            into_envelope(blocks),
            ResponseEnvelope::Message("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let factory = AnthropicProviderFactory;
        let provider = factory
            .create(&serde_json::json!({"api_key": "test-api-key"}))
            .unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let factory = AnthropicProviderFactory;
        let config = serde_json::json!({
            "api_key": "test-key",
            "base_url": "invalid-url"
        });
        assert!(factory.validate_config(&config).is_err());
    }

    #[test]
    fn test_from_config_reads_options() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1",
            "prompt_caching": true
        });

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert!(provider.prompt_caching);
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(AnthropicProvider::new("key").health_check().await);
        assert!(!AnthropicProvider::new("").health_check().await);
    }
}
