//! Generation backend abstractions for factguard-runtime.
//!
//! This module defines the trait for generation backends and includes
//! implementations for OpenAI and Anthropic behind cargo features.
//!
//! A provider performs exactly one HTTP call per request and returns the
//! response envelope as-is. It never interprets the payload.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use factguard_core::{ReasonCode, ReasonCoded, Role, SchemaModel, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Errors from generation backends. All of them are transport errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Response envelope parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ReasonCoded for ProviderError {
    fn reason_code(&self) -> ReasonCode {
        ReasonCode::UnknownApiError
    }
}

/// A chat message sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System.as_str().to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User.as_str().to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant.as_str().to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

/// Function/tool descriptor for constrained decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,

    /// JSON Schema for the tool arguments
    pub parameters: JsonValue,
}

impl ToolSpec {
    /// Derive a tool descriptor from a schema model.
    pub fn from_schema(schema: &SchemaModel) -> Self {
        Self {
            name: schema.name().to_string(),
            description: schema.description().to_string(),
            parameters: schema.json_schema(),
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model to use
    pub model: String,

    /// Ordered messages
    pub messages: Vec<ChatMessage>,

    /// Tool descriptor for structured output, if any
    pub tool: Option<ToolSpec>,

    /// Force the backend to call `tool`
    pub force_tool: bool,

    /// Ask for a JSON-object body (used when no tool is forced)
    pub json_body: bool,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Request timeout, enforced by the provider
    pub timeout: Duration,
}

/// A structured call found in a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,

    /// Serialized JSON arguments, undecoded
    pub arguments: String,
}

/// The backend's answer, in one of the shapes backends use for
/// structured output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// The payload sits inside a function/tool call
    ToolCall(ToolCall),

    /// The payload is the message body
    Message(String),
}

impl ResponseEnvelope {
    /// Raw payload text, whichever shape carries it.
    pub fn payload_text(&self) -> &str {
        match self {
            ResponseEnvelope::ToolCall(call) => &call.arguments,
            ResponseEnvelope::Message(content) => content,
        }
    }
}

/// Response from one generation call.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub envelope: ResponseEnvelope,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping generation backends.
///
/// This is the ONLY place where network calls are made.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute one generation request.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}
