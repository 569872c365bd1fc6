//! Single-shot generation calls.
//!
//! One [`GenerationInvoker::invoke`] is one backend request. There is no
//! retry, no fallback, and no inspection of the payload.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{OutputShape, RuntimeConfig};
use crate::providers::{
    ChatMessage, GenerationRequest, LlmProvider, ProviderError, ResponseEnvelope, ToolSpec,
};

#[derive(Clone)]
pub struct GenerationInvoker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    output: OutputShape,
}

impl std::fmt::Debug for GenerationInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationInvoker")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("output", &self.output)
            .finish()
    }
}

impl GenerationInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            output: config.output,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn output(&self) -> OutputShape {
        self.output
    }

    /// Build the request for `messages`.
    ///
    /// With a tool and [`OutputShape::ToolCall`] the tool is attached and
    /// forced. With [`OutputShape::JsonBody`] the tool is left off and a
    /// JSON-object body is requested instead. Without a tool the request
    /// is free-form.
    pub fn request(
        &self,
        messages: Vec<ChatMessage>,
        tool: Option<&ToolSpec>,
        temperature: f32,
    ) -> GenerationRequest {
        let (tool, force_tool, json_body) = match (tool, self.output) {
            (Some(tool), OutputShape::ToolCall) => (Some(tool.clone()), true, false),
            (Some(_), OutputShape::JsonBody) => (None, false, true),
            (None, _) => (None, false, false),
        };

        GenerationRequest {
            model: self.model.clone(),
            messages,
            tool,
            force_tool,
            json_body,
            temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
        }
    }

    pub async fn invoke(
        &self,
        request: GenerationRequest,
    ) -> Result<ResponseEnvelope, ProviderError> {
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            temperature = request.temperature,
            forced_tool = request.force_tool,
            "Invoking backend"
        );

        let response = self.provider.generate(request).await?;

        debug!(
            provider = self.provider.name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            stop_reason = ?response.stop_reason,
            "Backend responded"
        );

        Ok(response.envelope)
    }
}
