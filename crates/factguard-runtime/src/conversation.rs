//! Free-form chat over a caller-owned transcript.

use std::sync::Arc;

use factguard_core::Transcript;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::invoker::GenerationInvoker;
use crate::providers::{ChatMessage, LlmProvider, ProviderError};

/// Multi-turn chat without a schema.
///
/// The transcript is the only state; one session can serve any number of
/// transcripts.
#[derive(Debug, Clone)]
pub struct ChatSession {
    invoker: GenerationInvoker,
    temperature: f32,
}

impl ChatSession {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self {
            invoker: GenerationInvoker::new(provider, config),
            temperature: config.temperatures.chat,
        }
    }

    /// Send `input` with the full transcript as context.
    ///
    /// On success the user and assistant turns are both recorded and the
    /// reply is returned. On failure the user turn is rolled back, leaving
    /// the transcript exactly as it was.
    pub async fn send(
        &self,
        transcript: &mut Transcript,
        input: &str,
    ) -> Result<String, ProviderError> {
        transcript.push_user(input);

        let messages: Vec<ChatMessage> = transcript.turns().iter().map(ChatMessage::from).collect();
        let request = self.invoker.request(messages, None, self.temperature);

        match self.invoker.invoke(request).await {
            Ok(envelope) => {
                let reply = envelope.payload_text().to_string();
                transcript.push_assistant(reply.clone());
                debug!(turns = transcript.len(), "Chat turn recorded");
                Ok(reply)
            }
            Err(e) => {
                transcript.rollback_last_user();
                warn!(error = %e, "Chat call failed; user turn rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{GenerationRequest, GenerationResponse, ResponseEnvelope, TokenUsage};
    use async_trait::async_trait;
    use factguard_core::Role;
    use std::sync::Mutex;

    /// Replies with the number of messages it saw, or fails when told to.
    struct CountingProvider {
        fail: bool,
        temperatures: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, ProviderError> {
            self.temperatures.lock().unwrap().push(request.temperature);
            if self.fail {
                return Err(ProviderError::HttpError("connection reset".to_string()));
            }
            Ok(GenerationResponse {
                envelope: ResponseEnvelope::Message(format!("saw {}", request.messages.len())),
                usage: TokenUsage::default(),
                model: request.model,
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn provider(fail: bool) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            fail,
            temperatures: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_context_accumulates() {
        let backend = provider(false);
        let session = ChatSession::new(backend.clone(), &RuntimeConfig::default());
        let mut transcript =
            Transcript::with_system("You're a helpful AI assistant and a Python expert.");

        let first = session
            .send(&mut transcript, "What are three best practices for FastAPI?")
            .await
            .unwrap();
        assert_eq!(first, "saw 2");

        let second = session
            .send(&mut transcript, "Why is the first one important?")
            .await
            .unwrap();
        assert_eq!(second, "saw 4");

        assert_eq!(transcript.len(), 5);
        assert_eq!(*backend.temperatures.lock().unwrap(), vec![0.7, 0.7]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_user_turn() {
        let session = ChatSession::new(provider(true), &RuntimeConfig::default());
        let mut transcript = Transcript::with_system("sys");
        transcript.push_user("earlier");
        transcript.push_assistant("reply");
        let before = transcript.clone();

        let err = session.send(&mut transcript, "hello?").await.unwrap_err();
        assert!(matches!(err, ProviderError::HttpError(_)));
        assert_eq!(transcript, before);
        assert_eq!(transcript.last().unwrap().role, Role::Assistant);
    }
}
