//! The guarded generation pipeline.
//!
//! # Execution Flow
//! 1. Compose system + task instruction (deterministic)
//! 2. Invoke the backend once with the schema's tool descriptor
//! 3. Extract the structured payload from the envelope
//! 4. Validate it against the schema
//! 5. Apply the trust policy
//! 6. Normalize everything, failures included, into one [`Outcome`]
//!
//! [`Guardrail::evaluate`] never returns an error and never panics past its
//! boundary: every failure becomes a rejected outcome carrying a safe
//! default.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use factguard_core::{
    book_card, fact_card, Outcome, OutcomeNormalizer, ReasonCode, ReasonCoded, SchemaModel,
    SchemaViolation, Transcript, TrustAssessment, TrustEngine, Validator,
};
use futures::FutureExt;
use thiserror::Error;
use tracing::debug;

use crate::config::{GenerationMode, OutputShape, RuntimeConfig};
use crate::extraction::{ExtractionError, StructuredParser};
use crate::invoker::GenerationInvoker;
use crate::prompts::PromptComposer;
use crate::providers::{ChatMessage, LlmProvider, ProviderError, ResponseEnvelope, ToolSpec};

/// Why a pipeline run did not produce a validated record.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transport failure: {0}")]
    Transport(#[from] ProviderError),

    #[error("Malformed payload: {0}")]
    Malformed(#[from] ExtractionError),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error("Processing panicked: {0}")]
    Panicked(String),
}

impl ReasonCoded for PipelineError {
    fn reason_code(&self) -> ReasonCode {
        match self {
            PipelineError::Transport(e) => e.reason_code(),
            PipelineError::Malformed(e) => e.reason_code(),
            PipelineError::Schema(e) => e.reason_code(),
            PipelineError::Panicked(_) => ReasonCode::UnknownApiError,
        }
    }
}

/// What one run produced: the raw payload if the backend answered, and the
/// processing result.
struct Run {
    payload: Option<String>,
    result: Result<TrustAssessment, PipelineError>,
}

/// Schema-constrained generation with a trust policy.
///
/// Holds no mutable state; share it across tasks behind an `Arc`.
pub struct Guardrail {
    schema: SchemaModel,
    tool: ToolSpec,
    mode: GenerationMode,
    temperature: f32,
    invoker: GenerationInvoker,
    parser: StructuredParser,
    trust: TrustEngine,
}

impl std::fmt::Debug for Guardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guardrail")
            .field("schema", &self.schema.name())
            .field("mode", &self.mode)
            .field("temperature", &self.temperature)
            .field("invoker", &self.invoker)
            .finish()
    }
}

impl Guardrail {
    pub fn builder() -> GuardrailBuilder {
        GuardrailBuilder::new()
    }

    /// Factual `fact_card` guardrail.
    pub fn fact_card(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::assemble(fact_card(), GenerationMode::Factual, provider, config)
    }

    /// Creative `book_card` guardrail.
    pub fn book_card(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::assemble(book_card(), GenerationMode::Creative, provider, config)
    }

    fn assemble(
        schema: SchemaModel,
        mode: GenerationMode,
        provider: Arc<dyn LlmProvider>,
        config: &RuntimeConfig,
    ) -> Self {
        let parser = match config.output {
            OutputShape::ToolCall => StructuredParser::new(schema.name()),
            OutputShape::JsonBody => StructuredParser::new(schema.name()).allow_message_body(),
        };

        Self {
            tool: ToolSpec::from_schema(&schema),
            temperature: config.temperature(mode),
            invoker: GenerationInvoker::new(provider, config),
            parser,
            trust: TrustEngine::new(config.trust.clone()),
            schema,
            mode,
        }
    }

    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    /// Run the pipeline once for `query`.
    pub async fn evaluate(&self, query: &str) -> Outcome {
        debug!(schema = self.schema.name(), query = %query, "Evaluating query");
        let run = self.run(self.compose(&Transcript::new(), query)).await;
        self.finish(query, run.result)
    }

    /// Run the pipeline with `transcript` as prior context and record the
    /// exchange in it.
    ///
    /// The query is appended as a user turn. If the backend answered, its raw
    /// payload is appended as an assistant turn, whatever the outcome. If it
    /// did not, the user turn is rolled back.
    pub async fn evaluate_in(&self, transcript: &mut Transcript, query: &str) -> Outcome {
        debug!(
            schema = self.schema.name(),
            query = %query,
            history = transcript.len(),
            "Evaluating query in transcript"
        );

        let messages = self.compose(transcript, query);
        transcript.push_user(query);

        let run = self.run(messages).await;
        match run.payload {
            Some(payload) => transcript.push_assistant(payload),
            None => {
                transcript.rollback_last_user();
                debug!(schema = self.schema.name(), "Rolled back unanswered user turn");
            }
        }

        self.finish(query, run.result)
    }

    fn compose(&self, transcript: &Transcript, query: &str) -> Vec<ChatMessage> {
        PromptComposer::new(&self.schema, self.trust.policy(), self.mode)
            .compose(transcript.turns(), query)
    }

    async fn run(&self, messages: Vec<ChatMessage>) -> Run {
        let request = self
            .invoker
            .request(messages, Some(&self.tool), self.temperature);

        let envelope = match AssertUnwindSafe(self.invoker.invoke(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                return Run {
                    payload: None,
                    result: Err(e.into()),
                }
            }
            Err(panic) => {
                return Run {
                    payload: None,
                    result: Err(PipelineError::Panicked(panic_message(panic))),
                }
            }
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.process(&envelope)))
            .unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(panic))));

        Run {
            payload: Some(envelope.payload_text().to_string()),
            result,
        }
    }

    fn process(&self, envelope: &ResponseEnvelope) -> Result<TrustAssessment, PipelineError> {
        let candidate = self.parser.extract(envelope)?;
        let record = Validator::new(&self.schema).validate(&candidate)?;
        Ok(self.trust.assess(record))
    }

    fn finish(&self, query: &str, result: Result<TrustAssessment, PipelineError>) -> Outcome {
        let outcome = OutcomeNormalizer::new(&self.schema).normalize(query, result);
        debug!(
            schema = self.schema.name(),
            accepted = outcome.is_accepted(),
            reason = ?outcome.reason(),
            "Pipeline finished"
        );
        outcome
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Guardrail`] with a custom schema.
pub struct GuardrailBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
    schema: Option<SchemaModel>,
    mode: GenerationMode,
}

impl GuardrailBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            config: RuntimeConfig::default(),
            schema: None,
            mode: GenerationMode::Factual,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(mut self, schema: SchemaModel) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Guardrail, ProviderError> {
        let provider = self
            .provider
            .ok_or_else(|| ProviderError::NotConfigured("No provider set".to_string()))?;
        let schema = self
            .schema
            .ok_or_else(|| ProviderError::NotConfigured("No schema set".to_string()))?;

        Ok(Guardrail::assemble(schema, self.mode, provider, &self.config))
    }
}

impl Default for GuardrailBuilder {
    fn default() -> Self {
        Self::new()
    }
}
