//! # factguard-runtime
//!
//! Schema-constrained LLM generation for factguard.
//!
//! This crate owns every network call. It composes the prompt, invokes the
//! backend once, extracts the structured payload, and hands the result to
//! the deterministic checks in `factguard-core`.
//!
//! ## Important
//!
//! Callers never see an error from [`Guardrail::evaluate`]. Transport
//! failures, malformed payloads, schema violations, and panics all become a
//! rejected [`Outcome`](factguard_core::Outcome) carrying a safe default.
//!
//! ## Example
//!
//! ```rust,ignore
//! use factguard_runtime::{Guardrail, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("factguard.yaml")?;
//! let provider = config.build_provider(&ProviderRegistry::with_defaults())?;
//! let guardrail = Guardrail::fact_card(provider, &config);
//!
//! let outcome = guardrail
//!     .evaluate("In what year was the International Space Station (ISS) launched?")
//!     .await;
//! println!("{}", outcome.to_payload());
//! ```

pub mod config;
pub mod conversation;
pub mod extraction;
pub mod invoker;
pub mod pipeline;
pub mod prompts;
pub mod providers;

pub use config::{ConfigError, GenerationMode, OutputShape, RuntimeConfig, Temperatures};
pub use conversation::ChatSession;
pub use extraction::{ExtractionError, StructuredParser};
pub use invoker::GenerationInvoker;
pub use pipeline::{Guardrail, GuardrailBuilder, PipelineError};
pub use prompts::PromptComposer;
pub use providers::{
    ApiCredential, ChatMessage, CredentialSource, GenerationRequest, GenerationResponse,
    LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, ResponseEnvelope, TokenUsage,
    ToolCall, ToolSpec,
};

#[cfg(feature = "anthropic")]
pub use providers::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "openai")]
pub use providers::{OpenAiProvider, OpenAiProviderFactory};
