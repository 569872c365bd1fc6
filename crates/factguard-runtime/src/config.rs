//! Runtime configuration from YAML/JSON.
//!
//! ```yaml
//! provider: anthropic
//! model: claude-haiku-4-5
//! timeout: 45s
//! temperatures:
//!   creative: 0.6
//! trust:
//!   approved_prefixes: ["https://"]
//! provider_options:
//!   prompt_caching: true
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use factguard_core::TrustPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::providers::{LlmProvider, ProviderError, ProviderRegistry};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which task template and temperature a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// A verifiable record about the query
    Factual,
    /// A fictitious record on a theme
    Creative,
}

/// How the backend is asked to shape its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Forced function/tool call carrying the schema
    #[default]
    ToolCall,
    /// JSON-object message body, no tool
    JsonBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperatures {
    pub factual: f32,
    pub creative: f32,
    pub chat: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            factual: 0.0,
            creative: 0.5,
            chat: 0.7,
        }
    }
}

/// Settings shared by every call a runtime makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Registered provider type, e.g. "openai"
    pub provider: String,

    pub model: String,

    pub max_tokens: u32,

    /// Per-request timeout, humantime syntax ("30s", "1m 30s")
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    pub temperatures: Temperatures,

    pub output: OutputShape,

    pub trust: TrustPolicy,

    /// Passed to the provider factory as-is
    pub provider_options: JsonValue,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
            temperatures: Temperatures::default(),
            output: OutputShape::default(),
            trust: TrustPolicy::default(),
            provider_options: JsonValue::Object(Default::default()),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// YAML is a superset of JSON, so this reads either.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.is_empty() {
            return Err(ConfigError::Invalid("provider must not be empty".into()));
        }
        if self.model.is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }

        let temps = &self.temperatures;
        for (name, value) in [
            ("factual", temps.factual),
            ("creative", temps.creative),
            ("chat", temps.chat),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "temperatures.{} must be within [0, 2], got {}",
                    name, value
                )));
            }
        }

        let trust = &self.trust;
        if !(0.0..=1.0).contains(&trust.acceptance_threshold) {
            return Err(ConfigError::Invalid(
                "trust.acceptance_threshold must be within [0, 1]".into(),
            ));
        }
        if trust.approved_prefixes.is_empty() {
            return Err(ConfigError::Invalid(
                "trust.approved_prefixes must not be empty".into(),
            ));
        }

        if !self.provider_options.is_object() {
            return Err(ConfigError::Invalid(
                "provider_options must be a mapping".into(),
            ));
        }

        Ok(())
    }

    pub fn temperature(&self, mode: GenerationMode) -> f32 {
        match mode {
            GenerationMode::Factual => self.temperatures.factual,
            GenerationMode::Creative => self.temperatures.creative,
        }
    }

    /// Switch to another backend type. The model follows the backend's
    /// default unless `model` names one.
    pub fn select_provider(
        &mut self,
        provider: impl Into<String>,
        model: Option<String>,
        registry: &ProviderRegistry,
    ) {
        self.provider = provider.into();
        match model {
            Some(model) => self.model = model,
            None => {
                if let Some(default) = registry.default_model(&self.provider) {
                    self.model = default.to_string();
                }
            }
        }
    }

    /// Instantiate the configured backend from `registry`.
    ///
    /// Temperatures are checked against the range the backend accepts.
    pub fn build_provider(
        &self,
        registry: &ProviderRegistry,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        registry.validate(&self.provider, &self.provider_options)?;

        let temps = &self.temperatures;
        for (name, value) in [
            ("factual", temps.factual),
            ("creative", temps.creative),
            ("chat", temps.chat),
        ] {
            registry.check_temperature(&self.provider, name, value)?;
        }

        registry.create(&self.provider, &self.provider_options)
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
