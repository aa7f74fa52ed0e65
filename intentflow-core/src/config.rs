//! Configuration types for IntentFlow

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{IntentFlowError, Result};
use crate::llm::{InvocationOptions, RetryConfig};

/// Main configuration for IntentFlow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntentFlowConfig {
    /// Model provider configuration
    pub model: ModelConfig,

    /// Intent classifier configuration
    pub classifier: ClassifierConfig,

    /// Tool invocation limits
    pub tools: ToolsConfig,

    /// Knowledge retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Caller-level retry policy around the model provider
    pub retry: RetryConfig,

    /// Conversation memory configuration
    pub memory: MemoryConfig,
}

/// Model provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider type; `None` leaves the model unconfigured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ModelProviderKind>,

    /// Model identifier
    pub model: String,

    /// API key (if needed, prefer env vars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for custom endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default options for every executor model call
    pub options: InvocationOptions,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: "claude-3-haiku-20240307".to_string(),
            api_key: None,
            base_url: None,
            options: InvocationOptions::default(),
        }
    }
}

/// Model provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProviderKind {
    Anthropic,
    Ollama,
}

/// Intent classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Classifications below this confidence resolve to `Unclassified`
    pub min_confidence: f32,

    /// Options for the classification call
    pub options: InvocationOptions,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            options: InvocationOptions::default()
                .with_temperature(0.0)
                .with_max_tokens(50),
        }
    }
}

/// Tool invocation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Per-call deadline
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Serialized output size ceiling in bytes
    pub max_output_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Knowledge retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages fetched per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns kept per session
    pub max_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

impl IntentFlowConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (intentflow.toml)
    /// 3. File named by INTENTFLOW_CONFIG_PATH, if set
    /// 4. Environment variable overrides (`INTENTFLOW_MODEL__MODEL=...`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or a value is out of range.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(IntentFlowConfig::default()))
            .merge(Toml::file("intentflow.toml"));

        if let Ok(path) = std::env::var("INTENTFLOW_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: IntentFlowConfig = figment
            .merge(Env::prefixed("INTENTFLOW_").ignore(&["config_path"]).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(IntentFlowError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: IntentFlowConfig =
            Figment::from(Serialized::defaults(IntentFlowConfig::default()))
                .merge(Toml::file(path))
                .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        validate_options("model.options", &self.model.options)?;
        validate_options("classifier.options", &self.classifier.options)?;

        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return Err(IntentFlowError::Configuration(format!(
                "classifier.min_confidence must be within 0..=1, got {}",
                self.classifier.min_confidence
            )));
        }
        if self.tools.timeout.is_zero() {
            return Err(IntentFlowError::Configuration(
                "tools.timeout must be greater than zero".to_string(),
            ));
        }
        if self.tools.max_output_bytes == 0 {
            return Err(IntentFlowError::Configuration(
                "tools.max_output_bytes must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(IntentFlowError::Configuration(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(IntentFlowError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_options(section: &str, options: &InvocationOptions) -> Result<()> {
    if !(0.0..=1.0).contains(&options.temperature) {
        return Err(IntentFlowError::Configuration(format!(
            "{section}.temperature must be within 0..=1, got {}",
            options.temperature
        )));
    }
    if !(0.0..=1.0).contains(&options.top_p) {
        return Err(IntentFlowError::Configuration(format!(
            "{section}.top_p must be within 0..=1, got {}",
            options.top_p
        )));
    }
    if options.max_tokens == 0 {
        return Err(IntentFlowError::Configuration(format!(
            "{section}.max_tokens must be greater than zero"
        )));
    }
    if options.timeout.is_zero() {
        return Err(IntentFlowError::Configuration(format!(
            "{section}.timeout must be greater than zero"
        )));
    }
    Ok(())
}
