//! Model inference interface
//!
//! The workflow engine never talks to a hosted model directly. Everything goes
//! through [`ModelProvider`], which takes a [`ModelRequest`] (messages, model
//! identifier, [`InvocationOptions`]) and returns the completion text or a
//! [`ModelError`] whose [`ModelErrorKind`] tells a retry layer whether trying
//! again can help.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;

/// Well-known hosted model identifiers.
pub struct ModelIds;

impl ModelIds {
    pub const CLAUDE_3_SONNET: &'static str = "anthropic.claude-3-sonnet-20240229-v1:0";
    pub const CLAUDE_3_HAIKU: &'static str = "anthropic.claude-3-haiku-20240307-v1:0";
    pub const CLAUDE_3_5_SONNET: &'static str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
    pub const TITAN_TEXT_EXPRESS: &'static str = "amazon.titan-text-express-v1";
    pub const TITAN_EMBED_TEXT_V2: &'static str = "amazon.titan-embed-text-v2:0";
}

/// Sampling and deadline options for a single model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationOptions {
    /// Sampling randomness (0.0-1.0)
    pub temperature: f32,

    /// Output length ceiling
    pub max_tokens: usize,

    /// Nucleus sampling threshold (0.0-1.0)
    pub top_p: f32,

    /// Maximum wait for the completion
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 256,
            top_p: 0.9,
            timeout: Duration::from_secs(120),
        }
    }
}

impl InvocationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p.clamp(0.0, 1.0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request to a model provider
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model identifier; `None` uses the provider's configured model
    pub model: Option<String>,

    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// Sampling and deadline options
    pub options: InvocationOptions,

    /// Stop sequences
    pub stop_sequences: Vec<String>,
}

impl ModelRequest {
    /// Create a simple request from a single prompt
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            messages: vec![Message::user(prompt)],
            options: InvocationOptions::default(),
            stop_sequences: Vec::new(),
        }
    }

    /// Create a request with system prompt
    pub fn with_system_prompt(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: None,
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            options: InvocationOptions::default(),
            stop_sequences: Vec::new(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    /// The system prompt, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

/// Response from a model provider
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Generated content
    pub content: String,

    /// Token usage information
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Failure categories for model invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// The call exceeded its deadline (retryable)
    Timeout,
    /// The service throttled the call (retryable)
    RateLimited,
    /// Network or 5xx failure (retryable)
    Transient,
    /// The service answered with something unusable (retryable)
    InvalidResponse,
    /// Credentials rejected
    Authentication,
    /// The request itself was rejected
    InvalidRequest,
    /// No provider is configured
    NotConfigured,
}

impl ModelErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelErrorKind::Timeout
                | ModelErrorKind::RateLimited
                | ModelErrorKind::Transient
                | ModelErrorKind::InvalidResponse
        )
    }
}

/// Error raised by a model provider
#[derive(Debug, Clone, Error)]
#[error("model invocation failed ({kind:?}): {message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ModelErrorKind::Timeout,
            format!("no completion within {:?}", after),
        )
    }

    /// Map an HTTP status code from a hosted model API to an error kind
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => ModelErrorKind::RateLimited,
            401 | 403 => ModelErrorKind::Authentication,
            408 => ModelErrorKind::Timeout,
            500..=599 => ModelErrorKind::Transient,
            _ => ModelErrorKind::InvalidRequest,
        };
        Self::new(kind, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Trait for model provider implementations.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Submit a request and wait for the completion.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Get model information
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "unknown".to_string(),
            model_name: "unknown".to_string(),
        }
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
}

/// Invoke `provider` and bound the wait by `request.options.timeout`.
///
/// An elapsed deadline becomes [`ModelErrorKind::Timeout`].
pub async fn invoke_with_deadline(
    provider: &dyn ModelProvider,
    request: &ModelRequest,
) -> Result<ModelResponse, ModelError> {
    let deadline = request.options.timeout;
    match tokio::time::timeout(deadline, provider.invoke(request)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::timeout(deadline)),
    }
}

/// Pull a JSON document out of a completion.
///
/// Models often wrap JSON in markdown fences or add a sentence before it, so
/// this tries the whole reply first, then a fenced block, then the outermost
/// braces.
pub fn extract_json<T: DeserializeOwned>(content: &str) -> Result<T, ModelError> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Ok(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return serde_json::from_str(&trimmed[start..=end]).map_err(|e| {
                ModelError::new(
                    ModelErrorKind::InvalidResponse,
                    format!("completion is not valid JSON: {}", e),
                )
            });
        }
    }

    Err(ModelError::new(
        ModelErrorKind::InvalidResponse,
        "completion does not contain a JSON document",
    ))
}

/// Provider used when nothing is configured; every call fails.
pub struct StubModelProvider;

#[async_trait]
impl ModelProvider for StubModelProvider {
    async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::new(
            ModelErrorKind::NotConfigured,
            "model provider not configured. Implement the ModelProvider trait for your model",
        ))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "stub".to_string(),
            model_name: "none".to_string(),
        }
    }
}

pub mod factory;
pub mod providers;
pub mod retry;

pub use factory::ModelProviderFactory;
pub use retry::{with_retry, RetryConfig, RetryState, RetryingProvider};
