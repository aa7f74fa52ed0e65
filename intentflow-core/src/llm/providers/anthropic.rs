//! Anthropic (Claude) model provider implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{IntentFlowError, Result};
use crate::llm::{
    Message, MessageRole, ModelError, ModelErrorKind, ModelInfo, ModelProvider, ModelRequest,
    ModelResponse, TokenUsage,
};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Anthropic (Claude) model provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g., "claude-3-haiku-20240307")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create with a custom base URL.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Create from environment variables.
    ///
    /// Reads from:
    /// - `ANTHROPIC_API_KEY` - API key (required)
    /// - `ANTHROPIC_MODEL` - Model name (optional)
    /// - `ANTHROPIC_BASE_URL` - Custom base URL (optional)
    ///
    /// # Errors
    ///
    /// Returns an error if ANTHROPIC_API_KEY is not set.
    pub fn from_env(model: Option<impl Into<String>>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            IntentFlowError::Configuration(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;

        let model = model
            .map(|m| m.into())
            .or_else(|| std::env::var("ANTHROPIC_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::with_base_url(api_key, model, base_url))
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Anthropic API request format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

/// Anthropic API response format
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

/// Anthropic error response
#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Convert messages to Anthropic format, extracting system prompt
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_prompt = None;
    let mut anthropic_messages = Vec::new();

    for msg in messages {
        match msg.role {
            // Anthropic uses a separate system field
            MessageRole::System => system_prompt = Some(msg.content.clone()),
            MessageRole::User => anthropic_messages.push(AnthropicMessage {
                role: "user",
                content: msg.content.clone(),
            }),
            MessageRole::Assistant => anthropic_messages.push(AnthropicMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    (system_prompt, anthropic_messages)
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn invoke(&self, request: &ModelRequest) -> std::result::Result<ModelResponse, ModelError> {
        let (system, messages) = convert_messages(&request.messages);

        let anthropic_request = AnthropicRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            system,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            stop_sequences: if request.stop_sequences.is_empty() {
                None
            } else {
                Some(request.stop_sequences.clone())
            },
        };

        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(request.options.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ModelErrorKind::Timeout
                } else {
                    ModelErrorKind::Transient
                };
                ModelError::new(kind, format!("Failed to send request to Anthropic: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = match serde_json::from_str::<AnthropicError>(&text) {
                Ok(error) => format!(
                    "Anthropic API error ({}): {}",
                    error.error.error_type, error.error.message
                ),
                Err(_) => format!("Anthropic API error ({}): {}", status, text),
            };

            return Err(ModelError::from_status(status.as_u16(), message));
        }

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            ModelError::new(
                ModelErrorKind::InvalidResponse,
                format!("Failed to parse Anthropic response: {}", e),
            )
        })?;

        // Extract text from content blocks
        let content = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("");

        let usage = anthropic_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(ModelResponse { content, usage })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "anthropic".to_string(),
            model_name: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_provider_creation() {
        let provider = AnthropicProvider::new("test-key", "claude-3-haiku-20240307");
        assert_eq!(provider.model(), "claude-3-haiku-20240307");
        assert_eq!(provider.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_convert_messages_extracts_system() {
        let messages = vec![
            Message::system("You are a translator"),
            Message::user("Translate hello"),
            Message::assistant("Bonjour"),
        ];

        let (system, converted) = convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("You are a translator"));
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }
}
