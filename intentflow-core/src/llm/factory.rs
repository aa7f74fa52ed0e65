//! Factory for creating model providers from configuration

use std::sync::Arc;

use crate::config::{IntentFlowConfig, ModelConfig, ModelProviderKind};
use crate::error::Result;
use crate::llm::{ModelProvider, RetryingProvider, StubModelProvider};

#[cfg(feature = "llm-ollama")]
use crate::llm::providers::ollama::OllamaProvider;

#[cfg(feature = "llm-anthropic")]
use crate::llm::providers::anthropic::AnthropicProvider;

/// Factory for creating model providers
pub struct ModelProviderFactory;

impl ModelProviderFactory {
    /// Create a model provider from configuration
    ///
    /// A missing `provider` yields [`StubModelProvider`], so every model call
    /// fails with `NotConfigured` instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be created (e.g., missing API key
    /// or the provider's feature is not compiled in).
    pub fn create(config: &ModelConfig) -> Result<Arc<dyn ModelProvider>> {
        let Some(kind) = config.provider else {
            return Ok(Arc::new(StubModelProvider));
        };

        match kind {
            #[cfg(feature = "llm-ollama")]
            ModelProviderKind::Ollama => {
                let model = (!config.model.is_empty()).then(|| config.model.clone());
                let provider = match &config.base_url {
                    Some(url) => OllamaProvider::new(
                        model.unwrap_or_else(|| "qwen3:14b".to_string()),
                        Some(url.clone()),
                    ),
                    None => OllamaProvider::from_env(model),
                };
                Ok(Arc::new(provider))
            }

            #[cfg(not(feature = "llm-ollama"))]
            ModelProviderKind::Ollama => Err(crate::error::IntentFlowError::Configuration(
                "Ollama provider requires 'llm-ollama' feature".to_string(),
            )),

            #[cfg(feature = "llm-anthropic")]
            ModelProviderKind::Anthropic => {
                let model = (!config.model.is_empty()).then(|| config.model.clone());
                let provider = match &config.api_key {
                    Some(api_key) => {
                        let model = model
                            .or_else(|| std::env::var("ANTHROPIC_MODEL").ok())
                            .unwrap_or_else(|| "claude-3-haiku-20240307".to_string());
                        match &config.base_url {
                            Some(base_url) => AnthropicProvider::with_base_url(
                                api_key.clone(),
                                model,
                                base_url.clone(),
                            ),
                            None => AnthropicProvider::new(api_key.clone(), model),
                        }
                    }
                    None => AnthropicProvider::from_env(model)?,
                };
                Ok(Arc::new(provider))
            }

            #[cfg(not(feature = "llm-anthropic"))]
            ModelProviderKind::Anthropic => Err(crate::error::IntentFlowError::Configuration(
                "Anthropic provider requires 'llm-anthropic' feature".to_string(),
            )),
        }
    }

    /// Create the provider and wrap it in the configured retry policy
    pub fn from_config(config: &IntentFlowConfig) -> Result<Arc<dyn ModelProvider>> {
        let provider = Self::create(&config.model)?;
        if config.retry.max_attempts > 1 {
            Ok(Arc::new(RetryingProvider::new(provider, config.retry.clone())))
        } else {
            Ok(provider)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_provider_is_stub() {
        let provider = ModelProviderFactory::create(&ModelConfig::default()).unwrap();
        assert_eq!(provider.model_info().provider, "stub");
    }

    #[test]
    fn test_retry_wrapper_keeps_model_info() {
        let mut config = IntentFlowConfig::default();
        config.retry.max_attempts = 3;
        let provider = ModelProviderFactory::from_config(&config).unwrap();
        assert_eq!(provider.model_info().provider, "stub");
    }

    #[cfg(not(feature = "llm-ollama"))]
    #[test]
    fn test_missing_feature_is_configuration_error() {
        let config = ModelConfig {
            provider: Some(ModelProviderKind::Ollama),
            ..Default::default()
        };
        assert!(ModelProviderFactory::create(&config).is_err());
    }
}
