//! Model provider implementations

#[cfg(feature = "llm-ollama")]
pub mod ollama;

#[cfg(feature = "llm-ollama")]
pub use ollama::OllamaProvider;

#[cfg(feature = "llm-anthropic")]
pub mod anthropic;

#[cfg(feature = "llm-anthropic")]
pub use anthropic::AnthropicProvider;
