//! Tool trait and metadata definitions
//!
//! Tools are named external capabilities invoked with structured arguments.
//! Each tool declares its metadata, parameter schema and execution logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::{ToolError, ValidationError};

/// Tool metadata for discovery and listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Tool name (unique identifier)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// What the tool returns
    pub returns: String,
}

impl ToolMetadata {
    /// Create new metadata with required fields
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            returns: "Tool-specific result".to_string(),
        }
    }

    /// Set return description
    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }
}

/// Core tool trait
///
/// The registry validates arguments and enforces the call deadline and the
/// output ceiling around `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get tool metadata
    fn metadata(&self) -> &ToolMetadata;

    /// Get tool name (convenience method)
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Get tool description (convenience method)
    fn description(&self) -> &str {
        &self.metadata().description
    }

    /// JSON Schema for the tool's parameters
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
        })
    }

    /// Validate input arguments before execution
    ///
    /// Default implementation performs no validation.
    fn validate(&self, _args: &Value) -> Result<(), Vec<ValidationError>> {
        Ok(())
    }

    /// Execute the tool with given arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Collect "field is required" errors for missing string arguments
pub fn require_strings(args: &Value, fields: &[&str]) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<ValidationError> = fields
        .iter()
        .filter(|field| {
            args.get(**field)
                .and_then(Value::as_str)
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
        })
        .map(|field| ValidationError::new(*field, "a non-empty string is required"))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_strings() {
        assert!(require_strings(&json!({"text": "hi"}), &["text"]).is_ok());

        let errors = require_strings(&json!({"text": " ", "n": 1}), &["text", "n"]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "text");
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ToolMetadata::new("translate_text", "Translates text")
            .with_returns("The translated text");
        assert_eq!(metadata.name, "translate_text");
        assert_eq!(metadata.returns, "The translated text");
    }
}
