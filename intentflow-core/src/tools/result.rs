//! Tool error model
//!
//! A unified error taxonomy with a retryable vs fatal distinction, so a retry
//! layer wrapped around the workflow can decide what to do with a failed call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::llm::{ModelError, ModelErrorKind};

/// Structured tool error with taxonomy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    /// Error kind (determines retryability)
    pub kind: ToolErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Underlying error code (if applicable)
    pub code: Option<String>,

    /// Additional context
    pub context: Option<Value>,
}

impl ToolError {
    /// Create a new tool error
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: None,
        }
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Create a validation error
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self {
            kind: ToolErrorKind::Validation,
            message: format!(
                "Validation failed: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
            code: Some("VALIDATION_FAILED".to_string()),
            context: Some(serde_json::to_value(&errors).unwrap_or_default()),
        }
    }

    /// Create an unknown tool error
    pub fn not_found(name: &str) -> Self {
        Self::new(ToolErrorKind::NotFound, format!("Tool '{}' is not registered", name))
            .with_code("TOOL_NOT_FOUND")
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            ToolErrorKind::Timeout,
            format!("Tool execution timed out after {:?}", duration),
        )
        .with_code("TIMEOUT")
    }

    /// Create a malformed output error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidResponse, message).with_code("INVALID_RESPONSE")
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message).with_code("INTERNAL_ERROR")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<ModelError> for ToolError {
    fn from(err: ModelError) -> Self {
        let kind = match err.kind {
            ModelErrorKind::Timeout => ToolErrorKind::Timeout,
            ModelErrorKind::RateLimited => ToolErrorKind::RateLimited,
            ModelErrorKind::Transient => ToolErrorKind::Transient,
            ModelErrorKind::InvalidResponse => ToolErrorKind::InvalidResponse,
            ModelErrorKind::Authentication
            | ModelErrorKind::InvalidRequest
            | ModelErrorKind::NotConfigured => ToolErrorKind::Internal,
        };
        Self::new(kind, err.message)
    }
}

/// Error kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Input validation failed (not retryable - fix args)
    Validation,

    /// No tool registered under the requested name (not retryable)
    NotFound,

    /// Execution timed out (retryable)
    Timeout,

    /// Rate limit exceeded (retryable after delay)
    RateLimited,

    /// Transient network/service error (retryable)
    Transient,

    /// Malformed or oversized output (may be retryable)
    InvalidResponse,

    /// Internal tool error (not retryable - bug)
    Internal,
}

impl ToolErrorKind {
    /// Check if this error kind is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolErrorKind::Timeout
                | ToolErrorKind::RateLimited
                | ToolErrorKind::Transient
                | ToolErrorKind::InvalidResponse
        )
    }
}

/// Validation error for a specific field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path (e.g., "args.text")
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ToolErrorKind::Timeout.is_retryable());
        assert!(ToolErrorKind::RateLimited.is_retryable());
        assert!(!ToolErrorKind::NotFound.is_retryable());
        assert!(!ToolErrorKind::Validation.is_retryable());
    }

    #[test]
    fn test_validation_error_message() {
        let err = ToolError::validation(vec![
            ValidationError::new("text", "is required"),
            ValidationError::new("target_language", "is required"),
        ]);
        assert_eq!(err.kind, ToolErrorKind::Validation);
        assert!(err.message.contains("text: is required"));
        assert!(err.message.contains("target_language: is required"));
    }

    #[test]
    fn test_from_model_error() {
        let err: ToolError = ModelError::new(ModelErrorKind::RateLimited, "slow down").into();
        assert_eq!(err.kind, ToolErrorKind::RateLimited);

        let err: ToolError = ModelError::new(ModelErrorKind::Authentication, "bad key").into();
        assert_eq!(err.kind, ToolErrorKind::Internal);
    }
}
