//! Error types for IntentFlow operations

/// Result type for IntentFlow operations
pub type Result<T> = std::result::Result<T, IntentFlowError>;

/// Crate-level errors raised outside of request handling
/// (configuration, provider construction, I/O).
///
/// Request handling errors live in [`crate::workflow::WorkflowError`].
#[derive(Debug, thiserror::Error)]
pub enum IntentFlowError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model provider error
    #[error(transparent)]
    Model(#[from] crate::llm::ModelError),

    /// Tool error
    #[error(transparent)]
    Tool(#[from] crate::tools::ToolError),

    /// Workflow error
    #[error(transparent)]
    Workflow(#[from] crate::workflow::WorkflowError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for IntentFlowError {
    fn from(s: String) -> Self {
        IntentFlowError::Other(s)
    }
}

impl From<&str> for IntentFlowError {
    fn from(s: &str) -> Self {
        IntentFlowError::Other(s.to_string())
    }
}

impl From<crate::tools::RegistryError> for IntentFlowError {
    fn from(err: crate::tools::RegistryError) -> Self {
        IntentFlowError::Configuration(err.to_string())
    }
}

impl From<figment::Error> for IntentFlowError {
    fn from(err: figment::Error) -> Self {
        IntentFlowError::Configuration(format!("Failed to load configuration: {}", err))
    }
}
