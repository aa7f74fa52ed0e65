//! Workflow execution types and error handling

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::llm::{ModelError, ModelErrorKind, TokenUsage};
use crate::retrieval::RetrievalError;
use crate::tools::{ToolError, ToolErrorKind};

use super::intent::Intent;

/// Error type for workflow operations
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// Malformed or empty request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The classifier's model dependency failed
    #[error("Classification unavailable: {message}")]
    ClassificationUnavailable { message: String, retryable: bool },

    /// A step failed mid-workflow
    #[error("Step '{step}' failed ({cause}): {message}")]
    StepExecution {
        step: String,
        cause: FailureCause,
        message: String,
    },

    /// A routable intent has no executor in the routing table
    #[error("No executor registered for intent '{0}'")]
    UnknownIntent(Intent),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorkflowError {
    /// Whether a caller-level retry policy may try the request again
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::ClassificationUnavailable { retryable, .. } => *retryable,
            WorkflowError::StepExecution { cause, .. } => cause.is_retryable(),
            WorkflowError::InvalidInput(_)
            | WorkflowError::UnknownIntent(_)
            | WorkflowError::InvalidConfig(_) => false,
        }
    }

    /// Stable snake_case code for responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::ClassificationUnavailable { .. } => "classification_unavailable",
            WorkflowError::StepExecution { .. } => "step_execution",
            WorkflowError::UnknownIntent(_) => "unknown_intent",
            WorkflowError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Name of the failing step, for step failures
    pub fn step(&self) -> Option<&str> {
        match self {
            WorkflowError::StepExecution { step, .. } => Some(step),
            _ => None,
        }
    }

    pub(crate) fn classification_unavailable(err: &ModelError) -> Self {
        WorkflowError::ClassificationUnavailable {
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Step failure; the driver renames it to the step that raised it
    pub fn step_failed(
        step: impl Into<String>,
        cause: FailureCause,
        message: impl Into<String>,
    ) -> Self {
        WorkflowError::StepExecution {
            step: step.into(),
            cause,
            message: message.into(),
        }
    }
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// What went wrong inside a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The model call failed
    Model(ModelErrorKind),
    /// The tool call failed or returned malformed output
    Tool(ToolErrorKind),
    /// The knowledge store failed or had nothing relevant
    Retrieval { retryable: bool },
    /// A context value the step needs is missing or has the wrong shape
    Context,
}

impl FailureCause {
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureCause::Model(kind) => kind.is_retryable(),
            FailureCause::Tool(kind) => kind.is_retryable(),
            FailureCause::Retrieval { retryable } => *retryable,
            FailureCause::Context => false,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Model(kind) => write!(f, "model {:?}", kind),
            FailureCause::Tool(kind) => write!(f, "tool {:?}", kind),
            FailureCause::Retrieval { .. } => write!(f, "retrieval"),
            FailureCause::Context => write!(f, "context"),
        }
    }
}

impl From<&ModelError> for FailureCause {
    fn from(err: &ModelError) -> Self {
        FailureCause::Model(err.kind)
    }
}

impl From<&ToolError> for FailureCause {
    fn from(err: &ToolError) -> Self {
        FailureCause::Tool(err.kind)
    }
}

impl From<&RetrievalError> for FailureCause {
    fn from(err: &RetrievalError) -> Self {
        FailureCause::Retrieval {
            retryable: err.is_retryable(),
        }
    }
}

/// Trace of a single step execution
///
/// Holds timing and outcome only, never context values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    /// Step name
    pub step_name: String,

    /// Step kind label (prompt, model, tool, retrieve, transform)
    pub kind: String,

    /// Duration of step execution
    pub duration_ms: u64,

    /// Whether the step succeeded
    pub success: bool,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Token usage if the step called a model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,

    /// The step's guard did not hold
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl StepTrace {
    /// Create a successful step trace
    pub fn success(step_name: impl Into<String>, kind: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            kind: kind.into(),
            duration_ms,
            success: true,
            error: None,
            token_usage: None,
            skipped: false,
        }
    }

    /// Create a failed step trace
    pub fn failure(
        step_name: impl Into<String>,
        kind: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            kind: kind.into(),
            duration_ms,
            success: false,
            error: Some(error.into()),
            token_usage: None,
            skipped: false,
        }
    }

    /// Trace for a step whose guard did not hold
    pub fn skipped(step_name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::success(step_name, kind, 0)
        }
    }

    /// Add token usage to the trace
    pub fn with_token_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }
}

/// Complete execution trace for one executor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Executor name
    pub workflow_name: String,

    /// Step traces in execution order
    pub steps: Vec<StepTrace>,

    /// Total duration
    pub total_duration_ms: u64,

    /// Whether every step completed
    pub success: bool,

    /// Final error if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionTrace {
    /// Create a new execution trace
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            steps: Vec::new(),
            total_duration_ms: 0,
            success: true,
            error: None,
        }
    }

    /// Add a step trace
    pub fn add_step(&mut self, step: StepTrace) {
        self.total_duration_ms += step.duration_ms;
        if !step.success {
            self.success = false;
            self.error = step.error.clone();
        }
        self.steps.push(step);
    }

    /// Get total token usage across all steps
    pub fn total_token_usage(&self) -> Option<TokenUsage> {
        self.steps
            .iter()
            .filter_map(|s| s.token_usage)
            .reduce(|a, b| TokenUsage {
                prompt_tokens: a.prompt_tokens + b.prompt_tokens,
                completion_tokens: a.completion_tokens + b.completion_tokens,
                total_tokens: a.total_tokens + b.total_tokens,
            })
    }

    /// Get the number of recorded steps
    pub fn completed_steps(&self) -> usize {
        self.steps.len()
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_trace() {
        let mut trace = ExecutionTrace::new("text_translation");
        trace.add_step(StepTrace::success("build_prompt", "prompt", 1));
        trace.add_step(
            StepTrace::success("extract_request", "model", 150).with_token_usage(Some(
                TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                },
            )),
        );

        assert!(trace.success);
        assert_eq!(trace.completed_steps(), 2);
        assert_eq!(trace.total_duration_ms, 151);
        assert_eq!(trace.step_names(), vec!["build_prompt", "extract_request"]);
        assert_eq!(trace.total_token_usage().unwrap().total_tokens, 150);
    }

    #[test]
    fn test_execution_trace_failure() {
        let mut trace = ExecutionTrace::new("data_analysis");
        trace.add_step(StepTrace::success("build_prompt", "prompt", 1));
        trace.add_step(StepTrace::failure("run_analysis", "tool", "bad output", 5));

        assert!(!trace.success);
        assert_eq!(trace.error.as_deref(), Some("bad output"));
        assert!(trace.total_token_usage().is_none());
    }

    #[test]
    fn test_retryability() {
        assert!(!WorkflowError::InvalidInput("empty".into()).is_retryable());
        assert!(!WorkflowError::UnknownIntent(Intent::DataAnalysis).is_retryable());

        let timeout = WorkflowError::step_failed(
            "invoke_model",
            FailureCause::Model(ModelErrorKind::Timeout),
            "slow",
        );
        assert!(timeout.is_retryable());
        assert_eq!(timeout.step(), Some("invoke_model"));

        let unknown_tool =
            WorkflowError::step_failed("run", FailureCause::Tool(ToolErrorKind::NotFound), "no");
        assert!(!unknown_tool.is_retryable());
        assert_eq!(unknown_tool.code(), "step_execution");
    }

    #[test]
    fn test_classification_unavailable_from_model_error() {
        let err = WorkflowError::classification_unavailable(&ModelError::new(
            ModelErrorKind::RateLimited,
            "429",
        ));
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Classification unavailable"));
    }
}
