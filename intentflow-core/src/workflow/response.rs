//! Final response returned to callers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::execution::{ExecutionTrace, WorkflowError};
use super::intent::Intent;

/// Success or failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Normalized executor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// Free text
    Text(String),
    /// Structured record
    Structured(Value),
    /// Reference to a produced file
    FileRef {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

impl Payload {
    /// Text rendering of the payload
    pub fn as_text(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Structured(value) => value.to_string(),
            Payload::FileRef { uri, .. } => uri.clone(),
        }
    }
}

/// Error code used when no routable intent was found
pub const UNCLASSIFIED_CODE: &str = "unclassified";

/// The single response shape every request produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub status: ResponseStatus,

    /// The intent the request resolved to
    pub intent: Intent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Human-readable reason for a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Stable error code for a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Step that failed, for step failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    /// Whether retrying the same request may succeed
    #[serde(default)]
    pub retryable: bool,

    /// Step trace of a successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
}

impl FinalResponse {
    pub fn success(intent: Intent, payload: Payload, trace: Option<ExecutionTrace>) -> Self {
        Self {
            status: ResponseStatus::Success,
            intent,
            payload: Some(payload),
            reason: None,
            error_code: None,
            failed_step: None,
            retryable: false,
            trace,
        }
    }

    /// Failure response for a workflow error
    pub fn failure(intent: Intent, error: &WorkflowError) -> Self {
        Self {
            status: ResponseStatus::Failure,
            intent,
            payload: None,
            reason: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            failed_step: error.step().map(str::to_string),
            retryable: error.is_retryable(),
            trace: None,
        }
    }

    /// Failure response when no routable intent was found
    pub fn unclassified() -> Self {
        Self {
            status: ResponseStatus::Failure,
            intent: Intent::Unclassified,
            payload: None,
            reason: Some(
                "Could not tell what kind of task this is. Ask for a data analysis, \
                 a translation, or a question about the knowledge base."
                    .to_string(),
            ),
            error_code: Some(UNCLASSIFIED_CODE.to_string()),
            failed_step: None,
            retryable: false,
            trace: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// HTTP-style status code
    ///
    /// 200 success, 400 invalid input, 422 unclassified or a non-retryable
    /// classification failure, 503 a retryable classification failure, 502 a
    /// retryable step failure, 500 anything else.
    pub fn status_code(&self) -> u16 {
        if self.is_success() {
            return 200;
        }
        match self.error_code.as_deref() {
            Some("invalid_input") => 400,
            Some(UNCLASSIFIED_CODE) => 422,
            Some("classification_unavailable") if self.retryable => 503,
            Some("classification_unavailable") => 422,
            Some("step_execution") if self.retryable => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelErrorKind;
    use crate::workflow::FailureCause;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            FinalResponse::success(Intent::DataAnalysis, Payload::Text("ok".into()), None)
                .status_code(),
            200
        );
        assert_eq!(FinalResponse::unclassified().status_code(), 422);
        assert_eq!(
            FinalResponse::failure(
                Intent::Unclassified,
                &WorkflowError::InvalidInput("empty".into())
            )
            .status_code(),
            400
        );
        assert_eq!(
            FinalResponse::failure(
                Intent::Unclassified,
                &WorkflowError::ClassificationUnavailable {
                    message: "timeout".into(),
                    retryable: true
                }
            )
            .status_code(),
            503
        );

        let retryable_step = WorkflowError::step_failed(
            "invoke_model",
            FailureCause::Model(ModelErrorKind::Transient),
            "502 upstream",
        );
        let response = FinalResponse::failure(Intent::KnowledgeQuestion, &retryable_step);
        assert_eq!(response.status_code(), 502);
        assert_eq!(response.failed_step.as_deref(), Some("invoke_model"));

        assert_eq!(
            FinalResponse::failure(
                Intent::DataAnalysis,
                &WorkflowError::UnknownIntent(Intent::DataAnalysis)
            )
            .status_code(),
            500
        );
    }

    #[test]
    fn test_payload_serialization() {
        let payload = Payload::FileRef {
            uri: "s3://bucket/report.csv".into(),
            media_type: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "file_ref");
        assert_eq!(json["value"]["uri"], "s3://bucket/report.csv");
        assert_eq!(payload.as_text(), "s3://bucket/report.csv");
    }
}
