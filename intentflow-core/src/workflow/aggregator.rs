//! Result aggregation
//!
//! Executors end with whatever shape their last step produced. [`aggregate`]
//! turns that into the one [`FinalResponse`] shape. It is a pure function:
//! no external calls and no side effects.

use serde_json::Value;

use super::executor::ExecutorOutput;
use super::intent::Intent;
use super::response::{FinalResponse, Payload};

/// Normalize an executor's output into a final response
pub fn aggregate(output: &ExecutorOutput, intent: Intent) -> FinalResponse {
    match output {
        ExecutorOutput::Completed { output, trace } => {
            FinalResponse::success(intent, normalize(output), Some(trace.clone()))
        }
        ExecutorOutput::Failed { error, .. } => FinalResponse::failure(intent, error),
    }
}

/// Map an output value onto a payload.
///
/// Strings become text. An object carrying only `uri` (and optionally
/// `media_type`) becomes a file reference. Anything else is structured.
pub fn normalize(value: &Value) -> Payload {
    match value {
        Value::String(text) => Payload::Text(text.clone()),
        Value::Object(map) if is_file_ref(map) => Payload::FileRef {
            uri: map
                .get("uri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            media_type: map
                .get("media_type")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        other => Payload::Structured(other.clone()),
    }
}

fn is_file_ref(map: &serde_json::Map<String, Value>) -> bool {
    map.get("uri").is_some_and(Value::is_string)
        && map.keys().all(|k| k == "uri" || k == "media_type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ExecutionTrace, FailureCause, ResponseStatus, WorkflowError};
    use crate::tools::ToolErrorKind;
    use serde_json::json;

    fn completed(output: Value) -> ExecutorOutput {
        ExecutorOutput::Completed {
            output,
            trace: ExecutionTrace::new("test"),
        }
    }

    #[test]
    fn test_normalize_shapes() {
        assert_eq!(normalize(&json!("bonjour")), Payload::Text("bonjour".into()));
        assert_eq!(
            normalize(&json!({"uri": "file:///tmp/out.csv", "media_type": "text/csv"})),
            Payload::FileRef {
                uri: "file:///tmp/out.csv".into(),
                media_type: Some("text/csv".into()),
            }
        );
        assert_eq!(
            normalize(&json!({"uri": "x", "size": 3})),
            Payload::Structured(json!({"uri": "x", "size": 3}))
        );
        assert_eq!(normalize(&json!([1, 2])), Payload::Structured(json!([1, 2])));
    }

    #[test]
    fn test_aggregate_is_pure() {
        let output = completed(json!({"mean": 2.0}));
        let first = aggregate(&output, Intent::DataAnalysis);
        let second = aggregate(&output, Intent::DataAnalysis);
        assert_eq!(first, second);
        assert_eq!(first.status, ResponseStatus::Success);
        assert!(first.trace.is_some());
    }

    #[test]
    fn test_aggregate_failure_hides_partial_state() {
        let output = ExecutorOutput::Failed {
            step: "run_analysis".into(),
            error: WorkflowError::step_failed(
                "run_analysis",
                FailureCause::Tool(ToolErrorKind::InvalidResponse),
                "missing mean",
            ),
        };

        let response = aggregate(&output, Intent::DataAnalysis);
        assert_eq!(response.status, ResponseStatus::Failure);
        assert_eq!(response.failed_step.as_deref(), Some("run_analysis"));
        assert!(response.payload.is_none());
        assert!(response.trace.is_none());
        assert_eq!(response, aggregate(&output, Intent::DataAnalysis));
    }
}
