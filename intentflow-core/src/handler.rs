//! Function-handler adapter
//!
//! Wraps a [`Dispatcher`] in the `{statusCode, body}` contract used by
//! function-as-a-service triggers. The event is either
//! `{"inputs": {"text": .., "session_id": .., "metadata": {..}}}` or the
//! same fields at the top level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::workflow::{Dispatcher, FinalResponse, Intent, Request, WorkflowError};

/// Response in the function-handler shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// JSON-encoded [`FinalResponse`]
    pub body: String,
}

impl HandlerResponse {
    fn from_final(response: &FinalResponse) -> Self {
        let body = serde_json::to_string(response).unwrap_or_else(|e| {
            json!({ "status": "failure", "reason": format!("response encoding failed: {}", e) })
                .to_string()
        });
        Self {
            status_code: response.status_code(),
            body,
        }
    }

    /// Decode the body back into a final response
    pub fn final_response(&self) -> serde_json::Result<FinalResponse> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Deserialize)]
struct EventInputs {
    text: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Event entry point around a shared dispatcher
#[derive(Debug, Clone)]
pub struct EventHandler {
    dispatcher: Arc<Dispatcher>,
}

impl EventHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handle one event. Never fails; malformed events are 400 responses.
    pub async fn handle_event(&self, event: Value) -> HandlerResponse {
        let request = match parse_event(event) {
            Ok(request) => request,
            Err(error) => {
                tracing::info!(error = %error, "Rejected malformed event");
                return HandlerResponse::from_final(&FinalResponse::failure(
                    Intent::Unclassified,
                    &error,
                ));
            }
        };

        let response = self.dispatcher.dispatch(&request).await;
        HandlerResponse::from_final(&response)
    }
}

fn parse_event(mut event: Value) -> Result<Request, WorkflowError> {
    let inputs = if event.get("inputs").is_some() {
        event["inputs"].take()
    } else {
        event
    };

    let inputs: EventInputs = serde_json::from_value(inputs)
        .map_err(|e| WorkflowError::InvalidInput(format!("malformed event: {}", e)))?;

    let mut request = Request::new(inputs.text);
    if let Some(session_id) = inputs.session_id {
        request = request.with_session(session_id);
    }
    for (key, value) in inputs.metadata {
        request = request.with_metadata(key, value);
    }
    Ok(request)
}
