//! Caller-supplied request

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::execution::{WorkflowError, WorkflowResult};

/// A user request entering the workflow
///
/// Immutable once built; every stage reads it through the accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,

    text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,

    /// Free-form metadata such as file references or inline data
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            session_id: None,
            metadata: Map::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Reject empty or whitespace-only text
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.text.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "request text is empty".to_string(),
            ));
        }
        if matches!(&self.session_id, Some(s) if s.trim().is_empty()) {
            return Err(WorkflowError::InvalidInput(
                "session id must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate() {
        assert!(Request::new("hello").validate().is_ok());
        assert!(matches!(
            Request::new("").validate(),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            Request::new(" \n\t ").validate(),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(Request::new("hi").with_session(" ").validate().is_err());
    }

    #[test]
    fn test_deserialize_assigns_id() {
        let request: Request = serde_json::from_value(json!({
            "text": "Translate 'hello' to French",
            "session_id": "s-1",
            "metadata": {"file": "sales.csv"}
        }))
        .unwrap();

        assert_eq!(request.session_id(), Some("s-1"));
        assert_eq!(request.metadata()["file"], "sales.csv");
        assert!(!request.id().is_nil());
    }
}
