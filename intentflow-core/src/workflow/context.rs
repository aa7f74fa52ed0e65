//! Per-request Session Context
//!
//! A context is created by the dispatcher for exactly one executor run and is
//! passed by `&mut` into each step in turn. It is dropped when the run ends;
//! nothing in it reaches the caller except what the final step produces.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::llm::{Message, MessageRole};

use super::execution::{FailureCause, WorkflowError, WorkflowResult};
use super::request::Request;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*\}\}").unwrap());

/// Mutable key-value state shared by the steps of one executor run
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    values: Map<String, Value>,
    writers: HashMap<String, String>,
    history: Vec<Message>,
    current_step: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context with prior conversation turns
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Prior conversation turns, oldest first
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys currently set, in insertion-independent sorted order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name of the step that last wrote `key`
    pub fn written_by(&self, key: &str) -> Option<&str> {
        self.writers.get(key).map(String::as_str)
    }

    /// Store a value, attributed to the step currently running
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(step) = &self.current_step {
            self.writers.insert(key.clone(), step.clone());
        }
        self.values.insert(key, value);
    }

    /// Value a step cannot run without
    pub fn require(&self, key: &str) -> WorkflowResult<&Value> {
        self.get(key).ok_or_else(|| self.missing(key))
    }

    /// String value a step cannot run without
    pub fn require_str(&self, key: &str) -> WorkflowResult<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(self.context_error(format!(
                "context value '{}' should be a string, found {}",
                key,
                json_type(other)
            ))),
            None => Err(self.missing(key)),
        }
    }

    /// Render `{{name}}` placeholders.
    ///
    /// `{{text}}` and `{{session_id}}` come from the request, `{{history}}`
    /// from the seeded conversation and `{{metadata.KEY}}` from request
    /// metadata. Every other name must be a context key. Strings are inserted
    /// verbatim, other values as compact JSON.
    pub fn render(&self, template: &str, request: &Request) -> WorkflowResult<String> {
        let mut missing = None;
        let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let value = match name {
                "text" => Some(request.text().to_string()),
                "session_id" => Some(request.session_id().unwrap_or_default().to_string()),
                "history" => Some(self.format_history()),
                _ => match name.strip_prefix("metadata.") {
                    Some(key) => request.metadata().get(key).map(value_text),
                    None => self.get(name).map(value_text),
                },
            };
            value.unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });

        match missing {
            Some(name) => Err(self.missing(&name)),
            None => Ok(rendered.into_owned()),
        }
    }

    fn format_history(&self) -> String {
        self.history
            .iter()
            .map(|m| {
                let who = match m.role {
                    MessageRole::System => "System",
                    MessageRole::User => "User",
                    MessageRole::Assistant => "Assistant",
                };
                format!("{}: {}", who, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn enter_step(&mut self, step: &str) {
        self.current_step = Some(step.to_string());
    }

    pub(crate) fn leave_step(&mut self) {
        self.current_step = None;
    }

    fn missing(&self, key: &str) -> WorkflowError {
        self.context_error(format!("context value '{}' is not set", key))
    }

    fn context_error(&self, message: String) -> WorkflowError {
        WorkflowError::step_failed(
            self.current_step.clone().unwrap_or_default(),
            FailureCause::Context,
            message,
        )
    }
}

/// Text form of a value for prompt rendering
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_records_writer() {
        let mut context = SessionContext::new();
        context.enter_step("build_prompt");
        context.insert("prompt", json!("hi"));
        context.leave_step();

        assert_eq!(context.get_str("prompt"), Some("hi"));
        assert_eq!(context.written_by("prompt"), Some("build_prompt"));
        assert_eq!(context.keys(), vec!["prompt"]);
    }

    #[test]
    fn test_require_reports_current_step() {
        let mut context = SessionContext::new();
        context.enter_step("invoke_model");
        context.insert("count", json!(3));

        match context.require("prompt") {
            Err(WorkflowError::StepExecution { step, cause, .. }) => {
                assert_eq!(step, "invoke_model");
                assert_eq!(cause, FailureCause::Context);
            }
            other => panic!("expected step failure, got {:?}", other),
        }
        assert!(context.require_str("count").is_err());
    }

    #[test]
    fn test_render() {
        let request = Request::new("What is Rust?")
            .with_session("s-9")
            .with_metadata("lang", json!("en"));
        let mut context = SessionContext::new()
            .with_history(vec![Message::user("hi"), Message::assistant("hello")]);
        context.insert("passages", json!(["a", "b"]));

        let rendered = context
            .render(
                "{{history}}\nQ: {{ text }} ({{session_id}}/{{metadata.lang}}) {{passages}}",
                &request,
            )
            .unwrap();
        assert_eq!(
            rendered,
            "User: hi\nAssistant: hello\nQ: What is Rust? (s-9/en) [\"a\",\"b\"]"
        );
    }

    #[test]
    fn test_render_missing_key() {
        let context = SessionContext::new();
        let err = context.render("{{nope}}", &Request::new("x")).unwrap_err();
        assert!(err.to_string().contains("'nope'"));
    }
}
