//! Workflow Step definition
//!
//! A step is a named, tagged unit of work. The executor's driver loop runs
//! steps one at a time against the same [`SessionContext`]; each step reads
//! what earlier steps stored and writes its own result under an output key.

use serde_json::Value;
use std::sync::Arc;

use crate::llm::{
    InvocationOptions, Message, ModelRequest, TokenUsage, extract_json, invoke_with_deadline,
};

use super::context::SessionContext;
use super::execution::{FailureCause, WorkflowError, WorkflowResult};
use super::executor::WorkflowServices;
use super::request::Request;

/// Builds tool arguments from the request and the context so far
pub type ArgsFn = Arc<dyn Fn(&Request, &SessionContext) -> WorkflowResult<Value> + Send + Sync>;

/// Deterministic in-place transformation of the context
pub type TransformFn =
    Arc<dyn Fn(&Request, &mut SessionContext) -> WorkflowResult<()> + Send + Sync>;

/// Checks a tool's output shape; `Err` carries the reason it is malformed
pub type OutputCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Decides from the context so far whether a step runs
pub type Guard = Arc<dyn Fn(&Request, &SessionContext) -> bool + Send + Sync>;

/// Type of step execution
#[derive(Clone)]
pub enum StepKind {
    /// Render a template into a prompt
    Prompt {
        /// Template with `{{name}}` placeholders
        template: String,
        output_key: String,
    },
    /// Call the model with a prompt stored in context
    Model {
        prompt_key: String,
        system_prompt: Option<String>,
        /// Send prior conversation turns before the prompt
        include_history: bool,
        /// Parse the completion as JSON instead of storing text
        parse_json: bool,
        /// Overrides the executor-wide options
        options: Option<InvocationOptions>,
        output_key: String,
    },
    /// Call a named tool through the registry
    Tool {
        tool: String,
        args: ArgsFn,
        check: Option<OutputCheck>,
        output_key: String,
    },
    /// Fetch passages from the knowledge store
    Retrieve {
        /// Context key holding the query; the request text when `None`
        query_key: Option<String>,
        /// Overrides the configured top-k
        top_k: Option<usize>,
        output_key: String,
    },
    /// Apply a deterministic function to the context
    Transform { transform: TransformFn },
}

impl StepKind {
    /// Short label used in traces
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Prompt { .. } => "prompt",
            StepKind::Model { .. } => "model",
            StepKind::Tool { .. } => "tool",
            StepKind::Retrieve { .. } => "retrieve",
            StepKind::Transform { .. } => "transform",
        }
    }
}

impl std::fmt::Debug for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Prompt {
                template,
                output_key,
            } => f
                .debug_struct("Prompt")
                .field("template", template)
                .field("output_key", output_key)
                .finish(),
            StepKind::Model {
                prompt_key,
                parse_json,
                output_key,
                ..
            } => f
                .debug_struct("Model")
                .field("prompt_key", prompt_key)
                .field("parse_json", parse_json)
                .field("output_key", output_key)
                .finish(),
            StepKind::Tool {
                tool, output_key, ..
            } => f
                .debug_struct("Tool")
                .field("tool", tool)
                .field("output_key", output_key)
                .finish(),
            StepKind::Retrieve {
                query_key,
                top_k,
                output_key,
            } => f
                .debug_struct("Retrieve")
                .field("query_key", query_key)
                .field("top_k", top_k)
                .field("output_key", output_key)
                .finish(),
            StepKind::Transform { .. } => f.debug_struct("Transform").finish(),
        }
    }
}

/// A single step in an executor
#[derive(Clone)]
pub struct Step {
    /// Step name, reported when the step fails
    pub name: String,
    /// What the step does
    pub kind: StepKind,
    /// Optional description
    pub description: Option<String>,
    guard: Option<Guard>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("conditional", &self.guard.is_some())
            .finish()
    }
}

impl Step {
    /// Render `template` into `output_key` (default `prompt`)
    pub fn prompt(name: impl Into<String>, template: impl Into<String>) -> StepBuilder {
        StepBuilder::new(
            name,
            StepKind::Prompt {
                template: template.into(),
                output_key: "prompt".to_string(),
            },
        )
    }

    /// Send the prompt stored under `prompt_key` to the model and store the
    /// reply under `output_key` (default `completion`)
    pub fn model(name: impl Into<String>, prompt_key: impl Into<String>) -> StepBuilder {
        StepBuilder::new(
            name,
            StepKind::Model {
                prompt_key: prompt_key.into(),
                system_prompt: None,
                include_history: false,
                parse_json: false,
                options: None,
                output_key: "completion".to_string(),
            },
        )
    }

    /// Call `tool` with arguments built by `args`; the output goes under
    /// `output_key` (default: the tool name)
    pub fn tool<F>(name: impl Into<String>, tool: impl Into<String>, args: F) -> StepBuilder
    where
        F: Fn(&Request, &SessionContext) -> WorkflowResult<Value> + Send + Sync + 'static,
    {
        let tool = tool.into();
        StepBuilder::new(
            name,
            StepKind::Tool {
                output_key: tool.clone(),
                tool,
                args: Arc::new(args),
                check: None,
            },
        )
    }

    /// Retrieve passages for the request text into `output_key`
    /// (default `passages`)
    pub fn retrieve(name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(
            name,
            StepKind::Retrieve {
                query_key: None,
                top_k: None,
                output_key: "passages".to_string(),
            },
        )
    }

    /// Create a transform step
    pub fn transform<F>(name: impl Into<String>, transform: F) -> StepBuilder
    where
        F: Fn(&Request, &mut SessionContext) -> WorkflowResult<()> + Send + Sync + 'static,
    {
        StepBuilder::new(
            name,
            StepKind::Transform {
                transform: Arc::new(transform),
            },
        )
    }

    /// Context key this step writes, if it declares one
    pub fn output_key(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Prompt { output_key, .. }
            | StepKind::Model { output_key, .. }
            | StepKind::Tool { output_key, .. }
            | StepKind::Retrieve { output_key, .. } => Some(output_key),
            StepKind::Transform { .. } => None,
        }
    }

    /// Whether the step runs given the context so far. Unconditional steps
    /// always run.
    pub fn should_run(&self, request: &Request, context: &SessionContext) -> bool {
        self.guard.as_ref().is_none_or(|guard| guard(request, context))
    }

    /// Execute this step against the context.
    ///
    /// Returns token usage for model steps. Every error is a
    /// [`WorkflowError::StepExecution`] naming this step.
    pub async fn run(
        &self,
        request: &Request,
        context: &mut SessionContext,
        services: &WorkflowServices,
    ) -> WorkflowResult<Option<TokenUsage>> {
        self.execute(request, context, services)
            .await
            .map_err(|e| self.attribute(e))
    }

    async fn execute(
        &self,
        request: &Request,
        context: &mut SessionContext,
        services: &WorkflowServices,
    ) -> WorkflowResult<Option<TokenUsage>> {
        match &self.kind {
            StepKind::Prompt {
                template,
                output_key,
            } => {
                let prompt = context.render(template, request)?;
                context.insert(output_key.as_str(), Value::String(prompt));
                Ok(None)
            }
            StepKind::Model {
                prompt_key,
                system_prompt,
                include_history,
                parse_json,
                options,
                output_key,
            } => {
                let mut messages = Vec::new();
                if let Some(system) = system_prompt {
                    messages.push(Message::system(system.as_str()));
                }
                if *include_history {
                    messages.extend(context.history().iter().cloned());
                }
                messages.push(Message::user(context.require_str(prompt_key)?));

                let model_request = ModelRequest {
                    model: None,
                    messages,
                    options: options.clone().unwrap_or_else(|| services.model_options.clone()),
                    stop_sequences: Vec::new(),
                };

                let response = invoke_with_deadline(services.model.as_ref(), &model_request)
                    .await
                    .map_err(|e| self.fail(FailureCause::from(&e), e.to_string()))?;

                let value = if *parse_json {
                    extract_json::<Value>(&response.content)
                        .map_err(|e| self.fail(FailureCause::from(&e), e.to_string()))?
                } else {
                    Value::String(response.content.trim().to_string())
                };
                context.insert(output_key.as_str(), value);
                Ok(response.usage)
            }
            StepKind::Tool {
                tool,
                args,
                check,
                output_key,
            } => {
                let args = args(request, context)?;
                let output = services
                    .tools
                    .call_tool(tool, args)
                    .await
                    .map_err(|e| self.fail(FailureCause::from(&e), e.to_string()))?;

                if let Some(check) = check {
                    check(&output).map_err(|reason| {
                        self.fail(
                            FailureCause::Tool(crate::tools::ToolErrorKind::InvalidResponse),
                            format!("tool '{}' returned malformed output: {}", tool, reason),
                        )
                    })?;
                }
                context.insert(output_key.as_str(), output);
                Ok(None)
            }
            StepKind::Retrieve {
                query_key,
                top_k,
                output_key,
            } => {
                let retriever = services.retriever.as_ref().ok_or_else(|| {
                    self.fail(
                        FailureCause::Retrieval { retryable: false },
                        "no knowledge store is configured",
                    )
                })?;
                let query = match query_key {
                    Some(key) => context.require_str(key)?.to_string(),
                    None => request.text().to_string(),
                };

                let passages = retriever
                    .retrieve(&query, top_k.unwrap_or(services.top_k))
                    .await
                    .map_err(|e| self.fail(FailureCause::from(&e), e.to_string()))?;
                if passages.is_empty() {
                    return Err(self.fail(
                        FailureCause::Retrieval { retryable: false },
                        "no relevant passages found",
                    ));
                }

                let value = serde_json::to_value(&passages)
                    .map_err(|e| self.fail(FailureCause::Context, e.to_string()))?;
                context.insert(output_key.as_str(), value);
                Ok(None)
            }
            StepKind::Transform { transform } => transform(request, context).map(|_| None),
        }
    }

    fn fail(&self, cause: FailureCause, message: impl Into<String>) -> WorkflowError {
        WorkflowError::step_failed(&self.name, cause, message)
    }

    /// Make sure an error coming out of this step names it
    fn attribute(&self, err: WorkflowError) -> WorkflowError {
        match err {
            WorkflowError::StepExecution { step, cause, message } if step != self.name => {
                WorkflowError::step_failed(&self.name, cause, message)
            }
            err @ WorkflowError::StepExecution { .. } => err,
            other => self.fail(FailureCause::Context, other.to_string()),
        }
    }
}

/// Builder for creating Steps
pub struct StepBuilder {
    name: String,
    kind: StepKind,
    description: Option<String>,
    guard: Option<Guard>,
}

impl StepBuilder {
    fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            guard: None,
        }
    }

    /// Add a description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Store the result under `key`
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        match &mut self.kind {
            StepKind::Prompt { output_key, .. }
            | StepKind::Model { output_key, .. }
            | StepKind::Tool { output_key, .. }
            | StepKind::Retrieve { output_key, .. } => *output_key = key.into(),
            StepKind::Transform { .. } => {}
        }
        self
    }

    /// Add a system prompt (model steps)
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        if let StepKind::Model { system_prompt, .. } = &mut self.kind {
            *system_prompt = Some(prompt.into());
        }
        self
    }

    /// Send conversation history with the prompt (model steps)
    pub fn with_history(mut self) -> Self {
        if let StepKind::Model {
            include_history, ..
        } = &mut self.kind
        {
            *include_history = true;
        }
        self
    }

    /// Parse the completion as JSON (model steps)
    pub fn parse_json(mut self) -> Self {
        if let StepKind::Model { parse_json, .. } = &mut self.kind {
            *parse_json = true;
        }
        self
    }

    /// Override invocation options (model steps)
    pub fn options(mut self, invocation: InvocationOptions) -> Self {
        if let StepKind::Model { options, .. } = &mut self.kind {
            *options = Some(invocation);
        }
        self
    }

    /// Reject tool output that fails `check` (tool steps)
    pub fn validate_output<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        if let StepKind::Tool { check, .. } = &mut self.kind {
            *check = Some(Arc::new(validator));
        }
        self
    }

    /// Read the query from a context key (retrieve steps)
    pub fn query_key(mut self, key: impl Into<String>) -> Self {
        if let StepKind::Retrieve { query_key, .. } = &mut self.kind {
            *query_key = Some(key.into());
        }
        self
    }

    /// Override top-k (retrieve steps)
    pub fn top_k(mut self, k: usize) -> Self {
        if let StepKind::Retrieve { top_k, .. } = &mut self.kind {
            *top_k = Some(k);
        }
        self
    }

    /// Run the step only when `guard` holds; otherwise the driver skips it
    pub fn when<F>(mut self, guard: F) -> Self
    where
        F: Fn(&Request, &SessionContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Build the step
    pub fn build(self) -> Step {
        Step {
            name: self.name,
            kind: self.kind,
            description: self.description,
            guard: self.guard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelError, ModelErrorKind, ModelProvider, ModelResponse};
    use crate::tools::{Tool, ToolError, ToolMetadata, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedModel(&'static str);

    #[async_trait]
    impl ModelProvider for FixedModel {
        async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            if request.messages.last().map(|m| m.content.as_str()) == Some("fail") {
                return Err(ModelError::new(ModelErrorKind::RateLimited, "busy"));
            }
            Ok(ModelResponse::text(self.0))
        }
    }

    struct Doubler {
        metadata: ToolMetadata,
    }

    #[async_trait]
    impl Tool for Doubler {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            Ok(json!({ "result": args["n"].as_i64().unwrap_or(0) * 2 }))
        }
    }

    fn services(reply: &'static str) -> WorkflowServices {
        let tools = ToolRegistry::new()
            .with_tool(Arc::new(Doubler {
                metadata: ToolMetadata::new("double", "Doubles n"),
            }))
            .unwrap();
        WorkflowServices::new(Arc::new(FixedModel(reply))).with_tools(tools)
    }

    #[test]
    fn test_step_builder() {
        let step = Step::model("summarize", "prompt")
            .description("Summarizes the input")
            .system_prompt("You are a helpful assistant")
            .parse_json()
            .output_key("summary")
            .build();

        assert_eq!(step.name, "summarize");
        assert_eq!(step.kind.label(), "model");
        assert_eq!(step.output_key(), Some("summary"));
        assert!(matches!(step.kind, StepKind::Model { parse_json: true, .. }));
    }

    #[tokio::test]
    async fn test_prompt_then_model() {
        let services = services(" {\"ok\": true} ");
        let request = Request::new("hello");
        let mut context = SessionContext::new();

        Step::prompt("build", "Say: {{text}}")
            .build()
            .run(&request, &mut context, &services)
            .await
            .unwrap();
        assert_eq!(context.get_str("prompt"), Some("Say: hello"));

        Step::model("call", "prompt")
            .parse_json()
            .build()
            .run(&request, &mut context, &services)
            .await
            .unwrap();
        assert_eq!(context.get("completion"), Some(&json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_model_error_is_attributed() {
        let services = services("unused");
        let request = Request::new("x");
        let mut context = SessionContext::new();
        context.insert("prompt", json!("fail"));

        let err = Step::model("invoke_model", "prompt")
            .build()
            .run(&request, &mut context, &services)
            .await
            .unwrap_err();
        match err {
            WorkflowError::StepExecution { step, cause, .. } => {
                assert_eq!(step, "invoke_model");
                assert_eq!(cause, FailureCause::Model(ModelErrorKind::RateLimited));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_step_with_check() {
        let services = services("unused");
        let request = Request::new("x");
        let mut context = SessionContext::new();

        Step::tool("run", "double", |_, _| Ok(json!({"n": 21})))
            .build()
            .run(&request, &mut context, &services)
            .await
            .unwrap();
        assert_eq!(context.get("double"), Some(&json!({"result": 42})));

        let err = Step::tool("run_checked", "double", |_, _| Ok(json!({"n": 1})))
            .validate_output(|v| {
                v.get("mean").map(|_| ()).ok_or_else(|| "missing mean".to_string())
            })
            .build()
            .run(&request, &mut context, &services)
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some("run_checked"));
        assert!(err.to_string().contains("missing mean"));
    }

    #[tokio::test]
    async fn test_retrieve_without_store_fails() {
        let services = services("unused");
        let err = Step::retrieve("retrieve_passages")
            .build()
            .run(&Request::new("why?"), &mut SessionContext::new(), &services)
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some("retrieve_passages"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_guard() {
        let step = Step::transform("adjust", |_, _| Ok(()))
            .when(|_, ctx| ctx.contains("tone"))
            .build();
        let request = Request::new("x");
        let mut context = SessionContext::new();
        assert!(!step.should_run(&request, &context));
        context.insert("tone", json!("formal"));
        assert!(step.should_run(&request, &context));
        assert!(Step::prompt("p", "x").build().should_run(&request, &SessionContext::new()));
    }

    #[tokio::test]
    async fn test_transform_errors_are_attributed() {
        let services = services("unused");
        let err = Step::transform("format", |_, _| {
            Err(WorkflowError::InvalidInput("bad".to_string()))
        })
        .build()
        .run(&Request::new("x"), &mut SessionContext::new(), &services)
        .await
        .unwrap_err();
        assert_eq!(err.step(), Some("format"));
    }
}
