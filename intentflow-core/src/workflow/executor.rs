//! Sub-workflow executors
//!
//! [`SequentialExecutor`] is the one driver loop every built-in executor
//! uses: steps run strictly in order against a single [`SessionContext`],
//! and the first failure stops the run.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::config::IntentFlowConfig;
use crate::llm::{InvocationOptions, ModelProvider, StubModelProvider};
use crate::retrieval::Retriever;
use crate::tools::ToolRegistry;

use super::context::SessionContext;
use super::execution::{
    ExecutionTrace, FailureCause, StepTrace, WorkflowError, WorkflowResult,
};
use super::request::Request;
use super::step::Step;

/// External capabilities shared by every executor
///
/// Read-only; one instance serves all concurrent requests.
#[derive(Clone)]
pub struct WorkflowServices {
    pub model: Arc<dyn ModelProvider>,
    pub tools: Arc<ToolRegistry>,
    pub retriever: Option<Arc<dyn Retriever>>,
    /// Default options for model steps
    pub model_options: InvocationOptions,
    /// Default passage count for retrieve steps
    pub top_k: usize,
}

impl std::fmt::Debug for WorkflowServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowServices")
            .field("model", &self.model.model_info().provider)
            .field("tools", &self.tools.names())
            .field("has_retriever", &self.retriever.is_some())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Default for WorkflowServices {
    fn default() -> Self {
        Self::new(Arc::new(StubModelProvider))
    }
}

impl WorkflowServices {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            tools: Arc::new(ToolRegistry::new()),
            retriever: None,
            model_options: InvocationOptions::default(),
            top_k: 4,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_model_options(mut self, options: InvocationOptions) -> Self {
        self.model_options = options;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Apply model options and top-k from configuration
    pub fn configured(self, config: &IntentFlowConfig) -> Self {
        self.with_model_options(config.model.options.clone())
            .with_top_k(config.retrieval.top_k)
    }
}

/// Outcome of one executor run
#[derive(Debug, Clone)]
pub enum ExecutorOutput {
    /// Every step completed; `output` is the value the executor produces
    Completed {
        output: Value,
        trace: ExecutionTrace,
    },
    /// A step failed and the remaining steps were skipped
    Failed { step: String, error: WorkflowError },
}

impl ExecutorOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutorOutput::Completed { .. })
    }
}

/// A sub-workflow that satisfies one intent
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor name
    fn name(&self) -> &str;

    /// Step names in execution order, for listings
    fn step_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run against a fresh context owned by this call
    async fn run(
        &self,
        request: &Request,
        context: SessionContext,
        services: &WorkflowServices,
    ) -> ExecutorOutput;
}

/// Executor that runs a fixed list of steps in order
#[derive(Debug, Clone)]
pub struct SequentialExecutor {
    name: String,
    steps: Vec<Step>,
    output_key: String,
}

impl SequentialExecutor {
    pub fn builder(name: impl Into<String>) -> SequentialExecutorBuilder {
        SequentialExecutorBuilder {
            name: name.into(),
            steps: Vec::new(),
            output_key: None,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Context key read as the executor's output
    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    fn finalize(&self, context: &SessionContext, trace: ExecutionTrace) -> ExecutorOutput {
        match context.get(&self.output_key) {
            Some(output) => ExecutorOutput::Completed {
                output: output.clone(),
                trace,
            },
            None => {
                let step = self
                    .steps
                    .last()
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                ExecutorOutput::Failed {
                    error: WorkflowError::step_failed(
                        step.as_str(),
                        FailureCause::Context,
                        format!("no output under '{}'", self.output_key),
                    ),
                    step,
                }
            }
        }
    }
}

#[async_trait]
impl Executor for SequentialExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    async fn run(
        &self,
        request: &Request,
        mut context: SessionContext,
        services: &WorkflowServices,
    ) -> ExecutorOutput {
        let mut trace = ExecutionTrace::new(&self.name);

        for step in &self.steps {
            if !step.should_run(request, &context) {
                tracing::debug!(
                    request_id = %request.id(),
                    executor = %self.name,
                    step = %step.name,
                    "Step skipped"
                );
                trace.add_step(StepTrace::skipped(&step.name, step.kind.label()));
                continue;
            }

            let start = Instant::now();
            context.enter_step(&step.name);
            let result = step.run(request, &mut context, services).await;
            context.leave_step();
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(usage) => {
                    tracing::debug!(
                        request_id = %request.id(),
                        executor = %self.name,
                        step = %step.name,
                        duration_ms,
                        "Step completed"
                    );
                    trace.add_step(
                        StepTrace::success(&step.name, step.kind.label(), duration_ms)
                            .with_token_usage(usage),
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        request_id = %request.id(),
                        executor = %self.name,
                        step = %step.name,
                        retryable = error.is_retryable(),
                        error = %error,
                        "Step failed; aborting executor"
                    );
                    return ExecutorOutput::Failed {
                        step: step.name.clone(),
                        error,
                    };
                }
            }
        }

        self.finalize(&context, trace)
    }
}

/// Builder for [`SequentialExecutor`]
pub struct SequentialExecutorBuilder {
    name: String,
    steps: Vec<Step>,
    output_key: Option<String>,
}

impl SequentialExecutorBuilder {
    /// Append a step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Context key holding the final output; defaults to the last step's
    /// output key
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Build the executor
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when there are no steps, two steps share a name, or no
    /// output key can be determined.
    pub fn build(self) -> WorkflowResult<SequentialExecutor> {
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidConfig(format!(
                "executor '{}' has no steps",
                self.name
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.name == step.name) {
                return Err(WorkflowError::InvalidConfig(format!(
                    "executor '{}' has two steps named '{}'",
                    self.name, step.name
                )));
            }
        }

        let output_key = match self.output_key {
            Some(key) => key,
            None => self
                .steps
                .iter()
                .rev()
                .find_map(|s| s.output_key())
                .map(str::to_string)
                .ok_or_else(|| {
                    WorkflowError::InvalidConfig(format!(
                        "executor '{}' needs an output key",
                        self.name
                    ))
                })?,
        };

        Ok(SequentialExecutor {
            name: self.name,
            steps: self.steps,
            output_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_step(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Step {
        Step::transform(name, move |_, ctx| {
            log.lock().unwrap().push(name.to_string());
            ctx.insert(name, json!(ctx.len()));
            Ok(())
        })
        .build()
    }

    #[test]
    fn test_builder_rejects_bad_definitions() {
        assert!(SequentialExecutor::builder("empty").build().is_err());

        let dup = SequentialExecutor::builder("dup")
            .step(Step::prompt("a", "x").build())
            .step(Step::prompt("a", "y").build())
            .build();
        assert!(matches!(dup, Err(WorkflowError::InvalidConfig(_))));

        let no_output = SequentialExecutor::builder("no_output")
            .step(Step::transform("t", |_, _| Ok(())).build())
            .build();
        assert!(no_output.is_err());
    }

    #[test]
    fn test_output_key_defaults_to_last_declared() {
        let executor = SequentialExecutor::builder("e")
            .step(Step::prompt("build", "x").build())
            .step(Step::transform("t", |_, _| Ok(())).build())
            .build()
            .unwrap();
        assert_eq!(executor.output_key(), "prompt");
        assert_eq!(executor.step_names(), vec!["build", "t"]);
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = SequentialExecutor::builder("ordered")
            .step(recording_step("one", log.clone()))
            .step(recording_step("two", log.clone()))
            .step(recording_step("three", log.clone()))
            .output_key("three")
            .build()
            .unwrap();

        let output = executor
            .run(&Request::new("x"), SessionContext::new(), &WorkflowServices::default())
            .await;

        match output {
            ExecutorOutput::Completed { output, trace } => {
                // "three" saw the two keys written before it
                assert_eq!(output, json!(2));
                assert_eq!(trace.step_names(), vec!["one", "two", "three"]);
                assert!(trace.success);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(*log.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = SequentialExecutor::builder("failing")
            .step(recording_step("one", log.clone()))
            .step(
                Step::transform("two", |_, _| {
                    Err(WorkflowError::step_failed("", FailureCause::Context, "boom"))
                })
                .build(),
            )
            .step(recording_step("three", log.clone()))
            .output_key("three")
            .build()
            .unwrap();

        let output = executor
            .run(&Request::new("x"), SessionContext::new(), &WorkflowServices::default())
            .await;

        match output {
            ExecutorOutput::Failed { step, error } => {
                assert_eq!(step, "two");
                assert_eq!(error.step(), Some("two"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*log.lock().unwrap(), vec!["one"]);
    }

    #[tokio::test]
    async fn test_guarded_step_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = SequentialExecutor::builder("guarded")
            .step(recording_step("one", log.clone()))
            .step(
                Step::transform("never", |_, ctx| {
                    ctx.insert("never", json!(true));
                    Ok(())
                })
                .when(|request, _| request.metadata().contains_key("enable"))
                .build(),
            )
            .step(recording_step("two", log.clone()))
            .output_key("two")
            .build()
            .unwrap();

        let output = executor
            .run(&Request::new("x"), SessionContext::new(), &WorkflowServices::default())
            .await;
        match output {
            ExecutorOutput::Completed { output, trace } => {
                assert_eq!(output, json!(1));
                assert!(trace.steps[1].skipped);
                assert_eq!(trace.step_names(), vec!["one", "never", "two"]);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_output_is_failure() {
        let executor = SequentialExecutor::builder("e")
            .step(Step::transform("t", |_, _| Ok(())).build())
            .output_key("answer")
            .build()
            .unwrap();

        let output = executor
            .run(&Request::new("x"), SessionContext::new(), &WorkflowServices::default())
            .await;
        assert!(matches!(output, ExecutorOutput::Failed { step, .. } if step == "t"));
    }
}
