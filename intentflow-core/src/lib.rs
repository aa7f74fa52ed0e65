//! # IntentFlow - Intent Routing for Multi-Step Agent Workflows
//!
//! IntentFlow takes a user request, decides what kind of task it is, and runs
//! the one sub-workflow built for that task:
//! - Intent classification (model-backed or keyword-based)
//! - A static routing table from intent to executor
//! - Sequential executors whose steps build prompts, call the model, call
//!   tools, retrieve passages and transform a per-request context
//! - A pure aggregator producing one response shape for every outcome
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intentflow_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = IntentFlowConfig::load()?;
//!     let model = ModelProviderFactory::from_config(&config)?;
//!
//!     let dispatcher = Dispatcher::builder()
//!         .config(&config)
//!         .model(model.clone())
//!         .tools(standard_tools(model, &config.tools)?)
//!         .routes(standard_routes()?)
//!         .build()?;
//!
//!     let response = dispatcher
//!         .dispatch(&Request::new("Translate 'hello' to French"))
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Classifier**: one [`workflow::Intent`] per request, never a guess on
//!   failure
//! - **Dispatcher**: at most one executor per request, fresh context each time
//! - **Executors**: strictly ordered steps; the first failure aborts the run
//! - **Aggregator**: executor output to [`workflow::FinalResponse`]
//!
//! ## Feature Flags
//!
//! - `llm-anthropic`: Anthropic Messages API provider
//! - `llm-ollama`: Ollama provider

pub mod agents;
pub mod config;
pub mod conversation;
pub mod error;
pub mod handler;
pub mod llm;
pub mod retrieval;
pub mod tools;
pub mod workflow;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::{standard_routes, standard_tools};

    pub use crate::config::{
        ClassifierConfig, IntentFlowConfig, MemoryConfig, ModelConfig, ModelProviderKind,
        RetrievalConfig, ToolsConfig,
    };

    pub use crate::conversation::{ConversationMemory, InMemoryConversationMemory, Turn};

    pub use crate::error::{IntentFlowError, Result};

    pub use crate::handler::{EventHandler, HandlerResponse};

    pub use crate::llm::{
        InvocationOptions, Message, MessageRole, ModelError, ModelErrorKind, ModelProvider,
        ModelProviderFactory, ModelRequest, ModelResponse, RetryConfig, RetryingProvider,
        StubModelProvider,
    };

    pub use crate::retrieval::{InMemoryRetriever, RetrievalError, Retriever, ScoredPassage};

    pub use crate::tools::{
        ModelRewriteTool, SummaryStatisticsTool, Tool, ToolError, ToolErrorKind, ToolMetadata,
        ToolRegistry,
    };

    pub use crate::workflow::{
        Classification, Dispatcher, ExecutionTrace, Executor, ExecutorOutput, FailureCause,
        FinalResponse, Intent, IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier,
        Payload, Request, ResponseStatus, RoutingTable, SequentialExecutor, SessionContext, Step,
        StepTrace, WorkflowError, WorkflowResult, WorkflowServices,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
