//! Intent routing and step sequencing
//!
//! The request path through this module:
//!
//! - **Classifier**: maps request text to one [`Intent`]
//! - **Dispatcher**: picks the single executor for that intent from a static
//!   [`RoutingTable`] and gives it a fresh [`SessionContext`]
//! - **Executor**: runs its ordered [`Step`]s; the first failure aborts it
//! - **Aggregator**: normalizes the executor output into a [`FinalResponse`]
//!
//! # Example
//!
//! ```rust,ignore
//! use intentflow_core::workflow::{
//!     Dispatcher, Intent, KeywordIntentClassifier, Request, RoutingTable, SequentialExecutor, Step,
//! };
//!
//! let echo = SequentialExecutor::builder("echo")
//!     .step(Step::prompt("build_prompt", "You said: {{text}}").build())
//!     .build()?;
//!
//! let dispatcher = Dispatcher::builder()
//!     .classifier(KeywordIntentClassifier::standard())
//!     .routes(RoutingTable::builder().route(Intent::KnowledgeQuestion, echo).build()?)
//!     .build()?;
//!
//! let response = dispatcher.dispatch(&Request::new("What is a workflow?")).await;
//! ```

mod aggregator;
mod classifier;
mod context;
mod dispatcher;
mod execution;
mod executor;
mod intent;
mod request;
mod response;
mod step;

pub use aggregator::{aggregate, normalize};
pub use classifier::{IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier};
pub use context::SessionContext;
pub use dispatcher::{Dispatcher, DispatcherBuilder, RoutingTable, RoutingTableBuilder};
pub use execution::{
    ExecutionTrace, FailureCause, StepTrace, WorkflowError, WorkflowResult,
};
pub use executor::{
    Executor, ExecutorOutput, SequentialExecutor, SequentialExecutorBuilder, WorkflowServices,
};
pub use intent::{Classification, Intent};
pub use request::Request;
pub use response::{FinalResponse, Payload, ResponseStatus, UNCLASSIFIED_CODE};
pub use step::{Step, StepBuilder, StepKind};
