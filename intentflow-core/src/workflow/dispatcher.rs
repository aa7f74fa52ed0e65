//! Workflow dispatcher
//!
//! Classifies a request, picks exactly one executor from a static
//! [`RoutingTable`], runs it against a fresh [`SessionContext`] and hands the
//! output to the aggregator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ClassifierConfig, IntentFlowConfig};
use crate::conversation::{ConversationMemory, Turn};
use crate::llm::ModelProvider;
use crate::retrieval::Retriever;
use crate::tools::ToolRegistry;

use super::aggregator::aggregate;
use super::classifier::{IntentClassifier, LlmIntentClassifier};
use super::context::SessionContext;
use super::execution::{WorkflowError, WorkflowResult};
use super::executor::{Executor, WorkflowServices};
use super::intent::Intent;
use super::request::Request;
use super::response::FinalResponse;

/// Intent to executor mapping, fixed at initialization
#[derive(Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<Intent, Arc<dyn Executor>>,
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.routes.iter().map(|(intent, e)| (intent, e.name())))
            .finish()
    }
}

impl RoutingTable {
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder { routes: Vec::new() }
    }

    /// Executor for `intent`
    pub fn get(&self, intent: Intent) -> Option<&Arc<dyn Executor>> {
        self.routes.get(&intent)
    }

    /// Routes in intent order
    pub fn entries(&self) -> impl Iterator<Item = (Intent, &dyn Executor)> {
        self.routes.iter().map(|(intent, e)| (*intent, e.as_ref()))
    }

    /// Routable intents with no executor
    pub fn missing(&self) -> Vec<Intent> {
        Intent::ROUTABLE
            .into_iter()
            .filter(|intent| !self.routes.contains_key(intent))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder for [`RoutingTable`]
pub struct RoutingTableBuilder {
    routes: Vec<(Intent, Arc<dyn Executor>)>,
}

impl RoutingTableBuilder {
    /// Route `intent` to `executor`
    pub fn route(self, intent: Intent, executor: impl Executor + 'static) -> Self {
        self.route_shared(intent, Arc::new(executor))
    }

    /// Route `intent` to a shared executor
    pub fn route_shared(mut self, intent: Intent, executor: Arc<dyn Executor>) -> Self {
        self.routes.push((intent, executor));
        self
    }

    /// Build the table
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `Unclassified` is given a route or an intent is
    /// routed twice.
    pub fn build(self) -> WorkflowResult<RoutingTable> {
        let mut routes = BTreeMap::new();
        for (intent, executor) in self.routes {
            if !intent.is_routable() {
                return Err(WorkflowError::InvalidConfig(format!(
                    "intent '{}' cannot have an executor",
                    intent
                )));
            }
            if routes.insert(intent, executor).is_some() {
                return Err(WorkflowError::InvalidConfig(format!(
                    "intent '{}' is routed twice",
                    intent
                )));
            }
        }
        Ok(RoutingTable { routes })
    }
}

/// Top-level entry point
///
/// Shared across concurrent requests; nothing in it is mutated per request.
pub struct Dispatcher {
    classifier: Arc<dyn IntentClassifier>,
    routes: RoutingTable,
    services: WorkflowServices,
    memory: Option<Arc<dyn ConversationMemory>>,
    min_confidence: f32,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("classifier", &self.classifier.name())
            .field("routes", &self.routes)
            .field("has_memory", &self.memory.is_some())
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn services(&self) -> &WorkflowServices {
        &self.services
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Handle a request.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty request, before the classifier is called.
    /// Every other outcome, failures included, is a [`FinalResponse`].
    pub async fn handle(&self, request: &Request) -> WorkflowResult<FinalResponse> {
        request.validate()?;
        Ok(self.route(request).await)
    }

    /// Like [`handle`](Self::handle), with invalid input folded into a
    /// failure response
    pub async fn dispatch(&self, request: &Request) -> FinalResponse {
        match self.handle(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::info!(request_id = %request.id(), error = %error, "Request rejected");
                FinalResponse::failure(Intent::Unclassified, &error)
            }
        }
    }

    async fn route(&self, request: &Request) -> FinalResponse {
        let start = Instant::now();

        let classification = match self.classifier.classify(request).await {
            Ok(classification) => classification.with_min_confidence(self.min_confidence),
            Err(error) => {
                tracing::warn!(
                    request_id = %request.id(),
                    classifier = self.classifier.name(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "Classification failed; no executor invoked"
                );
                return FinalResponse::failure(Intent::Unclassified, &error);
            }
        };

        let intent = classification.intent;
        tracing::info!(
            request_id = %request.id(),
            intent = %intent,
            confidence = classification.confidence,
            "Request classified"
        );

        if !intent.is_routable() {
            return FinalResponse::unclassified();
        }

        let Some(executor) = self.routes.get(intent) else {
            let error = WorkflowError::UnknownIntent(intent);
            tracing::error!(
                request_id = %request.id(),
                intent = %intent,
                "No executor registered for classified intent"
            );
            return FinalResponse::failure(intent, &error);
        };

        let context = self.session_context(request).await;
        let output = executor.run(request, context, &self.services).await;
        let response = aggregate(&output, intent);

        if response.is_success() {
            self.remember(request, &response).await;
        }

        tracing::info!(
            request_id = %request.id(),
            session_id = request.session_id().unwrap_or_default(),
            intent = %intent,
            executor = executor.name(),
            success = response.is_success(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );

        response
    }

    async fn session_context(&self, request: &Request) -> SessionContext {
        let (Some(memory), Some(session_id)) = (&self.memory, request.session_id()) else {
            return SessionContext::new();
        };

        match memory.load(session_id).await {
            Ok(turns) => {
                SessionContext::new().with_history(turns.iter().map(Turn::to_message).collect())
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %request.id(),
                    session_id,
                    error = %error,
                    "Failed to load conversation history; continuing without it"
                );
                SessionContext::new()
            }
        }
    }

    async fn remember(&self, request: &Request, response: &FinalResponse) {
        let (Some(memory), Some(session_id)) = (&self.memory, request.session_id()) else {
            return;
        };
        let Some(payload) = &response.payload else {
            return;
        };

        let turns = vec![Turn::user(request.text()), Turn::assistant(payload.as_text())];
        if let Err(error) = memory.append(session_id, turns).await {
            tracing::warn!(
                request_id = %request.id(),
                session_id,
                error = %error,
                "Failed to persist conversation turns"
            );
        }
    }
}

/// Builder for [`Dispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    classifier: Option<Arc<dyn IntentClassifier>>,
    routes: Option<RoutingTable>,
    services: WorkflowServices,
    memory: Option<Arc<dyn ConversationMemory>>,
    classifier_config: ClassifierConfig,
}

impl DispatcherBuilder {
    pub fn classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn routes(mut self, routes: RoutingTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn services(mut self, services: WorkflowServices) -> Self {
        self.services = services;
        self
    }

    /// Model used by model steps, and by the default classifier
    pub fn model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.services.model = model;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.services.tools = Arc::new(tools);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.services.retriever = Some(retriever);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Classifications below this confidence resolve to `Unclassified`
    pub fn min_confidence(mut self, min_confidence: f32) -> Self {
        self.classifier_config.min_confidence = min_confidence;
        self
    }

    /// Apply classifier, model and retrieval settings
    pub fn config(mut self, config: &IntentFlowConfig) -> Self {
        self.classifier_config = config.classifier.clone();
        self.services = self.services.configured(config);
        self
    }

    /// Build the dispatcher.
    ///
    /// Without an explicit classifier, an [`LlmIntentClassifier`] over the
    /// services' model is used.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when no routing table was given or it is empty.
    pub fn build(self) -> WorkflowResult<Dispatcher> {
        let routes = self
            .routes
            .filter(|routes| !routes.is_empty())
            .ok_or_else(|| WorkflowError::InvalidConfig("no routes configured".to_string()))?;

        for intent in routes.missing() {
            tracing::warn!(intent = %intent, "Intent has no executor; requests for it will fail");
        }

        let classifier = self.classifier.unwrap_or_else(|| {
            Arc::new(LlmIntentClassifier::from_config(
                self.services.model.clone(),
                &self.classifier_config,
            ))
        });

        Ok(Dispatcher {
            classifier,
            routes,
            services: self.services,
            memory: self.memory,
            min_confidence: self.classifier_config.min_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InMemoryConversationMemory;
    use crate::workflow::{Classification, ExecutorOutput, ResponseStatus, SequentialExecutor, Step};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Classification);

    #[async_trait]
    impl IntentClassifier for Fixed {
        async fn classify(&self, request: &Request) -> WorkflowResult<Classification> {
            request.validate()?;
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Echoes the request text and records the history it was seeded with
    #[derive(Default)]
    struct Echo {
        runs: AtomicUsize,
        seen_history: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Executor for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(
            &self,
            request: &Request,
            context: SessionContext,
            _services: &WorkflowServices,
        ) -> ExecutorOutput {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.seen_history.lock().unwrap().push(context.history().len());
            ExecutorOutput::Completed {
                output: json!(format!("echo: {}", request.text())),
                trace: crate::workflow::ExecutionTrace::new("echo"),
            }
        }
    }

    fn dispatcher(classification: Classification, echo: Arc<Echo>) -> DispatcherBuilder {
        Dispatcher::builder().classifier(Fixed(classification)).routes(
            RoutingTable::builder()
                .route_shared(Intent::DataAnalysis, echo)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_routing_table_rejects_bad_routes() {
        let executor = || {
            SequentialExecutor::builder("e")
                .step(Step::prompt("p", "{{text}}").build())
                .build()
                .unwrap()
        };

        let unclassified = RoutingTable::builder()
            .route(Intent::Unclassified, executor())
            .build();
        assert!(matches!(unclassified, Err(WorkflowError::InvalidConfig(_))));

        let twice = RoutingTable::builder()
            .route(Intent::DataAnalysis, executor())
            .route(Intent::DataAnalysis, executor())
            .build();
        assert!(twice.is_err());

        let table = RoutingTable::builder()
            .route(Intent::TextTranslation, executor())
            .build()
            .unwrap();
        assert_eq!(table.missing(), vec![Intent::DataAnalysis, Intent::KnowledgeQuestion]);
        assert!(Dispatcher::builder().build().is_err());
    }

    #[tokio::test]
    async fn test_routes_to_one_executor() {
        let echo = Arc::new(Echo::default());
        let dispatcher = dispatcher(Classification::new(Intent::DataAnalysis, 0.9), echo.clone())
            .build()
            .unwrap();

        let response = dispatcher.dispatch(&Request::new("mean of 1,2,3")).await;
        assert!(response.is_success());
        assert_eq!(response.intent, Intent::DataAnalysis);
        assert_eq!(response.payload.unwrap().as_text(), "echo: mean of 1,2,3");
        assert_eq!(echo.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_is_unclassified() {
        let echo = Arc::new(Echo::default());
        let dispatcher = dispatcher(Classification::new(Intent::DataAnalysis, 0.4), echo.clone())
            .min_confidence(0.5)
            .build()
            .unwrap();

        let response = dispatcher.dispatch(&Request::new("numbers?")).await;
        assert_eq!(response.status, ResponseStatus::Failure);
        assert_eq!(response.intent, Intent::Unclassified);
        assert_eq!(response.status_code(), 422);
        assert_eq!(echo.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unrouted_intent_is_unknown_intent() {
        let echo = Arc::new(Echo::default());
        let dispatcher =
            dispatcher(Classification::new(Intent::TextTranslation, 0.9), echo.clone())
                .build()
                .unwrap();

        let response = dispatcher.dispatch(&Request::new("translate this")).await;
        assert_eq!(response.error_code.as_deref(), Some("unknown_intent"));
        assert!(!response.retryable);
        assert_eq!(echo.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_rejects_empty_input() {
        let echo = Arc::new(Echo::default());
        let dispatcher = dispatcher(Classification::new(Intent::DataAnalysis, 0.9), echo.clone())
            .build()
            .unwrap();

        let err = dispatcher.handle(&Request::new(" \n ")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
        assert_eq!(dispatcher.dispatch(&Request::new("")).await.status_code(), 400);
        assert_eq!(echo.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_memory_seeds_history_per_session() {
        let echo = Arc::new(Echo::default());
        let memory = Arc::new(InMemoryConversationMemory::new(10));
        let dispatcher = dispatcher(Classification::new(Intent::DataAnalysis, 0.9), echo.clone())
            .memory(memory.clone())
            .build()
            .unwrap();

        dispatcher
            .dispatch(&Request::new("first").with_session("s1"))
            .await;
        dispatcher
            .dispatch(&Request::new("second").with_session("s1"))
            .await;
        dispatcher.dispatch(&Request::new("other")).await;

        assert_eq!(*echo.seen_history.lock().unwrap(), vec![0, 2, 0]);
        let turns = memory.load("s1").await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[3].content, "echo: second");
    }
}
