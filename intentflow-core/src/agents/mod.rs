//! Built-in sub-workflows
//!
//! One [`SequentialExecutor`] per routable intent, plus the tool registry
//! their tool steps expect.
//!
//! | Intent | Steps |
//! |---|---|
//! | `data_analysis` | build_prompt → plan_analysis → run_analysis → summarize |
//! | `text_translation` | build_prompt → extract_request → translate_text → adjust_sentiment (when a tone was asked for) → format_translation |
//! | `knowledge_question` | retrieve_passages → build_prompt → invoke_model → format_answer |

pub mod data_analysis;
pub mod knowledge_qa;
pub mod text_translation;

use serde_json::Value;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::llm::ModelProvider;
use crate::tools::{ModelRewriteTool, RegistryError, SummaryStatisticsTool, ToolRegistry};
use crate::workflow::{FailureCause, Intent, RoutingTable, SessionContext, WorkflowError, WorkflowResult};

/// Routing table with every built-in executor
pub fn standard_routes() -> WorkflowResult<RoutingTable> {
    RoutingTable::builder()
        .route(Intent::DataAnalysis, data_analysis::executor()?)
        .route(Intent::TextTranslation, text_translation::executor()?)
        .route(Intent::KnowledgeQuestion, knowledge_qa::executor()?)
        .build()
}

/// Registry holding the tools the built-in executors call
pub fn standard_tools(
    model: Arc<dyn ModelProvider>,
    config: &ToolsConfig,
) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::with_config(config)
        .with_tool(Arc::new(SummaryStatisticsTool::new()))?
        .with_tool(Arc::new(ModelRewriteTool::translator(model.clone())))?
        .with_tool(Arc::new(ModelRewriteTool::sentiment_adjuster(model)))
}

/// String field of an object stored in context
fn field<'a>(context: &'a SessionContext, key: &str, field: &str) -> WorkflowResult<&'a str> {
    context
        .require(key)?
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            WorkflowError::step_failed(
                "",
                FailureCause::Context,
                format!("'{}' has no '{}' field", key, field),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModelProvider;
    use crate::workflow::Executor;

    #[test]
    fn test_standard_routes_cover_every_intent() {
        let routes = standard_routes().unwrap();
        assert!(routes.missing().is_empty());

        let names: Vec<_> = routes.entries().map(|(intent, e)| (intent, e.name().to_string())).collect();
        assert_eq!(
            names,
            vec![
                (Intent::DataAnalysis, "data_analysis".to_string()),
                (Intent::TextTranslation, "text_translation".to_string()),
                (Intent::KnowledgeQuestion, "knowledge_question".to_string()),
            ]
        );
        let translation = routes.get(Intent::TextTranslation).unwrap();
        assert_eq!(translation.step_names().len(), 5);
    }

    #[test]
    fn test_standard_tools() {
        let tools = standard_tools(Arc::new(StubModelProvider), &ToolsConfig::default()).unwrap();
        assert_eq!(
            tools.names(),
            vec!["adjust_sentiment", "summary_statistics", "translate_text"]
        );
    }
}
