//! Intent classifiers
//!
//! A classifier maps request text to exactly one [`Intent`]. A reply that
//! names no known intent resolves to [`Intent::Unclassified`]. A failed model
//! call is a `ClassificationUnavailable` error and never a guess.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::llm::{InvocationOptions, ModelProvider, ModelRequest, invoke_with_deadline};

use super::execution::{WorkflowError, WorkflowResult};
use super::intent::{Classification, Intent};
use super::request::Request;

/// Trait for classifying requests
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify the request.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty text, `ClassificationUnavailable` when the
    /// classifier's dependency fails.
    async fn classify(&self, request: &Request) -> WorkflowResult<Classification>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Model-backed classifier
pub struct LlmIntentClassifier {
    model: Arc<dyn ModelProvider>,
    system_prompt: String,
    options: InvocationOptions,
}

impl LlmIntentClassifier {
    /// Create a classifier over the routable intents
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            system_prompt: default_system_prompt(),
            options: ClassifierConfig::default().options,
        }
    }

    /// Create a classifier with options from configuration
    pub fn from_config(model: Arc<dyn ModelProvider>, config: &ClassifierConfig) -> Self {
        Self::new(model).with_options(config.options.clone())
    }

    /// Create with a custom system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    /// Map a model reply to a classification.
    ///
    /// An exact label scores 0.9. A reply that mentions exactly one routable
    /// label scores 0.7. Anything else is `Unclassified`.
    pub fn parse_reply(reply: &str) -> Classification {
        let reply = reply.trim();
        if let Some(intent) = Intent::from_label(reply) {
            return Classification::new(intent, 0.9).with_raw_label(reply);
        }

        match Intent::mentioned_in(reply).as_slice() {
            [intent] => Classification::new(*intent, 0.7).with_raw_label(reply),
            _ => Classification::unclassified().with_raw_label(reply),
        }
    }
}

fn default_system_prompt() -> String {
    let categories = Intent::ROUTABLE
        .iter()
        .map(|intent| format!("- {}: {}", intent.label(), intent.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a classifier. Classify the user's request into exactly one of these categories:\n\
         {}\n\
         If none fits, answer {}. Respond with ONLY the category name, nothing else.",
        categories,
        Intent::Unclassified.label()
    )
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, request: &Request) -> WorkflowResult<Classification> {
        request.validate()?;

        let model_request =
            ModelRequest::with_system_prompt(self.system_prompt.as_str(), request.text())
                .options(self.options.clone());

        let response = invoke_with_deadline(self.model.as_ref(), &model_request)
            .await
            .map_err(|e| {
                tracing::warn!(
                    request_id = %request.id(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Classifier model call failed"
                );
                WorkflowError::classification_unavailable(&e)
            })?;

        Ok(Self::parse_reply(&response.content))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Keyword-based classifier
///
/// Deterministic and offline. Confidence grows with the number of matching
/// keywords and shrinks when other intents match too, so ambiguous text falls
/// below the usual threshold.
pub struct KeywordIntentClassifier {
    keywords: Vec<(Intent, Vec<String>)>,
}

impl KeywordIntentClassifier {
    /// Create an empty keyword classifier
    pub fn new() -> Self {
        Self {
            keywords: Vec::new(),
        }
    }

    /// Keyword set for the built-in intents
    pub fn standard() -> Self {
        Self::new()
            .add_keywords(
                Intent::DataAnalysis,
                &[
                    "analy", "statistic", "average", "mean", "median", "sum of", "csv",
                    "dataset", "data", "column", "trend",
                ],
            )
            .add_keywords(
                Intent::TextTranslation,
                &["translat", "in french", "in spanish", "in german", "sentiment", "tone"],
            )
            .add_keywords(
                Intent::KnowledgeQuestion,
                &["what", "why", "who", "when", "explain", "document", "according to", "?"],
            )
    }

    /// Add keywords for an intent
    pub fn add_keywords(mut self, intent: Intent, keywords: &[&str]) -> Self {
        let keywords = keywords.iter().map(|k| k.to_lowercase()).collect::<Vec<_>>();
        match self.keywords.iter_mut().find(|(i, _)| *i == intent) {
            Some((_, existing)) => existing.extend(keywords),
            None => self.keywords.push((intent, keywords)),
        }
        self
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, request: &Request) -> WorkflowResult<Classification> {
        request.validate()?;
        let text = request.text().to_lowercase();

        let counts: Vec<(Intent, usize)> = self
            .keywords
            .iter()
            .filter(|(intent, _)| intent.is_routable())
            .map(|(intent, keywords)| {
                (
                    *intent,
                    keywords.iter().filter(|k| text.contains(k.as_str())).count(),
                )
            })
            .collect();

        let total: usize = counts.iter().map(|(_, c)| c).sum();
        let best = counts
            .iter()
            .fold(None::<(Intent, usize)>, |best, &(intent, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ if count > 0 => Some((intent, count)),
                _ => best,
            });

        Ok(match best {
            Some((intent, count)) => {
                let strength = (0.6 + 0.1 * (count as f32 - 1.0)).min(0.95);
                let share = count as f32 / total as f32;
                Classification::new(intent, strength * share)
            }
            None => Classification::unclassified(),
        })
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelError, ModelErrorKind, ModelResponse};
    use std::time::Duration;

    struct Reply(&'static str);

    #[async_trait]
    impl ModelProvider for Reply {
        async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            assert!(request.system_prompt().unwrap_or_default().contains("text_translation"));
            assert_eq!(request.options.temperature, 0.0);
            Ok(ModelResponse::text(self.0))
        }
    }

    struct Hang;

    #[async_trait]
    impl ModelProvider for Hang {
        async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelResponse::text("data_analysis"))
        }
    }

    #[test]
    fn test_parse_reply() {
        let c = LlmIntentClassifier::parse_reply("text_translation");
        assert_eq!(c.intent, Intent::TextTranslation);
        assert_eq!(c.confidence, 0.9);

        let c = LlmIntentClassifier::parse_reply("The category is data_analysis.");
        assert_eq!(c.intent, Intent::DataAnalysis);
        assert_eq!(c.confidence, 0.7);

        let c = LlmIntentClassifier::parse_reply("poetry");
        assert_eq!(c.intent, Intent::Unclassified);
        assert_eq!(c.raw_label.as_deref(), Some("poetry"));

        // two intents named: never pick one
        let c = LlmIntentClassifier::parse_reply("data_analysis or text_translation");
        assert_eq!(c.intent, Intent::Unclassified);
    }

    #[test]
    fn test_refusals_are_unclassified() {
        for reply in [
            "Sorry, I cannot answer that question.",
            "I would need more data to decide.",
            "I don't have enough knowledge to classify this.",
            "This looks like a translation request, maybe.",
        ] {
            let c = LlmIntentClassifier::parse_reply(reply).with_min_confidence(0.5);
            assert_eq!(c.intent, Intent::Unclassified, "reply: {}", reply);
        }

        let c = LlmIntentClassifier::parse_reply("Answer: knowledge_question");
        assert_eq!(c.intent, Intent::KnowledgeQuestion);
        assert_eq!(c.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_llm_classifier() {
        let classifier = LlmIntentClassifier::new(Arc::new(Reply(" Text_Translation\n")));
        let c = classifier
            .classify(&Request::new("Translate 'hello' to French"))
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::TextTranslation);
    }

    #[tokio::test]
    async fn test_llm_classifier_rejects_empty() {
        let classifier = LlmIntentClassifier::new(Arc::new(Reply("data_analysis")));
        let err = classifier.classify(&Request::new("   ")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_llm_classifier_timeout_is_unavailable() {
        let classifier = LlmIntentClassifier::new(Arc::new(Hang))
            .with_options(InvocationOptions::default().with_timeout(Duration::from_secs(5)));
        let err = classifier.classify(&Request::new("hi")).await.unwrap_err();
        match err {
            WorkflowError::ClassificationUnavailable { retryable, .. } => assert!(retryable),
            other => panic!("expected ClassificationUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stub_model_is_unavailable_not_retryable() {
        let classifier = LlmIntentClassifier::new(Arc::new(crate::llm::StubModelProvider));
        let err = classifier.classify(&Request::new("hi")).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains(&format!("{:?}", ModelErrorKind::NotConfigured)));
    }

    #[tokio::test]
    async fn test_keyword_classifier() {
        let classifier = KeywordIntentClassifier::standard();

        let c = classifier
            .classify(&Request::new("Translate 'hello' to French"))
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::TextTranslation);
        assert!(c.confidence >= 0.5);

        let c = classifier
            .classify(&Request::new("Compute the average and median of this csv"))
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::DataAnalysis);
        assert!(c.confidence >= 0.5);

        let c = classifier
            .classify(&Request::new("Hello there"))
            .await
            .unwrap();
        assert_eq!(c.intent, Intent::Unclassified);
    }

    #[tokio::test]
    async fn test_keyword_ambiguity_lowers_confidence() {
        let classifier = KeywordIntentClassifier::new()
            .add_keywords(Intent::DataAnalysis, &["report"])
            .add_keywords(Intent::KnowledgeQuestion, &["report"]);
        let c = classifier.classify(&Request::new("the report")).await.unwrap();
        assert!(c.confidence < 0.5);
    }
}
