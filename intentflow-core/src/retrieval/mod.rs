//! Knowledge retrieval interface
//!
//! Document ingestion lives outside this crate. Knowledge-grounded executors
//! only need `retrieve(query, top_k)` over whatever store holds the passages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// A passage returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    /// Passage text
    pub text: String,

    /// Similarity score, higher is closer
    pub score: f64,

    /// Where the passage came from (file name, URL, page)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ScoredPassage {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Errors raised by a knowledge store
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The store could not be reached (retryable)
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),

    /// The query was rejected
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetrievalError::Unavailable(_))
    }
}

/// Similarity search over a knowledge store
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `top_k` passages ordered by descending score
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, RetrievalError>;
}

/// Term-overlap retriever over passages supplied up front
///
/// The score is the fraction of query terms found in the passage. Passages
/// with no overlapping term are never returned.
pub struct InMemoryRetriever {
    passages: RwLock<Vec<(String, Option<String>)>>,
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Build a retriever from `(text, source)` pairs
    pub fn from_passages<I, T>(passages: I) -> Self
    where
        I: IntoIterator<Item = (T, Option<String>)>,
        T: Into<String>,
    {
        Self {
            passages: RwLock::new(
                passages
                    .into_iter()
                    .map(|(text, source)| (text.into(), source))
                    .collect(),
            ),
        }
    }

    /// Add one passage
    pub async fn add(&self, text: impl Into<String>, source: Option<String>) {
        self.passages.write().await.push((text.into(), source));
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }

    fn score(content: &str, terms: &[String]) -> f64 {
        let content = content.to_lowercase();
        let matches = terms.iter().filter(|t| content.contains(t.as_str())).count();
        matches as f64 / terms.len() as f64
    }
}

/// Lowercased query terms, stripped of punctuation and very short words
fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| t.chars().count() > 2)
        .collect()
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "query has no searchable terms".to_string(),
            ));
        }

        let passages = self.passages.read().await;
        let mut scored: Vec<ScoredPassage> = passages
            .iter()
            .map(|(text, source)| ScoredPassage {
                text: text.clone(),
                score: Self::score(text, &terms),
                source: source.clone(),
            })
            .filter(|p| p.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever() -> InMemoryRetriever {
        InMemoryRetriever::from_passages([
            ("The sky is blue on clear days", Some("weather.pdf".to_string())),
            ("The grass is green", None),
            ("Blue whales are the largest animals", Some("animals.pdf".to_string())),
        ])
    }

    #[tokio::test]
    async fn test_ranked_by_overlap() {
        let results = retriever().retrieve("Why is the sky blue?", 5).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].text.contains("sky"));
        assert_eq!(results[0].source.as_deref(), Some("weather.pdf"));
        assert!(results[1].text.contains("whales"));
        assert!(results[0].score > results[1].score);
        assert!(results[1].score > results[2].score);
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let results = retriever().retrieve("blue", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let results = retriever().retrieve("quantum chromodynamics", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let err = retriever().retrieve("?? a", 3).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_add() {
        let retriever = InMemoryRetriever::new();
        assert!(retriever.is_empty().await);
        retriever.add("Rust has no garbage collector", None).await;
        assert_eq!(retriever.len().await, 1);
    }
}
