//! Intents and classification results

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of task categories a request can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Statistics or analysis over supplied data
    DataAnalysis,
    /// Translate text, optionally adjusting its tone
    TextTranslation,
    /// Answer a question grounded in a knowledge store
    KnowledgeQuestion,
    /// No routable intent could be determined
    Unclassified,
}

impl Intent {
    /// Intents that have an executor
    pub const ROUTABLE: [Intent; 3] = [
        Intent::DataAnalysis,
        Intent::TextTranslation,
        Intent::KnowledgeQuestion,
    ];

    /// snake_case label
    pub fn label(&self) -> &'static str {
        match self {
            Intent::DataAnalysis => "data_analysis",
            Intent::TextTranslation => "text_translation",
            Intent::KnowledgeQuestion => "knowledge_question",
            Intent::Unclassified => "unclassified",
        }
    }

    /// One-line description used in classification prompts and listings
    pub fn description(&self) -> &'static str {
        match self {
            Intent::DataAnalysis => "compute statistics or analyse numeric data supplied by the user",
            Intent::TextTranslation => "translate text into another language or change its tone",
            Intent::KnowledgeQuestion => "answer a question using the document knowledge base",
            Intent::Unclassified => "none of the above",
        }
    }

    pub fn is_routable(&self) -> bool {
        !matches!(self, Intent::Unclassified)
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Intent::DataAnalysis => &["data_analysis", "analysis", "data", "dataanalysis"],
            Intent::TextTranslation => &["text_translation", "translation", "translate", "texttranslation"],
            Intent::KnowledgeQuestion => &["knowledge_question", "question", "knowledge", "qa"],
            Intent::Unclassified => &["unclassified", "unknown", "other", "none"],
        }
    }

    /// Parse a label, case-insensitive and tolerant of quotes, punctuation
    /// and space/hyphen separators. Accepts the aliases listed per intent.
    pub fn from_label(label: &str) -> Option<Intent> {
        let normalized = normalize_label(label);
        [
            Intent::DataAnalysis,
            Intent::TextTranslation,
            Intent::KnowledgeQuestion,
            Intent::Unclassified,
        ]
        .into_iter()
        .find(|intent| intent.aliases().contains(&normalized.as_str()))
    }

    /// Routable intents whose full label appears as a whole word in `text`.
    /// Aliases only count for an exact [`Intent::from_label`] match.
    pub(crate) fn mentioned_in(text: &str) -> Vec<Intent> {
        let lowered = text.to_lowercase().replace('-', "_");
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|token| !token.is_empty())
            .collect();
        Intent::ROUTABLE
            .into_iter()
            .filter(|intent| tokens.contains(&intent.label()))
            .collect()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Classification result with intent and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The resolved intent
    pub intent: Intent,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
    /// Raw classifier output, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_label: Option<String>,
}

impl Classification {
    /// Create a new classification
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            raw_label: None,
        }
    }

    /// No routable intent
    pub fn unclassified() -> Self {
        Self::new(Intent::Unclassified, 0.0)
    }

    /// Keep the raw classifier output
    pub fn with_raw_label(mut self, raw: impl Into<String>) -> Self {
        self.raw_label = Some(raw.into());
        self
    }

    /// Resolve to `Unclassified` when confidence is below `min_confidence`
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        if self.confidence.is_nan() || self.confidence < min_confidence {
            self.intent = Intent::Unclassified;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for intent in Intent::ROUTABLE {
            assert_eq!(Intent::from_label(intent.label()), Some(intent));
        }
        assert_eq!(Intent::from_label("unclassified"), Some(Intent::Unclassified));
    }

    #[test]
    fn test_tolerant_parsing() {
        assert_eq!(Intent::from_label("  Text Translation. "), Some(Intent::TextTranslation));
        assert_eq!(Intent::from_label("\"DATA-ANALYSIS\""), Some(Intent::DataAnalysis));
        assert_eq!(Intent::from_label("question"), Some(Intent::KnowledgeQuestion));
        assert_eq!(Intent::from_label("poetry"), None);
    }

    #[test]
    fn test_mentioned_in() {
        assert_eq!(
            Intent::mentioned_in("I think this is text_translation."),
            vec![Intent::TextTranslation]
        );
        assert!(Intent::mentioned_in("no idea").is_empty());
        assert!(Intent::mentioned_in("I would need more data to decide.").is_empty());
        assert!(Intent::mentioned_in("pre_data_analysis_step").is_empty());
    }

    #[test]
    fn test_serde_labels() {
        let json = serde_json::to_string(&Intent::KnowledgeQuestion).unwrap();
        assert_eq!(json, "\"knowledge_question\"");
    }

    #[test]
    fn test_min_confidence_policy() {
        let c = Classification::new(Intent::DataAnalysis, 0.4).with_min_confidence(0.5);
        assert_eq!(c.intent, Intent::Unclassified);
        assert_eq!(c.confidence, 0.4);

        let c = Classification::new(Intent::DataAnalysis, 0.7).with_min_confidence(0.5);
        assert_eq!(c.intent, Intent::DataAnalysis);
    }

    #[test]
    fn test_nan_confidence_is_unclassified() {
        let c = Classification::new(Intent::DataAnalysis, f32::NAN).with_min_confidence(0.5);
        assert_eq!(c.intent, Intent::Unclassified);
    }

    #[test]
    fn test_classification_clamping() {
        assert_eq!(Classification::new(Intent::DataAnalysis, 1.5).confidence, 1.0);
        assert_eq!(Classification::new(Intent::DataAnalysis, -0.5).confidence, 0.0);
    }
}
