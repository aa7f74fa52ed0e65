//! Text translation sub-workflow
//!
//! The model extracts the text, target language and an optional tone from
//! the request. `translate_text` translates. `adjust_sentiment` only runs
//! when a tone was asked for.

use serde_json::{Value, json};

use crate::tools::ModelRewriteTool;
use crate::workflow::{Request, SequentialExecutor, SessionContext, Step, WorkflowResult};

use super::field;

pub const NAME: &str = "text_translation";

pub const BUILD_PROMPT: &str = "build_prompt";
pub const EXTRACT_REQUEST: &str = "extract_request";
pub const TRANSLATE_TEXT: &str = "translate_text";
pub const ADJUST_SENTIMENT: &str = "adjust_sentiment";
pub const FORMAT_TRANSLATION: &str = "format_translation";

const EXTRACT_TEMPLATE: &str = "Extract the translation task from the request below.\n\
Request: {{text}}\n\n\
Reply with a JSON object {\"text\": <text to translate>, \
\"target_language\": <language to translate into>, \
\"sentiment\": <requested tone, or null>}.";

/// Build the text translation executor
pub fn executor() -> WorkflowResult<SequentialExecutor> {
    SequentialExecutor::builder(NAME)
        .step(Step::prompt(BUILD_PROMPT, EXTRACT_TEMPLATE).build())
        .step(
            Step::model(EXTRACT_REQUEST, "prompt")
                .system_prompt("You extract structured fields from requests. Answer with JSON only.")
                .with_history()
                .parse_json()
                .output_key("task")
                .build(),
        )
        .step(
            Step::tool(TRANSLATE_TEXT, ModelRewriteTool::TRANSLATE, |_, ctx| {
                Ok(json!({
                    "text": field(ctx, "task", "text")?,
                    "target_language": field(ctx, "task", "target_language")?,
                }))
            })
            .validate_output(has_text)
            .output_key("translation")
            .build(),
        )
        .step(
            Step::tool(ADJUST_SENTIMENT, ModelRewriteTool::ADJUST_SENTIMENT, |_, ctx| {
                Ok(json!({
                    "text": field(ctx, "translation", "text")?,
                    "sentiment": field(ctx, "task", "sentiment")?,
                }))
            })
            .when(|_, ctx| field(ctx, "task", "sentiment").is_ok())
            .validate_output(has_text)
            .output_key("adjusted")
            .build(),
        )
        .step(Step::transform(FORMAT_TRANSLATION, format_translation).build())
        .output_key("answer")
        .build()
}

fn has_text(output: &Value) -> Result<(), String> {
    match output.get("text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err("missing 'text'".to_string()),
    }
}

/// The adjusted text when a tone was applied, otherwise the translation
fn format_translation(_request: &Request, context: &mut SessionContext) -> WorkflowResult<()> {
    let key = if context.contains("adjusted") {
        "adjusted"
    } else {
        "translation"
    };
    let text = field(context, key, "text")?.to_string();
    context.insert("answer", Value::String(text));
    Ok(())
}
