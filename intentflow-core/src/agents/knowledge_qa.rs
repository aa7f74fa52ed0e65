//! Knowledge question sub-workflow
//!
//! Answers from passages retrieved out of the configured knowledge store and
//! cites where they came from.

use serde_json::{Value, json};

use crate::retrieval::ScoredPassage;
use crate::workflow::{
    FailureCause, Request, SequentialExecutor, SessionContext, Step, WorkflowError,
    WorkflowResult,
};

pub const NAME: &str = "knowledge_question";

pub const RETRIEVE_PASSAGES: &str = "retrieve_passages";
pub const BUILD_PROMPT: &str = "build_prompt";
pub const INVOKE_MODEL: &str = "invoke_model";
pub const FORMAT_ANSWER: &str = "format_answer";

const SYSTEM_PROMPT: &str = "You answer questions using only the passages you are given. \
If they do not contain the answer, say that you do not know.";

/// Build the knowledge question executor
pub fn executor() -> WorkflowResult<SequentialExecutor> {
    SequentialExecutor::builder(NAME)
        .step(Step::retrieve(RETRIEVE_PASSAGES).build())
        .step(Step::transform(BUILD_PROMPT, build_prompt).build())
        .step(
            Step::model(INVOKE_MODEL, "prompt")
                .system_prompt(SYSTEM_PROMPT)
                .with_history()
                .output_key("completion")
                .build(),
        )
        .step(Step::transform(FORMAT_ANSWER, format_answer).build())
        .output_key("answer")
        .build()
}

fn passages(context: &SessionContext) -> WorkflowResult<Vec<ScoredPassage>> {
    serde_json::from_value(context.require("passages")?.clone()).map_err(|e| {
        WorkflowError::step_failed("", FailureCause::Context, format!("bad passages: {}", e))
    })
}

/// Number the passages so the answer can refer to them
fn build_prompt(request: &Request, context: &mut SessionContext) -> WorkflowResult<()> {
    let numbered = passages(context)?
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!("Passages:\n{}\n\nQuestion: {}", numbered, request.text().trim());
    context.insert("prompt", Value::String(prompt));
    Ok(())
}

fn format_answer(_request: &Request, context: &mut SessionContext) -> WorkflowResult<()> {
    let answer = context.require_str("completion")?.to_string();
    let sources: Vec<Value> = passages(context)?
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            json!({
                "source": p.source.unwrap_or_else(|| format!("passage {}", i + 1)),
                "score": p.score,
            })
        })
        .collect();

    context.insert("answer", json!({ "answer": answer, "sources": sources }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_passages() -> SessionContext {
        let mut context = SessionContext::new();
        context.insert(
            "passages",
            serde_json::to_value(vec![
                ScoredPassage::new("Rust has no garbage collector.", 1.0).with_source("faq.md"),
                ScoredPassage::new("Ownership frees memory.", 0.5),
            ])
            .unwrap(),
        );
        context
    }

    #[test]
    fn test_build_prompt_numbers_passages() {
        let mut context = context_with_passages();
        build_prompt(&Request::new(" How is memory freed? "), &mut context).unwrap();

        assert_eq!(
            context.get_str("prompt"),
            Some(
                "Passages:\n[1] Rust has no garbage collector.\n\n[2] Ownership frees memory.\n\n\
                 Question: How is memory freed?"
            )
        );
    }

    #[test]
    fn test_format_answer_cites_sources() {
        let mut context = context_with_passages();
        context.insert("completion", json!("Through ownership [2]."));
        format_answer(&Request::new("x"), &mut context).unwrap();

        let answer = context.get("answer").unwrap();
        assert_eq!(answer["answer"], "Through ownership [2].");
        assert_eq!(answer["sources"][0]["source"], "faq.md");
        assert_eq!(answer["sources"][1]["source"], "passage 2");
    }

    #[test]
    fn test_format_answer_needs_completion() {
        let mut context = context_with_passages();
        assert!(format_answer(&Request::new("x"), &mut context).is_err());
    }
}
