//! Data analysis sub-workflow
//!
//! The model picks the column (and lifts inline data out of the request when
//! no `data` metadata was attached), the `summary_statistics` tool computes,
//! and a transform writes the report.

use serde_json::{Value, json};

use crate::tools::SummaryStatisticsTool;
use crate::workflow::{
    FailureCause, Request, SequentialExecutor, SessionContext, Step, WorkflowError,
    WorkflowResult,
};

pub const NAME: &str = "data_analysis";

pub const BUILD_PROMPT: &str = "build_prompt";
pub const PLAN_ANALYSIS: &str = "plan_analysis";
pub const RUN_ANALYSIS: &str = "run_analysis";
pub const SUMMARIZE: &str = "summarize";

const PLAN_TEMPLATE: &str = "Plan a summary-statistics analysis for the request below.\n\
Request: {{text}}\n\n\
Reply with a JSON object {\"column\": <column name or null>, \
\"data\": <inline CSV copied from the request, or null>}.";

/// Build the data analysis executor
pub fn executor() -> WorkflowResult<SequentialExecutor> {
    SequentialExecutor::builder(NAME)
        .step(
            Step::prompt(BUILD_PROMPT, PLAN_TEMPLATE)
                .description("Ask which column to summarize")
                .build(),
        )
        .step(
            Step::model(PLAN_ANALYSIS, "prompt")
                .system_prompt("You are a data analyst. Answer with JSON only.")
                .parse_json()
                .output_key("plan")
                .build(),
        )
        .step(
            Step::tool(RUN_ANALYSIS, SummaryStatisticsTool::NAME, analysis_args)
                .validate_output(check_statistics)
                .output_key("statistics")
                .build(),
        )
        .step(Step::transform(SUMMARIZE, summarize).build())
        .output_key("report")
        .build()
}

/// Tool arguments: attached data wins over data the model found in the text
fn analysis_args(request: &Request, context: &SessionContext) -> WorkflowResult<Value> {
    let plan = context.require("plan")?;
    let data = request
        .metadata()
        .get("data")
        .filter(|d| !d.is_null())
        .or_else(|| plan.get("data").filter(|d| d.is_string() || d.is_array()))
        .cloned()
        .ok_or_else(|| {
            WorkflowError::step_failed(
                RUN_ANALYSIS,
                FailureCause::Context,
                "no data to analyse; attach it as `data` metadata or include CSV in the request",
            )
        })?;

    let mut args = json!({ "data": data });
    if let Some(column) = plan.get("column").and_then(Value::as_str) {
        args["column"] = json!(column);
    }
    Ok(args)
}

fn check_statistics(output: &Value) -> Result<(), String> {
    match output.get("count").and_then(Value::as_u64) {
        Some(0) => return Err("no numeric values in the selected column".to_string()),
        Some(_) => {}
        None => return Err("missing 'count'".to_string()),
    }
    for key in ["mean", "min", "max", "median"] {
        if !output.get(key).is_some_and(Value::is_number) {
            return Err(format!("missing '{}'", key));
        }
    }
    Ok(())
}

fn summarize(_request: &Request, context: &mut SessionContext) -> WorkflowResult<()> {
    let stats = context.require("statistics")?.clone();
    let number = |key: &str| stats.get(key).and_then(Value::as_f64).unwrap_or_default();
    let column = stats.get("column").and_then(Value::as_str).unwrap_or("value");

    let summary = format!(
        "{} over {} values: mean {:.2}, median {:.2}, min {}, max {}",
        column,
        number("count"),
        number("mean"),
        number("median"),
        number("min"),
        number("max"),
    );

    context.insert("report", json!({ "summary": summary, "statistics": stats }));
    Ok(())
}
