//! Built-in tools wired up by the CLI
//!
//! `summary_statistics` is pure computation. `translate_text` and
//! `adjust_sentiment` delegate the rewrite to a [`ModelProvider`].

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::result::{ToolError, ToolErrorKind, ValidationError};
use super::tool::{Tool, ToolMetadata, require_strings};
use crate::llm::{InvocationOptions, ModelProvider, ModelRequest, invoke_with_deadline};

/// Count, sum, mean, min, max and median of one numeric column.
///
/// `data` is either inline CSV (header row first) or a JSON array of numbers
/// or objects. `column` picks the column by name; without it the first column
/// holding a number is used. CSV fields may be double-quoted; non-finite
/// cells (`NaN`, `inf`) are skipped like any other non-numeric cell.
pub struct SummaryStatisticsTool {
    metadata: ToolMetadata,
}

impl SummaryStatisticsTool {
    pub const NAME: &'static str = "summary_statistics";

    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new(
                Self::NAME,
                "Computes summary statistics for a numeric column of inline CSV or a JSON array",
            )
            .with_returns("{column, count, sum, mean, min, max, median}"),
        }
    }
}

impl Default for SummaryStatisticsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SummaryStatisticsTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "data": { "description": "Inline CSV text or a JSON array" },
                "column": { "type": "string" }
            },
            "required": ["data"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), Vec<ValidationError>> {
        match args.get("data") {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
            Some(Value::Array(items)) if !items.is_empty() => Ok(()),
            _ => Err(vec![ValidationError::new(
                "data",
                "inline CSV text or a non-empty JSON array is required",
            )]),
        }
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let column = args.get("column").and_then(Value::as_str);
        let (name, values) = match &args["data"] {
            Value::String(csv) => csv_column(csv, column)?,
            Value::Array(items) => json_column(items, column)?,
            _ => return Err(ToolError::new(ToolErrorKind::Validation, "unsupported data shape")),
        };
        Ok(summarize(&name, values))
    }
}

fn csv_column(csv: &str, column: Option<&str>) -> Result<(String, Vec<f64>), ToolError> {
    let mut lines = csv.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next().map(split_csv_line).unwrap_or_default();
    let rows: Vec<Vec<String>> = lines.map(split_csv_line).collect();

    let index = match column {
        Some(name) => header.iter().position(|h| h.eq_ignore_ascii_case(name)).ok_or_else(|| {
            ToolError::new(ToolErrorKind::Validation, format!("no column named '{}'", name))
        })?,
        None => (0..header.len())
            .find(|&i| {
                rows.iter()
                    .any(|row| row.get(i).and_then(|cell| parse_number(cell)).is_some())
            })
            .ok_or_else(|| {
                ToolError::new(ToolErrorKind::Validation, "no numeric column in data")
            })?,
    };

    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(index).and_then(|cell| parse_number(cell)))
        .collect();

    Ok((header[index].clone(), values))
}

/// Split one CSV record. Fields may be double-quoted; `""` inside quotes is
/// a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Finite numbers only; `NaN` and `inf` cells are treated as missing
fn parse_number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn json_column(items: &[Value], column: Option<&str>) -> Result<(String, Vec<f64>), ToolError> {
    if items.iter().all(Value::is_number) {
        let values = items.iter().filter_map(Value::as_f64).collect();
        return Ok((column.unwrap_or("value").to_string(), values));
    }

    let name = match column {
        Some(name) => name.to_string(),
        None => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|row| row.iter())
            .find(|(_, v)| v.is_number())
            .map(|(k, _)| k.clone())
            .ok_or_else(|| {
                ToolError::new(ToolErrorKind::Validation, "no numeric field in data")
            })?,
    };

    let values = items
        .iter()
        .filter_map(|row| row.get(&name).and_then(Value::as_f64))
        .collect();
    Ok((name, values))
}

fn summarize(column: &str, mut values: Vec<f64>) -> Value {
    if values.is_empty() {
        return json!({ "column": column, "count": 0 });
    }

    values.sort_by(f64::total_cmp);
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let median = if count % 2 == 0 {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    } else {
        values[count / 2]
    };

    json!({
        "column": column,
        "count": count,
        "sum": sum,
        "mean": sum / count as f64,
        "min": values[0],
        "max": values[count - 1],
        "median": median,
    })
}

/// Which rewrite a [`ModelRewriteTool`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    Translate,
    Sentiment,
}

impl Rewrite {
    fn target_field(&self) -> &'static str {
        match self {
            Rewrite::Translate => "target_language",
            Rewrite::Sentiment => "sentiment",
        }
    }

    fn instruction(&self, target: &str) -> String {
        match self {
            Rewrite::Translate => format!(
                "Translate the user's text into {}. Reply with the translation only.",
                target
            ),
            Rewrite::Sentiment => format!(
                "Rewrite the user's text so its tone is {}. Keep the meaning and the language. \
                 Reply with the rewritten text only.",
                target
            ),
        }
    }
}

/// A tool that asks a model to rewrite `text`
///
/// Returns `{"text": <rewritten>, <target_field>: <target>}`.
pub struct ModelRewriteTool {
    metadata: ToolMetadata,
    rewrite: Rewrite,
    model: Arc<dyn ModelProvider>,
    options: InvocationOptions,
}

impl ModelRewriteTool {
    pub const TRANSLATE: &'static str = "translate_text";
    pub const ADJUST_SENTIMENT: &'static str = "adjust_sentiment";

    /// `translate_text`: args `{text, target_language}`
    pub fn translator(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            metadata: ToolMetadata::new(Self::TRANSLATE, "Translates text into a target language")
                .with_returns("{text, target_language}"),
            rewrite: Rewrite::Translate,
            model,
            options: InvocationOptions::default(),
        }
    }

    /// `adjust_sentiment`: args `{text, sentiment}`
    pub fn sentiment_adjuster(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                Self::ADJUST_SENTIMENT,
                "Rewrites text with a different tone (e.g. positive, formal)",
            )
            .with_returns("{text, sentiment}"),
            rewrite: Rewrite::Sentiment,
            model,
            options: InvocationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Tool for ModelRewriteTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn schema(&self) -> Value {
        let field = self.rewrite.target_field();
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                field: { "type": "string" }
            },
            "required": ["text", field]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), Vec<ValidationError>> {
        require_strings(args, &["text", self.rewrite.target_field()])
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let field = self.rewrite.target_field();
        let text = args["text"].as_str().unwrap_or_default();
        let target = args[field].as_str().unwrap_or_default();

        let request = ModelRequest::with_system_prompt(self.rewrite.instruction(target), text)
            .options(self.options.clone());
        let response = invoke_with_deadline(self.model.as_ref(), &request).await?;

        let rewritten = response.content.trim();
        if rewritten.is_empty() {
            return Err(ToolError::invalid_response("model returned an empty rewrite"));
        }

        Ok(json!({ "text": rewritten, field: target }))
    }
}
