//! Tool system for workflow steps
//!
//! Tools are external capabilities invoked by name with structured JSON
//! arguments. Executors never call a tool directly; they go through
//! [`ToolRegistry::call_tool`], which:
//! - rejects unknown names with [`ToolErrorKind::NotFound`]
//! - validates arguments before execution
//! - bounds every call by a deadline
//! - rejects outputs above the configured size ceiling
//!
//! # Example
//!
//! ```rust,no_run
//! use intentflow_core::tools::{SummaryStatisticsTool, ToolRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ToolRegistry::new().with_tool(Arc::new(SummaryStatisticsTool::new()))?;
//! let stats = registry
//!     .call_tool("summary_statistics", json!({"data": "price\n3\n5"}))
//!     .await?;
//! assert_eq!(stats["mean"], 4.0);
//! # Ok(())
//! # }
//! ```

mod builtin;
mod registry;
mod result;
mod tool;

pub use builtin::{ModelRewriteTool, SummaryStatisticsTool};
pub use registry::{RegistryError, ToolRegistry, ToolSummary};
pub use result::{ToolError, ToolErrorKind, ValidationError};
pub use tool::{Tool, ToolMetadata, require_strings};
