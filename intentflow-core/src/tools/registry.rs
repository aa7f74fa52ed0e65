//! Tool Registry for tool registration, lookup, and bounded invocation
//!
//! # Example
//!
//! ```rust,ignore
//! use intentflow_core::tools::ToolRegistry;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(SummaryStatisticsTool::new()))?;
//!
//! let stats = registry.call_tool("summary_statistics", json!({"data": "x\n1\n2"})).await?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::result::{ToolError, ToolErrorKind};
use super::tool::Tool;
use crate::config::ToolsConfig;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Tool with this name already exists
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
}

/// Summary of a registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// What the tool returns
    pub returns: String,
}

impl From<&dyn Tool> for ToolSummary {
    fn from(tool: &dyn Tool) -> Self {
        let metadata = tool.metadata();
        Self {
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            returns: metadata.returns.clone(),
        }
    }
}

/// Name-indexed tool collection
///
/// Read-only once built, so one registry can serve concurrent requests.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("timeout", &self.timeout)
            .field("max_output_bytes", &self.max_output_bytes)
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry with default limits
    pub fn new() -> Self {
        Self::with_config(&ToolsConfig::default())
    }

    /// Create an empty registry with the given limits
    pub fn with_config(config: &ToolsConfig) -> Self {
        Self {
            tools: HashMap::new(),
            timeout: config.timeout,
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Register a tool
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTool` if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, RegistryError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Summaries of every registered tool, sorted by name
    pub fn summaries(&self) -> Vec<ToolSummary> {
        let mut summaries: Vec<ToolSummary> = self
            .tools
            .values()
            .map(|tool| ToolSummary::from(tool.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// Validates the arguments, bounds the call by the registry deadline and
    /// rejects outputs larger than the configured ceiling.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::not_found(name))?;

        tool.validate(&args).map_err(ToolError::validation)?;

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, tool.execute(args)).await {
            Ok(result) => result?,
            Err(_) => return Err(ToolError::timeout(self.timeout)),
        };

        let size = serde_json::to_vec(&output)
            .map_err(|e| ToolError::invalid_response(format!("unserializable output: {}", e)))?
            .len();
        if size > self.max_output_bytes {
            return Err(ToolError::new(
                ToolErrorKind::InvalidResponse,
                format!(
                    "Tool '{}' output is {} bytes, above the {} byte ceiling",
                    name, size, self.max_output_bytes
                ),
            )
            .with_code("OUTPUT_TOO_LARGE"));
        }

        tracing::debug!(
            tool = name,
            duration_ms = start.elapsed().as_millis() as u64,
            output_bytes = size,
            "Tool call completed"
        );

        Ok(output)
    }
}
