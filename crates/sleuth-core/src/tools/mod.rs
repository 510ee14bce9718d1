//! Tool registry: the closed set of capabilities the researcher may call.
//!
//! Every tool declares a name, a purpose and a [`ParamSchema`]. The
//! registry validates arguments against that schema, enforces a per-call
//! timeout and is the only list of tools the research loop offers the model.

pub mod builtin;
mod error;
mod schema;

pub use error::{RegistryError, ToolError};
pub use schema::{Arguments, Param, ParamKind, ParamSchema};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_TOOL_TIMEOUT_SECS;
use crate::llm::{ToolCall, ToolDefinition};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// What the tool is for, as shown to the model.
    fn description(&self) -> &str;

    /// Declared parameters.
    fn schema(&self) -> ParamSchema;

    /// Execute with arguments that already passed schema validation.
    async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError>;
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Output of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolContent {
    Text(String),
    Records(Vec<SearchRecord>),
}

impl ToolContent {
    /// Text form fed back to the model.
    pub fn render(&self) -> String {
        match self {
            ToolContent::Text(text) => text.clone(),
            ToolContent::Records(records) => records
                .iter()
                .enumerate()
                .map(|(i, r)| format!("[{}] {}\n    URL: {}\n    {}", i + 1, r.title, r.url, r.snippet))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// URLs carried by structured records.
    pub fn urls(&self) -> Vec<&str> {
        match self {
            ToolContent::Text(_) => Vec::new(),
            ToolContent::Records(records) => records.iter().map(|r| r.url.as_str()).collect(),
        }
    }
}

/// Outcome of dispatching one [`ToolCall`], successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub content: ToolContent,
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The observation appended to the conversation, truncated to `max_chars`.
    pub fn observation(&self, max_chars: usize) -> String {
        let text = match &self.error {
            Some(err) => format!("ERROR ({}): {}", err.kind(), err),
            None => self.content.render(),
        };
        truncate_chars(&text, max_chars)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// The tool registry holds all registered tools and handles execution.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RegistryError::InvalidName(name));
        }
        if self.get(&name).is_some() {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        debug!(tool = %name, "Registering tool");
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tool descriptors in registration order, for the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema().to_json_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and execute a tool by name, applying the timeout.
    pub async fn invoke(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<ToolContent, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::invalid(name, format!("unknown tool '{name}'")))?;

        let validated = tool.schema().validate(name, args)?;

        info!(tool = %name, args = %validated.as_value(), "Executing tool");

        match tokio::time::timeout(self.timeout, tool.execute(validated)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Execute a model-requested call, folding any error into the result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let outcome = self.invoke(&call.name, &call.arguments).await;
        let (content, error) = match outcome {
            Ok(content) => (content, None),
            Err(err) => {
                warn!(tool = %call.name, error = %err, "Tool call failed");
                (ToolContent::Text(String::new()), Some(err))
            }
        };
        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            content,
            error,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
