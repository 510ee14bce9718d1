use std::time::Duration;

use thiserror::Error;

/// Errors produced while invoking a tool.
///
/// None of these are fatal to a research run: the loop feeds them back to
/// the model as an observation so it can pick another tool or move on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Tool '{name}' failed upstream: {message}")]
    Upstream { name: String, message: String },
}

impl ToolError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(name: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Upstream {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly kind, shown to the model and in events.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Upstream { .. } => "upstream",
        }
    }
}

/// Errors raised while building a registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Tool name '{0}' must be non-empty and use only [a-zA-Z0-9_-]")]
    InvalidName(String),
}
