use thiserror::Error;

use crate::llm::LLMError;
use crate::research_log::LogError;
use crate::tools::RegistryError;

/// Errors that end (or degrade) a research run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("No answer after {iterations} tool rounds")]
    IterationCapExceeded { iterations: usize },

    #[error("Research log unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Research cancelled")]
    Cancelled,
}

impl From<LLMError> for PipelineError {
    fn from(err: LLMError) -> Self {
        PipelineError::BackendUnavailable(err.to_string())
    }
}

impl From<LogError> for PipelineError {
    fn from(err: LogError) -> Self {
        PipelineError::CacheUnavailable(err.to_string())
    }
}

/// Errors raised while assembling a pipeline from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("LLM setup failed: {0}")]
    LLM(#[from] LLMError),

    #[error("Tool registration failed: {0}")]
    Registry(#[from] RegistryError),
}
