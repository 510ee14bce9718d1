use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the research log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock research log {0}")]
    Lock(PathBuf),

    #[error("Failed to serialize log entry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unreadable JSON array research log {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Research log {0} is a JSON array written by the older research bot; set log.path to a new file to keep logging")]
    ArrayFormat(PathBuf),
}

impl LogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}
