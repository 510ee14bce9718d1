pub mod config;
pub mod llm;
pub mod research;
pub mod research_log;
pub mod tools;

pub use config::{Config, ConfigError};
pub use research::{PipelineError, Report, ResearchEvent, ResearchPipeline, RunOutcome};
pub use research_log::{LogEntry, ResearchLog};
