use serde::Serialize;
use tokio::sync::mpsc;

use super::pipeline::RunOutcome;
use super::PipelineError;
use crate::tools::ToolResult;

/// States of the researcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Start,
    Deciding,
    ToolCall,
    Observing,
    Done,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Start => "start",
            LoopState::Deciding => "deciding",
            LoopState::ToolCall => "tool call",
            LoopState::Observing => "observing",
            LoopState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Researcher,
    FactChecker,
    Formatter,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Researcher => "researcher",
            Stage::FactChecker => "fact-checker",
            Stage::Formatter => "formatter",
        };
        f.write_str(name)
    }
}

/// Progress of a research run, emitted in the order things happen.
#[derive(Debug, Clone)]
pub enum ResearchEvent {
    /// The research log was consulted; `matches` entries were good matches.
    CacheLookup { matches: usize, top_score: Option<f64> },
    /// The research log could not be read or written; the run continues without it.
    CacheUnavailable { reason: String },
    StageStarted(Stage),
    /// Loop state transition. `iteration` counts completed tool rounds.
    State { state: LoopState, iteration: usize },
    ToolStarted {
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    /// A tool call returned; `result` carries its content or error.
    ToolFinished {
        result: ToolResult,
        /// Evidence id assigned to a successful result.
        evidence_id: Option<String>,
    },
    /// The tool budget ran out and the loop asked for a final answer.
    IterationCapReached { iterations: usize },
    DraftReady { claims: usize, cited: usize },
    CritiqueReady { flagged: usize },
    /// Terminal event of a successful run.
    Completed(Box<RunOutcome>),
    /// Terminal event of a failed run.
    Failed(PipelineError),
}

impl ResearchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchEvent::Completed(_) | ResearchEvent::Failed(_))
    }
}

/// Where a run reports its events. A sink without a receiver drops them.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ResearchEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ResearchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ResearchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
