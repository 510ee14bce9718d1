mod agent;
mod citations;
mod error;
mod events;
mod evidence;
mod fact_check;
mod formatter;
mod pipeline;
pub mod prompts;
mod report;

pub use agent::ResearchAgent;
pub use citations::{parse_claims, split_sentences, Claim, Draft};
pub use error::{PipelineError, SetupError};
pub use events::{EventSink, LoopState, ResearchEvent, Stage};
pub use evidence::{Evidence, EvidenceItem, EvidenceOrigin, Link};
pub use fact_check::{Critique, FactChecker, Flag, Verdict};
pub use formatter::Formatter;
pub use pipeline::{ResearchPipeline, RunOutcome};
pub use report::{Caveat, Report, Source, Statement};
