//! Researcher, fact-checker and formatter wired to the research log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::agent::ResearchAgent;
use super::citations::Draft;
use super::error::SetupError;
use super::events::{EventSink, ResearchEvent, Stage};
use super::fact_check::{Critique, FactChecker};
use super::formatter::Formatter;
use super::report::Report;
use super::PipelineError;
use crate::config::{Config, DEFAULT_TOP_K};
use crate::llm::{Provider, LLM};
use crate::research_log::{LogEntry, LogMatch, ResearchLog};
use crate::tools::{builtin::register_builtin, ToolRegistry};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub draft: Draft,
    pub critique: Critique,
    /// Log entries that were handed to the researcher as context.
    pub cache_matches: usize,
    pub elapsed: Duration,
    /// The entry written to the research log, if the write succeeded.
    pub logged: Option<LogEntry>,
}

/// The three-stage research pipeline.
///
/// Cheap to clone; a clone shares the backend, tools and log.
#[derive(Clone)]
pub struct ResearchPipeline {
    agent: Arc<ResearchAgent>,
    fact_checker: Arc<FactChecker>,
    formatter: Arc<Formatter>,
    log: Option<ResearchLog>,
    top_k: usize,
    quick: bool,
}

impl ResearchPipeline {
    /// Pipeline with default limits, a model-backed fact-checker and no log.
    pub fn new(llm: Arc<dyn LLM>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            agent: Arc::new(ResearchAgent::new(llm.clone(), tools)),
            fact_checker: Arc::new(FactChecker::new(llm)),
            formatter: Arc::new(Formatter::new()),
            log: None,
            top_k: DEFAULT_TOP_K,
            quick: false,
        }
    }

    /// Builds the configured provider and built-in tools.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let llm: Arc<dyn LLM> = Arc::from(Provider::build_from_config(&config.llm)?);

        let mut registry = ToolRegistry::new().with_timeout(config.research.tool_timeout());
        register_builtin(&mut registry, &config.tools)?;

        Ok(Self::assemble(llm, Arc::new(registry), config))
    }

    /// Like [`ResearchPipeline::from_config`], with a caller-supplied backend and tools.
    pub fn assemble(llm: Arc<dyn LLM>, tools: Arc<ToolRegistry>, config: &Config) -> Self {
        let agent = ResearchAgent::new(llm.clone(), tools.clone()).with_config(&config.research);

        let mut fact_checker = FactChecker::new(llm);
        if config.research.verify_with_tools {
            fact_checker =
                fact_checker.with_verification(tools, config.research.corroboration_threshold);
        }

        let log = if config.log.disabled {
            None
        } else {
            Some(ResearchLog::from_config(&config.log))
        };

        Self {
            agent: Arc::new(agent),
            fact_checker: Arc::new(fact_checker),
            formatter: Arc::new(Formatter::from_config(&config.research)),
            log,
            top_k: config.log.top_k,
            quick: false,
        }
    }

    pub fn with_agent(mut self, agent: ResearchAgent) -> Self {
        self.agent = Arc::new(agent);
        self
    }

    pub fn with_fact_checker(mut self, fact_checker: FactChecker) -> Self {
        self.fact_checker = Arc::new(fact_checker);
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn with_log(mut self, log: ResearchLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn without_log(mut self) -> Self {
        self.log = None;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Quick mode skips the model-backed fact-check; only citation presence is judged.
    pub fn quick(mut self, quick: bool) -> Self {
        self.quick = quick;
        self
    }

    pub fn log(&self) -> Option<&ResearchLog> {
        self.log.as_ref()
    }

    /// Run to completion and return the outcome.
    ///
    /// Drains [`ResearchPipeline::stream`], so blocking and streaming runs
    /// share one code path.
    pub async fn run(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let mut events = self.stream(query, cancel.clone());
        while let Some(event) = events.next().await {
            match event {
                ResearchEvent::Completed(outcome) => return Ok(*outcome),
                ResearchEvent::Failed(err) => return Err(err),
                other => debug!(?other, "Research event"),
            }
        }
        Err(PipelineError::BackendUnavailable(
            "research task ended without a result".to_string(),
        ))
    }

    /// Run to completion and return only the report.
    pub async fn research(&self, query: &str) -> Result<Report, PipelineError> {
        let cancel = CancellationToken::new();
        self.run(query, &cancel).await.map(|outcome| outcome.report)
    }

    /// Start a run in the background and stream its events.
    ///
    /// The stream always ends with exactly one `Completed` or `Failed` event.
    pub fn stream(
        &self,
        query: impl Into<String>,
        cancel: CancellationToken,
    ) -> UnboundedReceiverStream<ResearchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = self.clone();
        let query = query.into();

        tokio::spawn(async move {
            let receiver_gone = tx.clone();
            let events = EventSink::new(tx);
            // Nobody is listening once the receiver is dropped; stop before the log is touched.
            let result = tokio::select! {
                result = pipeline.execute(&query, &events, &cancel) => result,
                _ = receiver_gone.closed() => {
                    info!(query = %query, "Research stream dropped, abandoning run");
                    return;
                }
            };
            let terminal = match result {
                Ok(outcome) => ResearchEvent::Completed(Box::new(outcome)),
                Err(err) => {
                    warn!(error = %err, "Research run failed");
                    ResearchEvent::Failed(err)
                }
            };
            events.emit(terminal);
        });

        UnboundedReceiverStream::new(rx)
    }

    async fn execute(
        &self,
        query: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        info!(query, quick = self.quick, "Starting research run");

        ensure_live(cancel)?;
        let prior = self.consult_log(query, events).await;

        ensure_live(cancel)?;
        events.emit(ResearchEvent::StageStarted(Stage::Researcher));
        let mut draft = self.agent.research(query, &prior, events, cancel).await?;

        ensure_live(cancel)?;
        events.emit(ResearchEvent::StageStarted(Stage::FactChecker));
        let critique = if self.quick {
            FactChecker::baseline().check(&mut draft, cancel).await?
        } else {
            self.fact_checker.check(&mut draft, cancel).await?
        };
        events.emit(ResearchEvent::CritiqueReady {
            flagged: critique.flagged(),
        });

        ensure_live(cancel)?;
        events.emit(ResearchEvent::StageStarted(Stage::Formatter));
        let report = self.formatter.format(&draft, &critique);
        let elapsed = started.elapsed();

        // A cancelled run must not reach the log.
        ensure_live(cancel)?;
        let logged = self.record(query, &report, elapsed, events).await;

        info!(
            statements = report.statements.len(),
            sources = report.sources.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Research run finished"
        );

        Ok(RunOutcome {
            report,
            draft,
            critique,
            cache_matches: prior.len(),
            elapsed,
            logged,
        })
    }

    /// Relevant log entries, or none when the log cannot be read.
    async fn consult_log(&self, query: &str, events: &EventSink) -> Vec<LogMatch> {
        let Some(log) = self.log.clone() else {
            return Vec::new();
        };
        let owned = query.to_string();
        let top_k = self.top_k;

        let lookup = tokio::task::spawn_blocking(move || log.find_relevant(&owned, top_k)).await;
        let result = match lookup {
            Ok(result) => result.map_err(PipelineError::from),
            Err(err) => Err(PipelineError::CacheUnavailable(err.to_string())),
        };

        match result {
            Ok(matches) => {
                events.emit(ResearchEvent::CacheLookup {
                    matches: matches.len(),
                    top_score: matches.first().map(|m| m.score),
                });
                matches
            }
            Err(err) => {
                warn!(error = %err, "Continuing without research log");
                events.emit(ResearchEvent::CacheUnavailable {
                    reason: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Append the finished report to the log. Failures only warn.
    ///
    /// A report without statements is no answer and is never logged.
    async fn record(
        &self,
        query: &str,
        report: &Report,
        elapsed: Duration,
        events: &EventSink,
    ) -> Option<LogEntry> {
        let log = self.log.clone()?;
        if report.statements.is_empty() {
            warn!(query, "Run produced no answer, not logging it");
            return None;
        }
        let entry = LogEntry::new(query, report.to_markdown(), elapsed);

        let written = tokio::task::spawn_blocking(move || log.append(&entry)).await;
        let result = match written {
            Ok(result) => result.map_err(PipelineError::from),
            Err(err) => Err(PipelineError::CacheUnavailable(err.to_string())),
        };

        match result {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "Could not append to research log");
                events.emit(ResearchEvent::CacheUnavailable {
                    reason: err.to_string(),
                });
                None
            }
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
