//! Terminal output: progress lines, reports and history.

use std::io::IsTerminal;
use std::time::Duration;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use regex::{Captures, Regex};
use sleuth_core::research::{LoopState, ResearchEvent};
use sleuth_core::{LogEntry, RunOutcome};

const RULE_WIDTH: usize = 50;

const LINK_PATTERN: &str = r"\[([^\]]*)\]\(([^)]+)\)";

/// Rewrite markdown links `[label](url)` as OSC 8 terminal hyperlinks.
pub fn hyperlinks(text: &str) -> String {
    let Ok(link_re) = Regex::new(LINK_PATTERN) else {
        return text.to_string();
    };
    link_re
        .replace_all(text, |caps: &Captures| {
            format!("\x1b]8;;{}\x1b\\[{}]\x1b]8;;\x1b\\", &caps[2], &caps[1])
        })
        .into_owned()
}

/// Hyperlinks only when stdout is an interactive terminal.
fn for_stdout(text: &str) -> String {
    if std::io::stdout().is_terminal() {
        hyperlinks(text)
    } else {
        text.to_string()
    }
}

/// One-line description of a progress event, if it is worth showing.
pub fn describe(event: &ResearchEvent) -> Option<String> {
    match event {
        ResearchEvent::CacheLookup { matches: 0, .. } => Some("No related research in the log".to_string()),
        ResearchEvent::CacheLookup { matches, top_score } => Some(format!(
            "Found {matches} related log entr{} (best score {:.2})",
            if *matches == 1 { "y" } else { "ies" },
            top_score.unwrap_or_default()
        )),
        ResearchEvent::CacheUnavailable { reason } => Some(format!("Research log unavailable: {reason}")),
        ResearchEvent::StageStarted(stage) => Some(format!("{stage}...")),
        ResearchEvent::State {
            state: LoopState::Deciding,
            iteration,
        } => Some(format!("Thinking (round {})", iteration + 1)),
        ResearchEvent::ToolStarted { tool, arguments, .. } => {
            let query = arguments
                .get("query")
                .and_then(|q| q.as_str())
                .map(|q| format!(" \"{q}\""))
                .unwrap_or_default();
            Some(format!("Calling {tool}{query}"))
        }
        ResearchEvent::ToolFinished {
            result,
            evidence_id: Some(id),
        } => Some(format!("{} returned evidence [{id}]", result.tool_name)),
        ResearchEvent::ToolFinished { result, .. } => result
            .error
            .as_ref()
            .map(|error| format!("{} failed: {error}", result.tool_name)),
        ResearchEvent::IterationCapReached { iterations } => {
            Some(format!("Tool budget of {iterations} rounds used, asking for a final answer"))
        }
        ResearchEvent::DraftReady { claims, cited } => {
            Some(format!("Draft ready: {claims} claims, {cited} cited"))
        }
        ResearchEvent::CritiqueReady { flagged } => Some(format!("Fact-check flagged {flagged} claims")),
        _ => None,
    }
}

/// Progress display for one run: a spinner, or plain lines on stderr.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn spinner(message: &str) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::lines();
        }
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    /// Every event on its own line.
    pub fn lines() -> Self {
        Self { bar: None }
    }

    pub fn update(&self, event: &ResearchEvent) {
        let Some(line) = describe(event) else {
            return;
        };
        match &self.bar {
            Some(bar) => bar.set_message(line),
            None => eprintln!("  {line}"),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

pub fn print_outcome(outcome: &RunOutcome) {
    println!("{}", for_stdout(&outcome.report.to_markdown()));
    println!();
    let cached = match outcome.cache_matches {
        0 => String::new(),
        n => format!(", {n} log entries used"),
    };
    eprintln!(
        "({:.1}s{}{})",
        outcome.elapsed.as_secs_f64(),
        cached,
        if outcome.logged.is_some() { ", saved to research log" } else { "" }
    );
}

pub fn print_rule() {
    println!("{}", "-".repeat(RULE_WIDTH));
}

pub fn print_history(entries: &[LogEntry], limit: usize) {
    if entries.is_empty() {
        println!("The research log is empty.");
        return;
    }
    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        println!(
            "{}  {}  ({:.2}s)",
            entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            entry.query,
            entry.response_time_seconds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sleuth_core::research::Stage;

    #[test]
    fn test_hyperlinks() {
        let text = "See [Paris](https://en.wikipedia.org/wiki/Paris) and [arXiv](https://arxiv.org).";
        let linked = hyperlinks(text);
        assert!(linked.contains("\x1b]8;;https://en.wikipedia.org/wiki/Paris\x1b\\[Paris]\x1b]8;;\x1b\\"));
        assert!(linked.ends_with("\x1b]8;;\x1b\\."));
        assert_eq!(hyperlinks("no links [1] here"), "no links [1] here");
    }

    #[test]
    fn test_describe() {
        let started = ResearchEvent::ToolStarted {
            call_id: "c1".into(),
            tool: "search_web".into(),
            arguments: json!({"query": "capital of France"}),
        };
        assert_eq!(
            describe(&started).as_deref(),
            Some("Calling search_web \"capital of France\"")
        );
        assert_eq!(
            describe(&ResearchEvent::CacheLookup {
                matches: 1,
                top_score: Some(1.0)
            })
            .as_deref(),
            Some("Found 1 related log entry (best score 1.00)")
        );
        assert!(describe(&ResearchEvent::StageStarted(Stage::Formatter)).is_some());
        assert!(describe(&ResearchEvent::State {
            state: LoopState::Observing,
            iteration: 0
        })
        .is_none());
    }
}
