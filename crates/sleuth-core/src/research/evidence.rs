//! Per-run evidence ledger.
//!
//! Every successful tool result and every log entry shown to the model is
//! registered under a short id (`S1`, `S2`, ... and `L1`, `L2`, ...). Those
//! ids are what the model cites and what the report's sources list.

use serde::Serialize;

use crate::research_log::LogEntry;
use crate::tools::{ToolContent, ToolResult};

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceOrigin {
    Tool {
        tool_name: String,
        arguments: serde_json::Value,
    },
    Log {
        query: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// A titled URL carried by a search record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub title: String,
    pub url: String,
}

/// One citable item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub id: String,
    pub origin: EvidenceOrigin,
    /// Text the model saw for this item.
    pub content: String,
    pub links: Vec<Link>,
}

impl EvidenceItem {
    /// True for items gathered by a tool during this run.
    pub fn is_fresh(&self) -> bool {
        matches!(self.origin, EvidenceOrigin::Tool { .. })
    }

    /// Short human-readable description used in the sources list.
    pub fn label(&self) -> String {
        match &self.origin {
            EvidenceOrigin::Tool {
                tool_name,
                arguments,
            } => match arguments.get("query").and_then(|q| q.as_str()) {
                Some(query) => format!("{tool_name}: \"{query}\""),
                None => tool_name.clone(),
            },
            EvidenceOrigin::Log { query, timestamp } => format!(
                "Research log: \"{}\" ({})",
                query,
                timestamp.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }
}

/// Ordered collection of evidence items for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    items: Vec<EvidenceItem>,
    tool_count: usize,
    log_count: usize,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool result. Failed calls are not evidence and get no id.
    pub fn add_tool_result(&mut self, result: &ToolResult) -> Option<String> {
        if result.is_error() {
            return None;
        }
        self.tool_count += 1;
        let id = format!("S{}", self.tool_count);

        let links = match &result.content {
            ToolContent::Records(records) => records
                .iter()
                .map(|r| Link {
                    title: r.title.clone(),
                    url: r.url.clone(),
                })
                .collect(),
            ToolContent::Text(_) => Vec::new(),
        };

        self.items.push(EvidenceItem {
            id: id.clone(),
            origin: EvidenceOrigin::Tool {
                tool_name: result.tool_name.clone(),
                arguments: result.arguments.clone(),
            },
            content: result.content.render(),
            links,
        });
        Some(id)
    }

    /// Register a log entry handed to the model as prior context.
    pub fn add_log_entry(&mut self, entry: &LogEntry) -> String {
        self.log_count += 1;
        let id = format!("L{}", self.log_count);
        self.items.push(EvidenceItem {
            id: id.clone(),
            origin: EvidenceOrigin::Log {
                query: entry.query.clone(),
                timestamp: entry.timestamp,
            },
            content: entry.response.clone(),
            links: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&EvidenceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
