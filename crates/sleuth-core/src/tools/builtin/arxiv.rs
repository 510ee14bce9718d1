use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{clean_text, records_or_empty};
use crate::config::{DEFAULT_LOOKUP_RESULTS, MAX_WEB_RESULTS};
use crate::tools::{Arguments, ParamKind, ParamSchema, SearchRecord, Tool, ToolContent, ToolError};

const ENTRY_PATTERN: &str = r"(?s)<entry>(.*?)</entry>";

/// Abstracts are long; keep the snippet to roughly a paragraph.
const MAX_SNIPPET_CHARS: usize = 400;

/// Paper search against the arXiv Atom API.
pub struct ArxivSearch {
    client: reqwest::Client,
    url: String,
}

impl ArxivSearch {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Tool for ArxivSearch {
    fn name(&self) -> &str {
        "search_arxiv"
    }

    fn description(&self) -> &str {
        "Search academic preprints on arXiv. Use this for scientific and technical research questions."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("query", ParamKind::String, "Keywords describing the papers to find")
            .optional(
                "max_results",
                ParamKind::Integer,
                "Maximum number of papers to return",
                json!(DEFAULT_LOOKUP_RESULTS),
            )
            .clamp("max_results", 1, MAX_WEB_RESULTS as i64)
    }

    async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError> {
        let query = args.str("query").unwrap_or_default();
        let limit = args
            .int("max_results")
            .unwrap_or(DEFAULT_LOOKUP_RESULTS as i64)
            .to_string();
        let search = format!("all:{query}");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("search_query", search.as_str()),
                ("start", "0"),
                ("max_results", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::upstream(self.name(), format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::upstream(self.name(), format!("HTTP {status}")));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| ToolError::upstream(self.name(), format!("failed to read response: {e}")))?;

        Ok(records_or_empty(query, parse_feed(&xml)))
    }
}

fn parse_feed(xml: &str) -> Vec<SearchRecord> {
    let Ok(entry_re) = Regex::new(ENTRY_PATTERN) else {
        return Vec::new();
    };

    entry_re
        .captures_iter(xml)
        .filter_map(|cap| {
            let entry = &cap[1];
            let title = clean_text(&tag_text(entry, "title")?);
            let url = tag_text(entry, "id")?.trim().to_string();
            let summary = clean_text(&tag_text(entry, "summary").unwrap_or_default());
            Some(SearchRecord {
                title,
                url,
                snippet: shorten(&summary, MAX_SNIPPET_CHARS),
            })
        })
        .collect()
}

/// Inner text of the first `<tag ...>...</tag>` in `xml`.
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>")).ok()?;
    re.captures(xml).map(|cap| cap[1].to_string())
}

fn shorten(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
