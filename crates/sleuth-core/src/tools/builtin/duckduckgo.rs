use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde_json::json;

use super::{clean_text, records_or_empty};
use crate::config::{DEFAULT_LOOKUP_RESULTS, DEFAULT_WEB_RESULTS, MAX_WEB_RESULTS};
use crate::tools::{Arguments, ParamKind, ParamSchema, SearchRecord, Tool, ToolContent, ToolError};

const RESULT_LINK_PATTERN: &str = r#"(?s)<a([^>]*class="result__a"[^>]*)>(.*?)</a>"#;
const RESULT_SNIPPET_PATTERN: &str = r#"(?s)<(?:a|div|td)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#;
const HREF_PATTERN: &str = r#"href="([^"]*)""#;

/// Client for the DuckDuckGo HTML endpoint, shared by web and news search.
#[derive(Clone)]
struct DuckDuckGo {
    client: reqwest::Client,
    url: String,
}

impl DuckDuckGo {
    async fn search(
        &self,
        tool: &str,
        query: &str,
        max_results: usize,
        time_filter: Option<&str>,
    ) -> Result<ToolContent, ToolError> {
        let mut params = vec![("q", query)];
        if let Some(df) = time_filter {
            params.push(("df", df));
        }

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ToolError::upstream(tool, format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::upstream(tool, format!("search returned HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::upstream(tool, format!("failed to read search response: {e}")))?;

        let mut records = parse_results(&html);
        records.truncate(max_results);
        Ok(records_or_empty(query, records))
    }
}

/// Extract result titles, target URLs and snippets from a results page.
///
/// A snippet belongs to the link it follows, up to the next result link, so a
/// result without a snippet never shifts the others.
fn parse_results(html: &str) -> Vec<SearchRecord> {
    let (Ok(link_re), Ok(snippet_re), Ok(href_re)) = (
        Regex::new(RESULT_LINK_PATTERN),
        Regex::new(RESULT_SNIPPET_PATTERN),
        Regex::new(HREF_PATTERN),
    ) else {
        return Vec::new();
    };

    let links: Vec<_> = link_re.captures_iter(html).collect();
    links
        .iter()
        .enumerate()
        .filter_map(|(i, cap)| {
            let whole = cap.get(0)?;
            let block_end = links
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(html.len(), |next| next.start());
            let block = &html[whole.end()..block_end];

            let href = href_re.captures(&cap[1])?.get(1)?.as_str();
            let url = resolve_redirect(&clean_text(href));
            let title = clean_text(&cap[2]);
            if url.is_empty() || title.is_empty() {
                return None;
            }
            let snippet = snippet_re
                .captures(block)
                .map(|snippet| clean_text(&snippet[1]))
                .unwrap_or_default();
            Some(SearchRecord {
                title,
                url,
                snippet,
            })
        })
        .collect()
}

/// Result links go through a `/l/?uddg=<target>` redirect; unwrap it.
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

fn search_schema(default_results: u64) -> ParamSchema {
    ParamSchema::new()
        .required(
            "query",
            ParamKind::String,
            "The search query. Be specific and descriptive for better results.",
        )
        .optional(
            "max_results",
            ParamKind::Integer,
            "Maximum number of results to return",
            json!(default_results),
        )
        .clamp("max_results", 1, MAX_WEB_RESULTS as i64)
}

fn query_and_limit(args: &Arguments, default_results: u64) -> (String, usize) {
    let query = args.str("query").unwrap_or_default().to_string();
    let limit = args.int("max_results").unwrap_or(default_results as i64).max(1) as usize;
    (query, limit)
}

/// General web search.
pub struct WebSearch {
    ddg: DuckDuckGo,
}

impl WebSearch {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            ddg: DuckDuckGo {
                client,
                url: url.to_string(),
            },
        }
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the internet. Use this to find current information, facts, or research on any topic. \
         Returns titles, URLs and snippets."
    }

    fn schema(&self) -> ParamSchema {
        search_schema(DEFAULT_WEB_RESULTS)
    }

    async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError> {
        let (query, limit) = query_and_limit(&args, DEFAULT_WEB_RESULTS);
        self.ddg.search(self.name(), &query, limit, None).await
    }
}

/// Web search restricted to the past week.
pub struct NewsSearch {
    ddg: DuckDuckGo,
}

impl NewsSearch {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            ddg: DuckDuckGo {
                client,
                url: url.to_string(),
            },
        }
    }
}

#[async_trait]
impl Tool for NewsSearch {
    fn name(&self) -> &str {
        "search_news"
    }

    fn description(&self) -> &str {
        "Search recent news from the past week. Use this for current events and anything time-sensitive."
    }

    fn schema(&self) -> ParamSchema {
        search_schema(DEFAULT_LOOKUP_RESULTS)
    }

    async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError> {
        let (query, limit) = query_and_limit(&args, DEFAULT_LOOKUP_RESULTS);
        self.ddg.search(self.name(), &query, limit, Some("w")).await
    }
}
