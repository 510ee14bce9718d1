use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use super::{clean_text, records_or_empty};
use crate::config::{DEFAULT_LOOKUP_RESULTS, MAX_WIKIPEDIA_RESULTS};
use crate::tools::{Arguments, ParamKind, ParamSchema, SearchRecord, Tool, ToolContent, ToolError};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    info: String,
}

/// Article search on a MediaWiki site.
pub struct WikipediaLookup {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaLookup {
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
        }
    }

    /// Article URL for a page title, on the same host as the API.
    fn article_url(&self, title: &str) -> String {
        let slug = title.replace(' ', "_");
        Url::parse(&self.api_url)
            .and_then(|api| api.join(&format!("/wiki/{slug}")))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("https://en.wikipedia.org/wiki/{slug}"))
    }
}

#[async_trait]
impl Tool for WikipediaLookup {
    fn name(&self) -> &str {
        "lookup_wikipedia"
    }

    fn description(&self) -> &str {
        "Look up encyclopedia articles on Wikipedia. Good for background facts, definitions, \
         people, places and history."
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("query", ParamKind::String, "Topic or article title to look up")
            .optional(
                "max_results",
                ParamKind::Integer,
                "Maximum number of articles to return",
                json!(DEFAULT_LOOKUP_RESULTS),
            )
            .clamp("max_results", 1, MAX_WIKIPEDIA_RESULTS as i64)
    }

    async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError> {
        let query = args.str("query").unwrap_or_default();
        let limit = args
            .int("max_results")
            .unwrap_or(DEFAULT_LOOKUP_RESULTS as i64)
            .to_string();

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::upstream(self.name(), format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::upstream(self.name(), format!("HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::upstream(self.name(), format!("unexpected response: {e}")))?;

        if let Some(error) = body.error {
            return Err(ToolError::upstream(self.name(), error.info));
        }

        let records = body
            .query
            .map(|q| q.search)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| SearchRecord {
                url: self.article_url(&hit.title),
                snippet: clean_text(&hit.snippet),
                title: hit.title,
            })
            .collect();

        Ok(records_or_empty(query, records))
    }
}
