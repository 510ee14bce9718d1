//! Built-in research tools backed by public HTTP endpoints.

mod arxiv;
mod duckduckgo;
mod wikipedia;

pub use arxiv::ArxivSearch;
pub use duckduckgo::{NewsSearch, WebSearch};
pub use wikipedia::WikipediaLookup;

use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use super::{RegistryError, SearchRecord, Tool, ToolContent, ToolRegistry};
use crate::config::{ToolsConfig, DEFAULT_USER_AGENT};

const TAG_PATTERN: &str = r"(?s)<[^>]+>";
const WHITESPACE_PATTERN: &str = r"\s+";

/// Register every built-in tool enabled in `config`, in a fixed order.
pub fn register_builtin(
    registry: &mut ToolRegistry,
    config: &ToolsConfig,
) -> Result<(), RegistryError> {
    let client = http_client();

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(WebSearch::new(client.clone(), &config.duckduckgo_url)),
        Arc::new(NewsSearch::new(client.clone(), &config.duckduckgo_url)),
        Arc::new(WikipediaLookup::new(client.clone(), &config.wikipedia_url)),
        Arc::new(ArxivSearch::new(client, &config.arxiv_url)),
    ];

    for tool in tools {
        if config.is_enabled(tool.name()) {
            registry.register(tool)?;
        } else {
            debug!(tool = %tool.name(), "Built-in tool disabled by config");
        }
    }
    Ok(())
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Records, or the "no results" text when there are none.
fn records_or_empty(query: &str, records: Vec<SearchRecord>) -> ToolContent {
    if records.is_empty() {
        ToolContent::Text(format!("No results found for: {query}"))
    } else {
        ToolContent::Records(records)
    }
}

/// Strip markup, decode common entities and collapse whitespace.
pub(crate) fn clean_text(html: &str) -> String {
    let stripped = match Regex::new(TAG_PATTERN) {
        Ok(re) => re.replace_all(html, "").into_owned(),
        Err(_) => html.to_string(),
    };

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    match Regex::new(WHITESPACE_PATTERN) {
        Ok(re) => re.replace_all(decoded.trim(), " ").into_owned(),
        Err(_) => decoded.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(
            clean_text("<b>Paris</b> is the   capital &amp; largest\n city"),
            "Paris is the capital & largest city"
        );
        assert_eq!(clean_text("&lt;tag&gt; &quot;x&quot;"), "<tag> \"x\"");
    }

    #[test]
    fn test_register_respects_enabled_list() {
        let mut registry = ToolRegistry::new();
        let config = ToolsConfig {
            enabled: vec!["lookup_wikipedia".into(), "search_web".into()],
            ..ToolsConfig::default()
        };
        register_builtin(&mut registry, &config).unwrap();
        assert_eq!(registry.names(), vec!["search_web", "lookup_wikipedia"]);
    }

    #[test]
    fn test_register_all_by_default() {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry, &ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["search_web", "search_news", "lookup_wikipedia", "search_arxiv"]
        );
    }
}
