use std::io::Write;
use std::path::PathBuf;

use sleuth_core::config::{DEFAULT_MATCH_THRESHOLD, DEFAULT_MAX_ITERATIONS, DEFAULT_TOP_K};
use sleuth_core::{Config, ConfigError};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_from_file_partial_sections() {
    let file = write_config(
        r#"
[research]
max_iterations = 4
drop_unsupported = true

[tools]
enabled = ["search_web", "lookup_wikipedia"]
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.research.max_iterations, 4);
    assert!(config.research.drop_unsupported);
    assert!(config.tools.is_enabled("lookup_wikipedia"));
    assert!(!config.tools.is_enabled("search_arxiv"));
    assert_eq!(config.log.match_threshold, DEFAULT_MATCH_THRESHOLD);
    assert_eq!(config.log.top_k, DEFAULT_TOP_K);
}

#[test]
fn test_from_file_rejects_invalid_values() {
    let file = write_config("[log]\nmatch_threshold = 2.0\n");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_from_file_rejects_malformed_toml() {
    let file = write_config("[research\nmax_iterations = ");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_missing_file() {
    let result = Config::from_file("/nonexistent/sleuth.toml");
    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
fn test_default_config_string_round_trips() {
    let parsed: Config = toml::from_str(&Config::default_config_string()).unwrap();
    assert_eq!(parsed.research.max_iterations, DEFAULT_MAX_ITERATIONS);
    assert_eq!(parsed.log.path, PathBuf::from("research_log.jsonl"));
    assert!(parsed.llm.api_key.is_none());
}
