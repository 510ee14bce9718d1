//! Configuration management for Sleuth.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `sleuth.toml` file
//! 3. User config `~/.config/sleuth/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration.
    pub llm: LLMConfig,

    /// Researcher loop and pipeline configuration.
    pub research: ResearchConfig,

    /// Research log (cache) configuration.
    pub log: LogConfig,

    /// Built-in tool configuration.
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./sleuth.toml` (project local)
    /// 2. `~/.config/sleuth/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("sleuth.toml").exists() {
            return Self::from_file("sleuth.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sleuth").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// The `OLLAMA_*` and `RESEARCH_LOG_PATH` names are honoured as
    /// fallbacks so existing research bot setups keep working.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("SLEUTH_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("SLEUTH_LLM_MODEL").or_else(|_| std::env::var("OLLAMA_MODEL")) {
            self.llm.model = Some(model);
        }
        if let Ok(url) = std::env::var("SLEUTH_LLM_BASE_URL").or_else(|_| std::env::var("OLLAMA_BASE_URL")) {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("SLEUTH_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(temperature) = std::env::var("SLEUTH_LLM_TEMPERATURE") {
            if let Ok(t) = temperature.parse() {
                self.llm.temperature = t;
            }
        }
        if let Ok(tokens) = std::env::var("SLEUTH_LLM_MAX_TOKENS") {
            if let Ok(n) = tokens.parse() {
                self.llm.max_tokens = n;
            }
        }

        if let Ok(iterations) = std::env::var("SLEUTH_MAX_ITERATIONS") {
            if let Ok(n) = iterations.parse() {
                self.research.max_iterations = n;
            }
        }

        if let Ok(path) = std::env::var("SLEUTH_LOG_PATH").or_else(|_| std::env::var("RESEARCH_LOG_PATH")) {
            self.log.path = PathBuf::from(path);
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.research.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "research.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.research.tool_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "research.tool_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("log.match_threshold", self.log.match_threshold),
            ("research.corroboration_threshold", self.research.corroboration_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider name: "ollama", "openai", "anthropic", "openrouter" or "openai-compatible".
    pub provider: String,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Base URL for API (for openai-compatible providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens for response.
    pub max_tokens: u32,

    /// API version (for Anthropic).
    pub api_version: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: Some(DEFAULT_ANTHROPIC_API_VERSION.to_string()),
        }
    }
}

impl LLMConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "anthropic" | "claude" => DEFAULT_ANTHROPIC_MODEL.to_string(),
            "ollama" => DEFAULT_OLLAMA_MODEL.to_string(),
            _ => DEFAULT_OPENAI_MODEL.to_string(),
        })
    }

    /// Get the base URL, falling back to provider defaults.
    pub fn base_url_or_default(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| match self.provider.as_str() {
            "anthropic" | "claude" => DEFAULT_ANTHROPIC_URL.to_string(),
            "ollama" => DEFAULT_OLLAMA_URL.to_string(),
            "openrouter" => DEFAULT_OPENROUTER_URL.to_string(),
            _ => DEFAULT_OPENAI_URL.to_string(),
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("SLEUTH_LLM_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "anthropic" | "claude" => std::env::var("ANTHROPIC_API_KEY").ok(),
                "openrouter" => std::env::var("OPENROUTER_API_KEY").ok(),
                "ollama" => None,
                _ => std::env::var("OPENAI_API_KEY").ok(),
            })
    }
}

/// Researcher loop and pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Maximum tool-call rounds before the loop is forced to answer.
    pub max_iterations: usize,

    /// Per-call tool timeout in seconds.
    pub tool_timeout_secs: u64,

    /// Truncate tool output fed back to the model to this many characters.
    pub max_observation_chars: usize,

    /// Let the fact-checker issue its own verification searches.
    pub verify_with_tools: bool,

    /// Remove uncited, uncorroborated claims instead of caveating them.
    pub drop_unsupported: bool,

    /// Minimum lexical score for evidence to corroborate a claim.
    pub corroboration_threshold: f64,

    /// Researcher system prompt. If not set, uses the built-in default.
    pub system_prompt: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            max_observation_chars: DEFAULT_MAX_OBSERVATION_CHARS,
            verify_with_tools: false,
            drop_unsupported: false,
            corroboration_threshold: DEFAULT_CORROBORATION_THRESHOLD,
            system_prompt: None,
        }
    }
}

impl ResearchConfig {
    /// Tool timeout as a [`Duration`].
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Research log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Path to the JSON-lines research log.
    pub path: PathBuf,

    /// Minimum relevance score for a good match.
    pub match_threshold: f64,

    /// Maximum number of matches handed to the researcher.
    pub top_k: usize,

    /// Disable cache lookups and appends entirely.
    pub disabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            disabled: false,
        }
    }
}

/// Built-in tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Names of built-in tools to register. Empty means all of them.
    pub enabled: Vec<String>,

    /// DuckDuckGo HTML endpoint (web and news search).
    pub duckduckgo_url: String,

    /// MediaWiki API endpoint.
    pub wikipedia_url: String,

    /// arXiv API endpoint.
    pub arxiv_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            duckduckgo_url: DEFAULT_DUCKDUCKGO_URL.to_string(),
            wikipedia_url: DEFAULT_WIKIPEDIA_URL.to_string(),
            arxiv_url: DEFAULT_ARXIV_URL.to_string(),
        }
    }
}

impl ToolsConfig {
    /// Whether the named built-in tool should be registered.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }
}
