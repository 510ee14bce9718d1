//! Default values for Sleuth configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// LLM Defaults
// ============================================================================

/// Default LLM provider.
pub const DEFAULT_LLM_PROVIDER: &str = "ollama";

/// Default max tokens for LLM responses.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature (lower = more deterministic).
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

// Anthropic defaults
/// Default Anthropic API URL.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Anthropic API version.
pub const DEFAULT_ANTHROPIC_API_VERSION: &str = "2023-06-01";

// Ollama defaults
/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama model. Needs good tool-calling support.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

// OpenRouter defaults
/// Default OpenRouter API URL.
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// Research Loop Defaults
// ============================================================================

/// Maximum number of tool-call rounds before the loop is forced to answer.
pub const DEFAULT_MAX_ITERATIONS: usize = 6;

/// Per-call tool timeout in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Maximum characters of a single tool result fed back to the model.
pub const DEFAULT_MAX_OBSERVATION_CHARS: usize = 6000;

/// Minimum lexical score for evidence to count as corroborating a claim.
pub const DEFAULT_CORROBORATION_THRESHOLD: f64 = 0.5;

// ============================================================================
// Research Log Defaults
// ============================================================================

/// Default research log file (JSON lines).
pub const DEFAULT_LOG_PATH: &str = "research_log.jsonl";

/// Minimum relevance score for a logged query to count as a good match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Maximum number of log entries handed to the researcher as prior context.
pub const DEFAULT_TOP_K: usize = 5;

// ============================================================================
// Tool Defaults
// ============================================================================

/// Default DuckDuckGo HTML endpoint.
pub const DEFAULT_DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";

/// Default MediaWiki API endpoint.
pub const DEFAULT_WIKIPEDIA_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Default arXiv query endpoint.
pub const DEFAULT_ARXIV_URL: &str = "https://export.arxiv.org/api/query";

/// User agent sent by the built-in tools.
pub const DEFAULT_USER_AGENT: &str = concat!("sleuth/", env!("CARGO_PKG_VERSION"));

/// Default result count for web search.
pub const DEFAULT_WEB_RESULTS: u64 = 8;

/// Hard cap on result count for web and news search.
pub const MAX_WEB_RESULTS: u64 = 20;

/// Default result count for news, encyclopedia and paper search.
pub const DEFAULT_LOOKUP_RESULTS: u64 = 5;

/// Hard cap on encyclopedia results.
pub const MAX_WIKIPEDIA_RESULTS: u64 = 10;
