use super::{ClaudeClient, LLMError, OpenAIClient, LLM};
use crate::config::{
    LLMConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_ANTHROPIC_URL, DEFAULT_MAX_TOKENS,
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL,
    DEFAULT_TEMPERATURE,
};

/// Sampling settings shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// LLM Provider configuration.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible endpoint
    OpenAI {
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    },
    /// Anthropic Claude
    Anthropic {
        api_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    },
    /// Local Ollama instance (default)
    Ollama {
        base_url: Option<String>,
        model: String,
    },
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Ollama {
            base_url: None,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

impl Provider {
    /// Creates a provider from LLMConfig.
    pub fn from_config(config: &LLMConfig) -> Result<Self, LLMError> {
        match config.provider.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic {
                api_url: config.base_url.clone(),
                api_key: config.api_key_or_env(),
                model: config.model.clone(),
            }),
            "ollama" => Ok(Provider::Ollama {
                base_url: config.base_url.clone(),
                model: config.model_or_default(),
            }),
            "openai" | "openai-compatible" | "openrouter" => Ok(Provider::OpenAI {
                base_url: Some(config.base_url_or_default()),
                api_key: config.api_key_or_env(),
                model: config.model.clone(),
            }),
            other => Err(LLMError::UnknownProvider(other.to_string())),
        }
    }

    /// Builds the client described by an [`LLMConfig`].
    pub fn build_from_config(config: &LLMConfig) -> Result<Box<dyn LLM>, LLMError> {
        let sampling = Sampling {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        Self::from_config(config)?.build(sampling)
    }

    /// Creates an LLM client from the provider configuration.
    pub fn build(self, sampling: Sampling) -> Result<Box<dyn LLM>, LLMError> {
        match self {
            Provider::OpenAI {
                base_url,
                api_key,
                model,
            } => {
                let base = base_url.unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
                let key = api_key.unwrap_or_default();
                let mdl = model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

                Ok(Box::new(
                    OpenAIClient::new(base, key, mdl)
                        .with_temperature(sampling.temperature)
                        .with_max_tokens(sampling.max_tokens),
                ))
            }

            Provider::Anthropic {
                api_url,
                api_key,
                model,
            } => {
                let key = api_key.ok_or(LLMError::MissingApiKey)?;
                let mdl = model.unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());
                let url = api_url.unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string());

                Ok(Box::new(
                    ClaudeClient::new(key)
                        .with_model(mdl)
                        .with_api_url(url)
                        .with_temperature(sampling.temperature)
                        .with_max_tokens(sampling.max_tokens),
                ))
            }

            Provider::Ollama { base_url, model } => {
                let base = base_url
                    .map(|h| ollama_api_url(&h))
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

                Ok(Box::new(
                    OpenAIClient::new(base, "", model)
                        .with_temperature(sampling.temperature)
                        .with_max_tokens(sampling.max_tokens),
                ))
            }
        }
    }
}

/// Ollama hosts are usually given without the `/v1` suffix of the
/// OpenAI-compatible endpoint.
fn ollama_api_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.ends_with("/v1") {
        host.to_string()
    } else {
        format!("{host}/v1")
    }
}
