mod claude;
mod error;
mod message;
pub mod mock;
mod openai;
mod provider;

pub use claude::ClaudeClient;
pub use error::LLMError;
pub use message::{ChatResponse, Conversation, Message, ToolCall, ToolDefinition};
pub use openai::OpenAIClient;
pub use provider::{Provider, Sampling};

use async_trait::async_trait;

/// Trait for chat backends with function calling.
///
/// This abstraction allows swapping between different LLM providers
/// without changing the research loop.
///
/// # Supported Providers
///
/// - **OpenAI-compatible**: OpenAI, Azure, vLLM, OpenRouter, etc.
/// - **Ollama**: local models through Ollama's OpenAI-compatible endpoint (default)
/// - **Anthropic**: Claude models via the Messages API
///
/// # Example
///
/// ```ignore
/// use sleuth_core::llm::{Conversation, Message, Provider, Sampling, LLM};
///
/// let llm = Provider::Ollama {
///     base_url: None,
///     model: "llama3.2".to_string(),
/// }.build(Sampling::default())?;
///
/// let mut conversation = Conversation::new();
/// conversation.push(Message::user("Hello!"));
/// let response = llm.chat(&conversation, &[]).await?;
/// ```
#[async_trait]
pub trait LLM: Send + Sync {
    /// Run one backend turn over the conversation, offering the given tools.
    ///
    /// The backend answers with final text, tool call requests, or both.
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LLMError>;

    /// Complete a prompt with a system message, without tools.
    async fn complete_with_system(&self, system: &str, prompt: &str) -> Result<String, LLMError> {
        let mut conversation = Conversation::new();
        conversation.push(Message::system(system));
        conversation.push(Message::user(prompt));
        let response = self.chat(&conversation, &[]).await?;
        Ok(response.content)
    }

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Blanket implementation for boxed trait objects.
#[async_trait]
impl LLM for Box<dyn LLM> {
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LLMError> {
        (**self).chat(conversation, tools).await
    }

    async fn complete_with_system(&self, system: &str, prompt: &str) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}
