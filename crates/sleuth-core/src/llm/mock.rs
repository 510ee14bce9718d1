//! Scripted backend for exercising the research loop without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatResponse, Conversation, LLMError, ToolDefinition, LLM};

/// A backend call observed by [`ScriptedLLM`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub conversation: Conversation,
    pub tool_names: Vec<String>,
}

/// A backend that replays queued responses in order.
///
/// Once the chat script is exhausted the `repeat` response (if any) is
/// returned forever, which is how tests model a model that never converges.
/// Without a `repeat` response an exhausted script fails like an unreachable
/// backend. Completions (`complete_with_system`) have their own queue and
/// answer with an empty string once it runs dry.
#[derive(Default)]
pub struct ScriptedLLM {
    script: Mutex<VecDeque<Result<ChatResponse, LLMError>>>,
    repeat: Mutex<Option<ChatResponse>>,
    completions: Mutex<VecDeque<Result<String, LLMError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedLLM {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chat response.
    pub fn then(self, response: ChatResponse) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(Ok(response));
        self
    }

    /// Queue a chat failure.
    pub fn then_fail(self, error: LLMError) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(Err(error));
        self
    }

    /// Response returned for every chat call after the script runs out.
    pub fn repeating(self, response: ChatResponse) -> Self {
        *self.repeat.lock().unwrap_or_else(|e| e.into_inner()) = Some(response);
        self
    }

    /// Queue a plain completion.
    pub fn then_complete(self, text: impl Into<String>) -> Self {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(text.into()));
        self
    }

    /// Queue a completion failure.
    pub fn then_complete_fail(self, error: LLMError) -> Self {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Chat calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `(system, prompt)` pairs received by `complete_with_system`.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LLMError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                conversation: conversation.clone(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });

        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(result) => result,
            None => self
                .repeat
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .ok_or_else(|| LLMError::RequestFailed("script exhausted".to_string())),
        }
    }

    async fn complete_with_system(&self, system: &str, prompt: &str) -> Result<String, LLMError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system.to_string(), prompt.to_string()));

        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
