//! The researcher: a bounded tool-calling loop around one LLM session.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::citations::Draft;
use super::events::{EventSink, LoopState, ResearchEvent};
use super::evidence::Evidence;
use super::prompts::{build_cache_context, build_observation, FINAL_ANSWER_PROMPT, RESEARCHER_SYSTEM_PROMPT};
use super::PipelineError;
use crate::config::{ResearchConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_OBSERVATION_CHARS};
use crate::llm::{ChatResponse, Conversation, Message, ToolDefinition, LLM};
use crate::research_log::LogMatch;
use crate::tools::ToolRegistry;

/// Runs the researcher loop.
///
/// `Start -> Deciding -> ToolCall -> Observing -> Deciding ... -> Done`.
/// After `max_iterations` tool rounds the model gets one last call without
/// tools, so a run makes at most `max_iterations + 1` backend calls.
pub struct ResearchAgent {
    llm: Arc<dyn LLM>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    max_observation_chars: usize,
    system_prompt: String,
}

impl ResearchAgent {
    pub fn new(llm: Arc<dyn LLM>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_observation_chars: DEFAULT_MAX_OBSERVATION_CHARS,
            system_prompt: RESEARCHER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Applies loop limits and the system prompt override from config.
    pub fn with_config(mut self, config: &ResearchConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.max_observation_chars = config.max_observation_chars;
        if let Some(prompt) = &config.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Research `query`, using `prior` log matches as context.
    pub async fn research(
        &self,
        query: &str,
        prior: &[LogMatch],
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<Draft, PipelineError> {
        let mut evidence = Evidence::new();
        let definitions = self.tools.definitions();

        events.emit(ResearchEvent::State {
            state: LoopState::Start,
            iteration: 0,
        });
        let mut conversation = self.seed(query, prior, &mut evidence);

        let mut iteration = 0;
        while iteration < self.max_iterations {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            events.emit(ResearchEvent::State {
                state: LoopState::Deciding,
                iteration,
            });

            let response = self.call(&conversation, &definitions, cancel).await?;

            if !response.wants_tools() {
                conversation.push(Message::assistant(response.content.clone(), Vec::new()));
                let text = if response.content.trim().is_empty() {
                    conversation.last_assistant_text().unwrap_or_default().to_string()
                } else {
                    response.content
                };
                return Ok(self.finish(query, text, evidence, iteration, events));
            }

            let calls = response.tool_calls.clone();
            conversation.push(Message::assistant(response.content, response.tool_calls));

            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            events.emit(ResearchEvent::State {
                state: LoopState::ToolCall,
                iteration,
            });
            for call in &calls {
                events.emit(ResearchEvent::ToolStarted {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }

            // Calls from one step run concurrently; join_all keeps request order.
            let results = join_all(calls.iter().map(|call| self.tools.dispatch(call))).await;

            events.emit(ResearchEvent::State {
                state: LoopState::Observing,
                iteration,
            });
            for result in &results {
                let evidence_id = evidence.add_tool_result(result);
                events.emit(ResearchEvent::ToolFinished {
                    result: result.clone(),
                    evidence_id: evidence_id.clone(),
                });
                let body = result.observation(self.max_observation_chars);
                conversation.push(Message::tool(
                    result.call_id.clone(),
                    result.tool_name.clone(),
                    build_observation(evidence_id.as_deref(), &result.tool_name, &body),
                ));
            }

            iteration += 1;
        }

        // Tool budget exhausted: one last call, without tools.
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        warn!(iterations = iteration, "Tool budget exhausted, forcing a final answer");
        events.emit(ResearchEvent::IterationCapReached {
            iterations: iteration,
        });
        events.emit(ResearchEvent::State {
            state: LoopState::Deciding,
            iteration,
        });
        conversation.push(Message::user(FINAL_ANSWER_PROMPT));

        let response = self.call(&conversation, &[], cancel).await?;
        let text = if response.content.trim().is_empty() {
            conversation.last_assistant_text().unwrap_or_default().to_string()
        } else {
            response.content
        };

        if text.trim().is_empty() {
            return Err(PipelineError::IterationCapExceeded {
                iterations: iteration,
            });
        }
        Ok(self.finish(query, text, evidence, iteration, events))
    }

    /// Builds the initial conversation, registering prior entries as evidence.
    fn seed(&self, query: &str, prior: &[LogMatch], evidence: &mut Evidence) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(Message::system(self.system_prompt.clone()));

        if prior.is_empty() {
            conversation.push(Message::user(query));
            return conversation;
        }

        let labelled: Vec<(String, &LogMatch)> = prior
            .iter()
            .map(|m| (evidence.add_log_entry(&m.entry), m))
            .collect();
        conversation.push(Message::user(format!(
            "{}\n## Question\n\n{}",
            build_cache_context(&labelled),
            query
        )));
        conversation
    }

    /// One backend call, abandoned as soon as the run is cancelled.
    async fn call(
        &self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, PipelineError> {
        debug!(
            model = %self.llm.model(),
            messages = conversation.len(),
            tools = tools.len(),
            "Calling LLM"
        );
        tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            response = self.llm.chat(conversation, tools) => Ok(response?),
        }
    }

    fn finish(
        &self,
        query: &str,
        text: String,
        evidence: Evidence,
        iterations: usize,
        events: &EventSink,
    ) -> Draft {
        let draft = Draft::new(query, text, evidence);
        let cited = draft.claims.iter().filter(|c| c.is_cited()).count();
        info!(
            iterations,
            evidence = draft.evidence.len(),
            claims = draft.claims.len(),
            cited,
            "Research loop finished"
        );
        events.emit(ResearchEvent::State {
            state: LoopState::Done,
            iteration: iterations,
        });
        events.emit(ResearchEvent::DraftReady {
            claims: draft.claims.len(),
            cited,
        });
        draft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLLM;
    use crate::llm::{LLMError, ToolCall};
    use crate::tools::{Arguments, ParamKind, ParamSchema, Tool, ToolContent, ToolError};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct FixedSearch;

    #[async_trait]
    impl Tool for FixedSearch {
        fn name(&self) -> &str {
            "search_web"
        }

        fn description(&self) -> &str {
            "Search"
        }

        fn schema(&self) -> ParamSchema {
            ParamSchema::new().required("query", ParamKind::String, "Query")
        }

        async fn execute(&self, args: Arguments) -> Result<ToolContent, ToolError> {
            Ok(ToolContent::Text(format!(
                "Result for {}: Paris is the capital of France.",
                args.str("query").unwrap_or_default()
            )))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedSearch)).unwrap();
        Arc::new(registry)
    }

    fn search(id: &str, query: &str) -> ToolCall {
        ToolCall::new(id, "search_web", json!({ "query": query }))
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let llm = Arc::new(
            ScriptedLLM::new()
                .then(ChatResponse::tool_calls(vec![search("a", "capital of France")]))
                .then(ChatResponse::text("Paris is the capital of France [S1].")),
        );
        let agent = ResearchAgent::new(llm.clone(), registry());

        let draft = agent
            .research("capital of France?", &[], &EventSink::none(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.claims.len(), 1);
        assert_eq!(draft.claims[0].citations, vec!["S1"]);
        assert_eq!(llm.calls().len(), 2);

        // the second call sees the first as a prefix
        let calls = llm.calls();
        let first = calls[0].conversation.messages();
        let second = calls[1].conversation.messages();
        assert_eq!(&second[..first.len()], first);
        assert!(second.last().unwrap().content().starts_with("Evidence [S1] from search_web"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_request_order() {
        let llm = Arc::new(
            ScriptedLLM::new()
                .then(ChatResponse::tool_calls(vec![search("a", "first"), search("b", "second")]))
                .then(ChatResponse::text("Done [S2].")),
        );
        let agent = ResearchAgent::new(llm.clone(), registry());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let draft = agent
            .research("q", &[], &EventSink::new(tx), &CancellationToken::new())
            .await
            .unwrap();

        assert!(draft.evidence.get("S1").unwrap().content.contains("first"));
        assert!(draft.evidence.get("S2").unwrap().content.contains("second"));

        let mut finished = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ResearchEvent::ToolFinished { result, evidence_id } = event {
                finished.push((result.call_id, evidence_id, result.content.render()));
            }
        }
        let ids: Vec<(&str, Option<&str>)> = finished
            .iter()
            .map(|(call, evidence, _)| (call.as_str(), evidence.as_deref()))
            .collect();
        assert_eq!(ids, vec![("a", Some("S1")), ("b", Some("S2"))]);
        assert!(finished[0].2.contains("first"));
        assert!(finished[1].2.contains("second"));
    }

    #[tokio::test]
    async fn test_cap_bounds_backend_calls() {
        let llm = Arc::new(
            ScriptedLLM::new()
                .repeating(ChatResponse {
                    content: "Still looking, Paris so far [S1].".into(),
                    tool_calls: vec![search("", "again")],
                }),
        );
        let agent = ResearchAgent::new(llm.clone(), registry()).with_max_iterations(3);

        let draft = agent
            .research("q", &[], &EventSink::none(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(llm.calls().len(), 4);
        assert!(llm.calls()[3].tool_names.is_empty());
        assert!(draft.text.contains("Paris"));
    }

    #[tokio::test]
    async fn test_cap_without_any_text_is_an_error() {
        let llm = Arc::new(
            ScriptedLLM::new().repeating(ChatResponse::tool_calls(vec![search("", "again")])),
        );
        let agent = ResearchAgent::new(llm.clone(), registry()).with_max_iterations(2);

        let err = agent
            .research("q", &[], &EventSink::none(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::IterationCapExceeded { iterations: 2 });
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let llm = Arc::new(ScriptedLLM::new().then_fail(LLMError::Network("connection refused".into())));
        let agent = ResearchAgent::new(llm, registry());

        let err = agent
            .research("q", &[], &EventSink::none(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_deciding() {
        let llm = Arc::new(ScriptedLLM::new().then(ChatResponse::text("never")));
        let agent = ResearchAgent::new(llm.clone(), registry());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent
            .research("q", &[], &EventSink::none(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_observed() {
        let llm = Arc::new(
            ScriptedLLM::new()
                .then(ChatResponse::tool_calls(vec![ToolCall::new("x", "search_web", json!({}))]))
                .then(ChatResponse::text("I could not search.")),
        );
        let agent = ResearchAgent::new(llm.clone(), registry());

        let draft = agent
            .research("q", &[], &EventSink::none(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(draft.evidence.is_empty());
        let calls = llm.calls();
        let observation = calls[1].conversation.messages().last().unwrap().content().to_string();
        assert!(observation.contains("ERROR (invalid_arguments)"));
    }
}
