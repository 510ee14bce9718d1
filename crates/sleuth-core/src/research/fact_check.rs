//! Fact-checker stage: one verdict per claim of the draft.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::citations::{Claim, Draft};
use super::prompts::{build_fact_check_prompt, FACT_CHECK_SYSTEM_PROMPT};
use super::PipelineError;
use crate::config::DEFAULT_CORROBORATION_THRESHOLD;
use crate::llm::{ToolCall, LLM};
use crate::research_log::{EvidenceSupport, Relevance};
use crate::tools::ToolRegistry;

/// Tool used for verification searches.
const VERIFY_TOOL: &str = "search_web";

/// Outcome of checking one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    None,
    Uncorroborated,
    Biased,
}

impl Flag {
    /// Lenient parse of a model-produced flag.
    fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if raw.contains("uncorroborated") || raw.contains("unsupported") {
            Flag::Uncorroborated
        } else if raw.contains("bias") {
            Flag::Biased
        } else {
            Flag::None
        }
    }
}

/// Verdict on one claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub claim: String,
    pub flag: Flag,
    pub rationale: String,
    /// Evidence id found by a verification search that supports the claim.
    pub corroboration: Option<String>,
}

/// Verdicts in draft claim order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Critique {
    pub verdicts: Vec<Verdict>,
}

impl Critique {
    pub fn flagged(&self) -> usize {
        self.verdicts.iter().filter(|v| v.flag != Flag::None).count()
    }
}

#[derive(Debug, Deserialize)]
struct FactCheckResponse {
    #[serde(default)]
    verdicts: Vec<VerdictResponse>,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    claim: usize,
    #[serde(default)]
    flag: String,
    #[serde(default)]
    rationale: String,
}

struct Verifier {
    tools: Arc<ToolRegistry>,
    threshold: f64,
    scorer: Arc<dyn Relevance>,
}

/// Produces a [`Critique`] for a draft.
///
/// Uncited claims are always flagged `uncorroborated` without asking the
/// model. Cited claims are judged by a single model call, unless the checker
/// was built with [`FactChecker::baseline`].
pub struct FactChecker {
    llm: Option<Arc<dyn LLM>>,
    verifier: Option<Verifier>,
}

impl FactChecker {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            llm: Some(llm),
            verifier: None,
        }
    }

    /// Model-free checker: only citation presence is judged.
    pub fn baseline() -> Self {
        Self {
            llm: None,
            verifier: None,
        }
    }

    /// Search for support for each uncorroborated claim.
    pub fn with_verification(mut self, tools: Arc<ToolRegistry>, threshold: f64) -> Self {
        self.verifier = Some(Verifier {
            tools,
            threshold,
            scorer: Arc::new(EvidenceSupport),
        });
        self
    }

    /// Verification with the default corroboration threshold.
    pub fn with_default_verification(self, tools: Arc<ToolRegistry>) -> Self {
        self.with_verification(tools, DEFAULT_CORROBORATION_THRESHOLD)
    }

    /// Judge every claim of `draft`.
    ///
    /// Verification results that corroborate a claim are added to the
    /// draft's evidence so the formatter can cite them.
    pub async fn check(
        &self,
        draft: &mut Draft,
        cancel: &CancellationToken,
    ) -> Result<Critique, PipelineError> {
        let mut verdicts: Vec<Verdict> = draft
            .claims
            .iter()
            .map(|claim| {
                if claim.is_cited() {
                    Verdict {
                        claim: claim.text.clone(),
                        flag: Flag::None,
                        rationale: String::new(),
                        corroboration: None,
                    }
                } else {
                    Verdict {
                        claim: claim.text.clone(),
                        flag: Flag::Uncorroborated,
                        rationale: "No source cited".to_string(),
                        corroboration: None,
                    }
                }
            })
            .collect();

        if let Some(llm) = &self.llm {
            self.judge_cited(llm.as_ref(), draft, &mut verdicts, cancel).await?;
        }

        if let Some(verifier) = &self.verifier {
            verify(verifier, draft, &mut verdicts, cancel).await?;
        }

        let critique = Critique { verdicts };
        info!(
            claims = critique.verdicts.len(),
            flagged = critique.flagged(),
            "Fact-check finished"
        );
        Ok(critique)
    }

    async fn judge_cited(
        &self,
        llm: &dyn LLM,
        draft: &Draft,
        verdicts: &mut [Verdict],
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        // (claim number shown to the model, index into the draft)
        let cited: Vec<(usize, usize)> = draft
            .claims
            .iter()
            .enumerate()
            .filter(|(_, claim)| claim.is_cited())
            .enumerate()
            .map(|(n, (index, _))| (n + 1, index))
            .collect();

        if cited.is_empty() {
            return Ok(());
        }

        let numbered: Vec<(usize, &Claim)> = cited
            .iter()
            .map(|&(number, index)| (number, &draft.claims[index]))
            .collect();
        let prompt = build_fact_check_prompt(&draft.query, &numbered, &draft.evidence);

        debug!(model = %llm.model(), claims = cited.len(), "Asking for fact-check verdicts");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            response = llm.complete_with_system(FACT_CHECK_SYSTEM_PROMPT, &prompt) => response?,
        };

        let parsed = match serde_json::from_str::<FactCheckResponse>(extract_json(&response)) {
            Ok(parsed) => parsed.verdicts,
            Err(e) => {
                warn!(error = %e, "Could not parse fact-check verdicts, treating cited claims as supported");
                Vec::new()
            }
        };

        for (number, index) in cited {
            match parsed.iter().find(|v| v.claim == number) {
                Some(v) => {
                    verdicts[index].flag = Flag::parse(&v.flag);
                    verdicts[index].rationale = v.rationale.trim().to_string();
                }
                None => {
                    warn!(claim = number, "No fact-check verdict returned for claim");
                    verdicts[index].rationale = "No verdict returned".to_string();
                }
            }
        }
        Ok(())
    }
}

/// One verification search per uncorroborated claim.
async fn verify(
    verifier: &Verifier,
    draft: &mut Draft,
    verdicts: &mut [Verdict],
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    if verifier.tools.get(VERIFY_TOOL).is_none() {
        debug!(tool = VERIFY_TOOL, "Verification tool not registered, skipping verification");
        return Ok(());
    }

    for verdict in verdicts.iter_mut().filter(|v| v.flag == Flag::Uncorroborated) {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let call = ToolCall::new("", VERIFY_TOOL, json!({ "query": verdict.claim }));
        let result = verifier.tools.dispatch(&call).await;
        if result.is_error() {
            continue;
        }

        let score = verifier.scorer.score(&verdict.claim, &result.content.render());
        debug!(claim = %verdict.claim, score, "Verification search scored");
        if score >= verifier.threshold {
            if let Some(id) = draft.evidence.add_tool_result(&result) {
                verdict.rationale = format!("Corroborated by verification search [{id}]");
                verdict.corroboration = Some(id);
            }
        }
    }
    Ok(())
}

/// Extracts JSON from a response that might be wrapped in markdown code blocks.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let rest = &trimmed[start + 1..];
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    // Models sometimes wrap the object in prose.
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLLM;
    use crate::llm::LLMError;
    use crate::research::evidence::Evidence;
    use crate::tools::{Arguments, ParamKind, ParamSchema, Tool, ToolContent, ToolError, ToolResult};
    use async_trait::async_trait;

    fn draft(text: &str) -> Draft {
        let mut evidence = Evidence::new();
        evidence.add_tool_result(&ToolResult {
            call_id: "c1".into(),
            tool_name: "search_web".into(),
            arguments: json!({"query": "capital of France"}),
            content: ToolContent::Text("Paris is the capital of France.".into()),
            error: None,
        });
        Draft::new("capital of France?", text, evidence)
    }

    #[tokio::test]
    async fn test_baseline_flags_only_uncited() {
        let mut draft = draft("Paris is the capital [S1]. It is lovely.");
        let critique = FactChecker::baseline()
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(critique.verdicts.len(), 2);
        assert_eq!(critique.verdicts[0].flag, Flag::None);
        assert_eq!(critique.verdicts[1].flag, Flag::Uncorroborated);
        assert_eq!(critique.verdicts[1].rationale, "No source cited");
    }

    #[tokio::test]
    async fn test_model_verdicts_apply_to_cited_claims() {
        let llm = Arc::new(ScriptedLLM::new().then_complete(
            "```json\n{\"verdicts\": [{\"claim\": 1, \"flag\": \"none\", \"rationale\": \"ok\"}, \
             {\"claim\": 2, \"flag\": \"biased\", \"rationale\": \"loaded wording\"}]}\n```",
        ));
        let mut draft = draft("Paris is the capital [S1]. Paris is obviously the best city [S1]. Uncited.");

        let critique = FactChecker::new(llm.clone())
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();

        let flags: Vec<Flag> = critique.verdicts.iter().map(|v| v.flag).collect();
        assert_eq!(flags, vec![Flag::None, Flag::Biased, Flag::Uncorroborated]);

        // the model only sees cited claims
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].1.contains("Uncited."));
    }

    #[tokio::test]
    async fn test_unparseable_verdicts_fall_back_to_none() {
        let llm = Arc::new(ScriptedLLM::new().then_complete("I think these are all fine!"));
        let mut draft = draft("Paris is the capital [S1].");

        let critique = FactChecker::new(llm)
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(critique.verdicts[0].flag, Flag::None);
    }

    #[tokio::test]
    async fn test_no_model_call_without_cited_claims() {
        let llm = Arc::new(ScriptedLLM::new());
        let mut draft = draft("Nothing cited here.");

        FactChecker::new(llm.clone())
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let llm = Arc::new(ScriptedLLM::new().then_complete_fail(LLMError::RateLimited));
        let mut draft = draft("Paris is the capital [S1].");

        let err = FactChecker::new(llm)
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }

    /// Always answers with the same page of text.
    struct StaticSearch(&'static str);

    #[async_trait]
    impl Tool for StaticSearch {
        fn name(&self) -> &str {
            "search_web"
        }

        fn description(&self) -> &str {
            "Search"
        }

        fn schema(&self) -> ParamSchema {
            ParamSchema::new().required("query", ParamKind::String, "Query")
        }

        async fn execute(&self, _args: Arguments) -> Result<ToolContent, ToolError> {
            Ok(ToolContent::Text(self.0.to_string()))
        }
    }

    fn verifying(page: &'static str) -> FactChecker {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticSearch(page))).unwrap();
        FactChecker::baseline().with_default_verification(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_verification_search_corroborates_matching_claim() {
        let mut draft = draft("The Eiffel Tower was completed in 1889.");
        let critique = verifying("The Eiffel Tower was completed in 1889 for the World's Fair.")
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(critique.verdicts[0].corroboration.as_deref(), Some("S2"));
        assert!(draft.evidence.contains("S2"));
    }

    #[tokio::test]
    async fn test_verification_ignores_shared_years_and_function_words() {
        let mut draft = draft("The moon was made of cheese in 1889.");
        let critique = verifying("The Eiffel Tower was completed in 1889 for the World's Fair.")
            .check(&mut draft, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(critique.verdicts[0].flag, Flag::Uncorroborated);
        assert!(critique.verdicts[0].corroboration.is_none());
        assert_eq!(draft.evidence.len(), 1);
    }

    #[test]
    fn test_flag_parse() {
        assert_eq!(Flag::parse("Uncorroborated"), Flag::Uncorroborated);
        assert_eq!(Flag::parse("BIASED"), Flag::Biased);
        assert_eq!(Flag::parse("none"), Flag::None);
        assert_eq!(Flag::parse("???"), Flag::None);
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here you go: {\"a\": 1} thanks"), "{\"a\": 1}");
    }
}
