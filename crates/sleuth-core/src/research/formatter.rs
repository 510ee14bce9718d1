//! Formatter stage: merge a draft and its critique into a [`Report`].
//!
//! Deterministic and local. No model or tool calls are made, so the same
//! draft and critique always produce the same report.

use std::sync::Arc;

use tracing::{debug, warn};

use super::citations::{Claim, Draft};
use super::evidence::Evidence;
use super::fact_check::{Critique, Flag, Verdict};
use super::report::{Caveat, Report, Source, Statement};
use crate::config::{ResearchConfig, DEFAULT_CORROBORATION_THRESHOLD};
use crate::research_log::{EvidenceSupport, Relevance};

pub struct Formatter {
    threshold: f64,
    drop_unsupported: bool,
    scorer: Arc<dyn Relevance>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CORROBORATION_THRESHOLD,
            drop_unsupported: false,
            scorer: Arc::new(EvidenceSupport),
        }
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            threshold: config.corroboration_threshold,
            drop_unsupported: config.drop_unsupported,
            ..Self::default()
        }
    }

    /// Remove uncited, uncorroborated claims instead of caveating them.
    pub fn with_drop_unsupported(mut self, drop: bool) -> Self {
        self.drop_unsupported = drop;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn format(&self, draft: &Draft, critique: &Critique) -> Report {
        if critique.verdicts.len() != draft.claims.len() {
            warn!(
                claims = draft.claims.len(),
                verdicts = critique.verdicts.len(),
                "Critique does not match draft, missing verdicts count as unflagged"
            );
        }

        let mut statements = Vec::new();
        let mut notes = Vec::new();

        for (index, claim) in draft.claims.iter().enumerate() {
            let verdict = critique.verdicts.get(index);
            let flag = verdict.map_or(Flag::None, |v| v.flag);

            let resolved = match flag {
                Flag::None => Some((claim.citations.clone(), None)),
                Flag::Biased => Some((claim.citations.clone(), Some(Caveat::Contested))),
                Flag::Uncorroborated => self.resolve_uncorroborated(claim, verdict, &draft.evidence),
            };

            let Some((citations, caveat)) = resolved else {
                debug!(claim = %claim.text, "Dropping unsupported claim");
                continue;
            };

            if caveat.is_some() {
                let rationale = verdict
                    .map(|v| v.rationale.trim())
                    .filter(|r| !r.is_empty())
                    .unwrap_or("No supporting evidence found");
                notes.push(format!("\"{}\": {}", claim.text, rationale));
            }

            statements.push(Statement {
                text: claim.text.clone(),
                citations: citations
                    .into_iter()
                    .filter(|id| draft.evidence.contains(id))
                    .collect(),
                caveat,
                paragraph: claim.paragraph,
            });
        }

        let sources = number_sources(&statements, &draft.evidence);

        Report {
            query: draft.query.clone(),
            statements,
            notes,
            sources,
        }
    }

    /// Re-cite, hedge, mark unverified, or drop (`None`).
    fn resolve_uncorroborated(
        &self,
        claim: &Claim,
        verdict: Option<&Verdict>,
        evidence: &Evidence,
    ) -> Option<(Vec<String>, Option<Caveat>)> {
        let corroboration = verdict
            .and_then(|v| v.corroboration.clone())
            .filter(|id| evidence.get(id).is_some_and(|item| item.is_fresh()))
            .or_else(|| self.best_alternate(claim, evidence));

        if let Some(id) = corroboration {
            return Some((vec![id], None));
        }
        if claim.is_cited() {
            return Some((claim.citations.clone(), Some(Caveat::Hedged)));
        }
        if self.drop_unsupported {
            return None;
        }
        Some((Vec::new(), Some(Caveat::Unverified)))
    }

    /// Highest-scoring tool result the claim does not already cite.
    /// Ties go to the item registered first. Log entries never qualify: they
    /// hold earlier reports, caveated claims included.
    fn best_alternate(&self, claim: &Claim, evidence: &Evidence) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;
        for item in evidence.items() {
            if !item.is_fresh() || claim.citations.contains(&item.id) {
                continue;
            }
            let score = self.scorer.score(&claim.text, &item.content);
            if score < self.threshold {
                continue;
            }
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, item.id.as_str()));
            }
        }
        best.map(|(_, id)| id.to_string())
    }
}

/// Sources in order of first citation.
fn number_sources(statements: &[Statement], evidence: &Evidence) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();
    for id in statements.iter().flat_map(|s| s.citations.iter()) {
        if sources.iter().any(|s| &s.evidence_id == id) {
            continue;
        }
        if let Some(item) = evidence.get(id) {
            sources.push(Source {
                number: sources.len() + 1,
                evidence_id: id.clone(),
                label: item.label(),
                links: item.links.clone(),
            });
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research_log::LogEntry;
    use crate::tools::{ToolContent, ToolResult};
    use serde_json::json;
    use std::time::Duration;

    fn evidence() -> Evidence {
        let mut evidence = Evidence::new();
        evidence.add_log_entry(&LogEntry::new(
            "population of Paris",
            "Paris has about 2.1 million residents.",
            Duration::ZERO,
        ));
        for text in [
            "Paris is the capital of France.",
            "The Eiffel Tower was completed in 1889 for the World's Fair.",
        ] {
            evidence.add_tool_result(&ToolResult {
                call_id: "c".into(),
                tool_name: "search_web".into(),
                arguments: json!({"query": "paris"}),
                content: ToolContent::Text(text.into()),
                error: None,
            });
        }
        evidence
    }

    fn verdict(claim: &Claim, flag: Flag) -> Verdict {
        Verdict {
            claim: claim.text.clone(),
            flag,
            rationale: String::new(),
            corroboration: None,
        }
    }

    fn critique(draft: &Draft, flags: &[Flag]) -> Critique {
        Critique {
            verdicts: draft
                .claims
                .iter()
                .zip(flags)
                .map(|(c, f)| verdict(c, *f))
                .collect(),
        }
    }

    #[test]
    fn test_unflagged_claims_keep_citations() {
        let draft = Draft::new("q", "Paris is the capital of France [S1].", evidence());
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::None]));

        assert_eq!(report.statements[0].citations, vec!["S1"]);
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].evidence_id, "S1");
        assert!(report.notes.is_empty());
    }

    #[test]
    fn test_uncited_claim_is_recited_to_matching_evidence() {
        let draft = Draft::new("q", "The Eiffel Tower was completed in 1889.", evidence());
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::Uncorroborated]));

        assert_eq!(report.statements[0].citations, vec!["S2"]);
        assert_eq!(report.statements[0].caveat, None);
    }

    #[test]
    fn test_uncited_unsupported_claim_is_caveated_or_dropped() {
        let draft = Draft::new("q", "Paris is the capital [S1]. Bananas are berries.", evidence());
        let flags = [Flag::None, Flag::Uncorroborated];

        let report = Formatter::new().format(&draft, &critique(&draft, &flags));
        assert_eq!(report.statements.len(), 2);
        assert_eq!(report.statements[1].caveat, Some(Caveat::Unverified));
        assert_eq!(report.notes.len(), 1);

        let report = Formatter::new()
            .with_drop_unsupported(true)
            .format(&draft, &critique(&draft, &flags));
        assert_eq!(report.statements.len(), 1);
    }

    #[test]
    fn test_cited_but_uncorroborated_is_hedged() {
        let draft = Draft::new("q", "Bananas are berries [S1].", evidence());
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::Uncorroborated]));

        assert_eq!(report.statements[0].citations, vec!["S1"]);
        assert_eq!(report.statements[0].caveat, Some(Caveat::Hedged));
    }

    #[test]
    fn test_verification_corroboration_wins() {
        let draft = Draft::new("q", "Bananas are berries.", evidence());
        let mut critique = critique(&draft, &[Flag::Uncorroborated]);
        critique.verdicts[0].corroboration = Some("S1".into());

        let report = Formatter::new().format(&draft, &critique);
        assert_eq!(report.statements[0].citations, vec!["S1"]);
        assert_eq!(report.statements[0].caveat, None);
    }

    #[test]
    fn test_shared_function_words_and_years_do_not_corroborate() {
        let draft = Draft::new("q", "The moon was made of cheese in 1889.", evidence());
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::Uncorroborated]));

        assert!(report.statements[0].citations.is_empty());
        assert_eq!(report.statements[0].caveat, Some(Caveat::Unverified));
        assert!(report.sources.is_empty());
        assert!(!report.body().contains("[1]"));
    }

    #[test]
    fn test_log_entries_never_corroborate() {
        let mut evidence = Evidence::new();
        evidence.add_log_entry(&LogEntry::new(
            "what is the moon made of",
            "The moon is made of cheese. _(unverified)_",
            Duration::ZERO,
        ));
        let draft = Draft::new("what is the moon made of", "The moon is made of cheese.", evidence);

        let mut critique = critique(&draft, &[Flag::Uncorroborated]);
        let report = Formatter::new().format(&draft, &critique);
        assert!(report.statements[0].citations.is_empty());
        assert_eq!(report.statements[0].caveat, Some(Caveat::Unverified));

        critique.verdicts[0].corroboration = Some("L1".into());
        let report = Formatter::new().format(&draft, &critique);
        assert!(report.statements[0].citations.is_empty());
        assert_eq!(report.statements[0].caveat, Some(Caveat::Unverified));
    }

    #[test]
    fn test_biased_claim_gets_neutrality_caveat() {
        let draft = Draft::new("q", "Paris is obviously the capital of France [S1].", evidence());
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::Biased]));

        assert_eq!(report.statements[0].caveat, Some(Caveat::Contested));
        assert_eq!(report.statements[0].citations, vec!["S1"]);
    }

    #[test]
    fn test_sources_in_first_use_order() {
        let draft = Draft::new(
            "q",
            "The tower dates from 1889 [S2]. Paris is the capital [S1]. Residents number 2.1 million [L1][S2].",
            evidence(),
        );
        let report = Formatter::new().format(&draft, &critique(&draft, &[Flag::None; 3]));

        let order: Vec<&str> = report.sources.iter().map(|s| s.evidence_id.as_str()).collect();
        assert_eq!(order, vec!["S2", "S1", "L1"]);
        assert!(report.body().contains("Residents number 2.1 million [3][1]."));
    }

    #[test]
    fn test_deterministic() {
        let draft = Draft::new("q", "Paris is the capital [S1]. Eiffel Tower 1889. Bananas.", evidence());
        let critique = critique(&draft, &[Flag::None, Flag::Uncorroborated, Flag::Uncorroborated]);
        let formatter = Formatter::new();

        let first = formatter.format(&draft, &critique);
        let second = formatter.format(&draft, &critique);
        assert_eq!(first, second);
        assert_eq!(first.to_markdown(), second.to_markdown());
    }
}
