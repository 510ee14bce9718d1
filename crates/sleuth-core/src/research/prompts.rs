use super::citations::Claim;
use super::evidence::Evidence;
use crate::research_log::LogMatch;

/// System prompt for the researcher loop.
pub const RESEARCHER_SYSTEM_PROMPT: &str = r#"You are a research assistant that finds accurate, up-to-date information using the tools you are given.

You MUST call at least one search tool before answering unless the prior research provided fully answers the question. Never answer from memory alone.

When a user asks a question:
1. Search with specific, descriptive queries. Try different phrasings if results are thin.
2. Use search_news for current events, prices and anything time-sensitive.
3. Synthesize the results into a clear answer with concrete details (numbers, dates, names).

Every tool result and every prior research entry is labelled with an evidence id such as S1 or L1.
Cite the evidence behind each factual sentence by putting its id in square brackets at the end of the sentence, for example:
"Paris is the capital of France [S1]." Use several ids like [S1, S2] when more than one source supports a sentence.
Only cite ids you were actually given. Do not invent sources or URLs.

If the results lack specific details, say what you found and note the gaps.
If you cannot find relevant information after searching, say so clearly."#;

/// Appended when the tool budget is exhausted.
pub const FINAL_ANSWER_PROMPT: &str = "You have used all available tool calls. Write your final answer now \
using only the evidence gathered so far, citing evidence ids in square brackets.";

/// System prompt for the fact-checker.
pub const FACT_CHECK_SYSTEM_PROMPT: &str = r#"You are a meticulous fact-checker. You receive numbered claims from a research answer, each with the evidence excerpts it cites.

For each claim decide:
- "none": the cited evidence supports the claim and it is stated neutrally
- "uncorroborated": the cited evidence does not actually support the claim
- "biased": the claim is supported but presented in a one-sided or loaded way

Output only valid JSON with this exact structure:
{
  "verdicts": [
    {"claim": 1, "flag": "none", "rationale": "One short sentence"}
  ]
}

Include one verdict per claim number. No additional text."#;

/// Maximum characters of each evidence excerpt shown to the fact-checker.
const EXCERPT_CHARS: usize = 1500;

/// User message carrying prior research from the log, labelled `L1..`.
pub fn build_cache_context(matches: &[(String, &LogMatch)]) -> String {
    let mut out = String::from(
        "Prior research on related questions (context only, verify anything time-sensitive):\n",
    );
    for (id, m) in matches {
        out.push_str(&format!(
            "\n[{}] Question: {}\nAsked: {}\nAnswer:\n{}\n",
            id,
            m.entry.query,
            m.entry.timestamp.format("%Y-%m-%d %H:%M UTC"),
            m.entry.response.trim()
        ));
    }
    out
}

/// Observation text for a tool result, labelled with its evidence id.
pub fn build_observation(evidence_id: Option<&str>, tool: &str, body: &str) -> String {
    match evidence_id {
        Some(id) => format!("Evidence [{id}] from {tool}:\n{body}"),
        None => format!("{tool} failed (not citable):\n{body}"),
    }
}

/// Prompt asking the fact-checker to judge cited claims.
///
/// `claims` pairs the 1-based claim number with the claim.
pub fn build_fact_check_prompt(query: &str, claims: &[(usize, &Claim)], evidence: &Evidence) -> String {
    let mut prompt = format!("## Question\n\n{query}\n\n## Claims\n");
    for (number, claim) in claims {
        prompt.push_str(&format!("\n{}. {}\n", number, claim.text));
        for id in &claim.citations {
            if let Some(item) = evidence.get(id) {
                prompt.push_str(&format!("   [{}] {}\n", id, excerpt(&item.content)));
            }
        }
    }
    prompt.push_str("\nReturn one verdict per claim number.");
    prompt
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research_log::LogEntry;
    use std::time::Duration;

    #[test]
    fn test_cache_context_labels_entries() {
        let m = LogMatch {
            entry: LogEntry::new("capital of France", "Paris [S1].", Duration::ZERO),
            score: 1.0,
        };
        let context = build_cache_context(&[("L1".to_string(), &m)]);
        assert!(context.contains("[L1] Question: capital of France"));
        assert!(context.contains("Paris [S1]."));
    }

    #[test]
    fn test_fact_check_prompt_includes_cited_excerpts() {
        let mut evidence = Evidence::new();
        let id = evidence.add_log_entry(&LogEntry::new("q", "Paris is the capital.", Duration::ZERO));
        let claim = Claim {
            text: "Paris is the capital of France.".into(),
            citations: vec![id],
            paragraph: 0,
        };
        let prompt = build_fact_check_prompt("capital of France?", &[(1, &claim)], &evidence);
        assert!(prompt.contains("1. Paris is the capital of France."));
        assert!(prompt.contains("[L1] Paris is the capital."));
    }
}
