//! Query relevance scoring.

use std::collections::HashSet;

/// Words ignored when measuring overlap between two questions.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "what", "how", "when", "where", "why", "who",
];

/// Scores how well `candidate` answers the same question as `query`.
///
/// Implementations must be pure and return a value in `[0.0, 1.0]`.
pub trait Relevance: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> f64;
}

/// Normalization, containment and content-word overlap.
///
/// - identical after normalization: 1.0
/// - one contains the other: 0.9
/// - otherwise the share of the query's content words present in the
///   candidate, boosted by 1.2 and capped at 1.0
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalRelevance;

impl Relevance for LexicalRelevance {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let nq = normalize(query);
        let nc = normalize(candidate);
        if nq.is_empty() {
            return 0.0;
        }
        if nq == nc {
            return 1.0;
        }
        if !nc.is_empty() && (contains_phrase(&nc, &nq) || contains_phrase(&nq, &nc)) {
            return 0.9;
        }

        let query_words = content_words(&nq);
        if query_words.is_empty() {
            return 0.0;
        }
        let candidate_words = content_words(&nc);
        let shared = query_words.intersection(&candidate_words).count();
        let overlap = shared as f64 / query_words.len() as f64;
        (overlap * 1.2).min(1.0)
    }
}

/// Function words that never count as shared evidence.
const FUNCTION_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "more", "most",
    "no", "not", "of", "on", "one", "or", "other", "our", "over", "s", "she", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "under", "up", "was", "we", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "would", "you", "your",
];

/// Key terms a claim and its evidence must share before support is considered.
pub const MIN_SHARED_TERMS: usize = 2;

/// Scores whether a piece of evidence supports a claim.
///
/// Only key terms count: function words and purely numeric tokens are
/// ignored, so a shared year or "was ... in" is not support. Fewer than
/// [`MIN_SHARED_TERMS`] shared key terms scores 0.0 (one for single-term
/// claims); otherwise the share of the claim's key terms found in the
/// evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceSupport;

impl Relevance for EvidenceSupport {
    fn score(&self, claim: &str, evidence: &str) -> f64 {
        let nc = normalize(claim);
        let ne = normalize(evidence);
        let claim_terms = key_terms(&nc);
        if claim_terms.is_empty() {
            return 0.0;
        }
        let evidence_terms = key_terms(&ne);
        let shared = claim_terms.intersection(&evidence_terms).count();
        if shared < MIN_SHARED_TERMS.min(claim_terms.len()) {
            return 0.0;
        }
        shared as f64 / claim_terms.len() as f64
    }
}

fn key_terms(normalized: &str) -> HashSet<&str> {
    normalized
        .split(' ')
        .filter(|w| {
            !w.is_empty()
                && !FUNCTION_WORDS.contains(w)
                && !w.chars().all(|c| c.is_ascii_digit())
        })
        .collect()
}

/// Lowercase, turn punctuation into spaces and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn content_words(normalized: &str) -> HashSet<&str> {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .collect()
}

/// Substring test on normalized text, anchored to word boundaries.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  What's the Capital   of France?! "), "what s the capital of france");
        assert_eq!(normalize("???"), "");
    }

    #[test]
    fn test_identical_scores_one() {
        let scorer = LexicalRelevance;
        assert_eq!(scorer.score("Capital of France?", "capital of france"), 1.0);
    }

    #[test]
    fn test_containment() {
        let scorer = LexicalRelevance;
        assert_eq!(
            scorer.score("capital of France", "What is the capital of France today"),
            0.9
        );
        assert_eq!(scorer.score("What is the capital of France today", "capital of France"), 0.9);
    }

    #[test]
    fn test_overlap_is_boosted_and_capped() {
        let scorer = LexicalRelevance;
        // {capital, of, germany} vs {capital, of, france}: 2/3 * 1.2 = 0.8
        let score = scorer.score("capital of Germany", "the capital of France");
        assert!((score - 0.8).abs() < 1e-9);

        // word order differs but all content words are shared
        assert_eq!(scorer.score("france capital", "capital france"), 1.0);
    }

    #[test]
    fn test_empty_and_stopword_only_queries() {
        let scorer = LexicalRelevance;
        assert_eq!(scorer.score("", "anything"), 0.0);
        assert_eq!(scorer.score("what is the", "who are they"), 0.0);
    }

    #[test]
    fn test_unrelated() {
        let scorer = LexicalRelevance;
        assert_eq!(scorer.score("rust borrow checker", "capital of France"), 0.0);
    }

    #[test]
    fn test_support_ignores_function_words_and_years() {
        let support = EvidenceSupport;
        let evidence = "The Eiffel Tower was completed in 1889 for the World's Fair.";
        assert_eq!(support.score("The moon was made of cheese in 1889.", evidence), 0.0);
        assert_eq!(support.score("The Eiffel Tower was completed in 1889.", evidence), 1.0);
    }

    #[test]
    fn test_support_needs_two_shared_terms() {
        let support = EvidenceSupport;
        // one shared key term out of two is not enough
        assert_eq!(support.score("Paris bakeries", "Paris is the capital of France."), 0.0);
        assert_eq!(support.score("Paris", "Paris is the capital of France."), 1.0);
        assert_eq!(support.score("In 1889.", "It opened in 1889."), 0.0);
    }
}
