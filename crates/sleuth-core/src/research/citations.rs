//! Claim extraction and citation markers.
//!
//! The researcher cites evidence inline with markers such as `[S1]`,
//! `[L2]` or `[S1, S3]`. A draft answer is split into sentence-level claims,
//! each carrying the ids its markers resolve to in the run's evidence.

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::evidence::Evidence;

const MARKER_PATTERN: &str = r"\[\s*([SL]\d+(?:\s*[,;]\s*[SL]\d+)*)\s*\]";
const LEADING_MARKERS_PATTERN: &str = r"^(?:\s*\[\s*[SL]\d+(?:\s*[,;]\s*[SL]\d+)*\s*\])+";

/// Tokens that end with a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "etc", "vs", "mr", "mrs", "ms", "dr", "st", "jr", "sr", "approx", "ca",
];

/// One sentence of the draft and the evidence it cites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    /// Sentence text with citation markers removed.
    pub text: String,
    /// Evidence ids, deduplicated, in marker order.
    pub citations: Vec<String>,
    /// Index of the paragraph (or list item) the sentence belongs to.
    pub paragraph: usize,
}

impl Claim {
    pub fn is_cited(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// The researcher's answer, split into claims, with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub query: String,
    /// Raw answer text as produced by the model.
    pub text: String,
    pub claims: Vec<Claim>,
    pub evidence: Evidence,
}

impl Draft {
    /// Parse `text` into claims, resolving markers against `evidence`.
    pub fn new(query: impl Into<String>, text: impl Into<String>, evidence: Evidence) -> Self {
        let text = text.into();
        let claims = parse_claims(&text, &evidence);
        Self {
            query: query.into(),
            text,
            claims,
            evidence,
        }
    }

    pub fn uncited(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter().filter(|c| !c.is_cited())
    }
}

/// Split an answer into claims and resolve their citation markers.
///
/// Markers naming ids that are not in `evidence` are dropped.
pub fn parse_claims(text: &str, evidence: &Evidence) -> Vec<Claim> {
    let Ok(marker_re) = Regex::new(MARKER_PATTERN) else {
        return Vec::new();
    };

    let mut claims = Vec::new();
    for (paragraph, block) in blocks(text).iter().enumerate() {
        for sentence in split_sentences(block) {
            let mut citations: Vec<String> = Vec::new();
            for cap in marker_re.captures_iter(&sentence) {
                for id in cap[1].split([',', ';']).map(str::trim) {
                    if !evidence.contains(id) {
                        debug!(id, "Dropping citation to unknown evidence");
                        continue;
                    }
                    if !citations.iter().any(|c| c == id) {
                        citations.push(id.to_string());
                    }
                }
            }

            let stripped = strip_markers(&marker_re, &sentence);
            if stripped.is_empty() {
                continue;
            }
            claims.push(Claim {
                text: stripped,
                citations,
                paragraph,
            });
        }
    }
    claims
}

/// Paragraphs and list items, in order. Headings and blank lines are dropped.
fn blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            flush(&mut current, &mut blocks);
        } else if is_list_item(trimmed) {
            flush(&mut current, &mut blocks);
            blocks.push(trimmed.to_string());
        } else {
            current.push(trimmed);
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

fn flush(current: &mut Vec<&str>, blocks: &mut Vec<String>) {
    if !current.is_empty() {
        blocks.push(current.join(" "));
        current.clear();
    }
}

pub(crate) fn is_list_item(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") {
        return true;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with(". ")
}

/// Split a block into sentences.
///
/// Citation markers that follow the terminating punctuation
/// (`"... France. [S1] Next"`) stay with the sentence they follow.
pub fn split_sentences(block: &str) -> Vec<String> {
    let Ok(leading_re) = Regex::new(LEADING_MARKERS_PATTERN) else {
        return vec![block.trim().to_string()];
    };

    let chars: Vec<(usize, char)> = block.char_indices().collect();
    let mut sentences: Vec<String> = Vec::new();
    let mut start = 0;

    for (pos, &(idx, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let next = chars.get(pos + 1).map(|&(_, n)| n);
        if !next.map_or(false, char::is_whitespace) {
            continue;
        }
        let after = chars[pos + 1..]
            .iter()
            .map(|&(_, n)| n)
            .find(|n| !n.is_whitespace());
        if after.map_or(false, char::is_lowercase) {
            continue;
        }
        if c == '.' && ends_with_abbreviation(&block[start..idx]) {
            continue;
        }

        let end = idx + c.len_utf8();
        sentences.push(block[start..end].trim().to_string());
        start = end;
    }
    if start < block.len() {
        sentences.push(block[start..].trim().to_string());
    }

    // Move markers that open a sentence back onto the previous one.
    let mut merged: Vec<String> = Vec::new();
    for sentence in sentences.into_iter().filter(|s| !s.is_empty()) {
        if let (Some(prev), Some(m)) = (merged.last_mut(), leading_re.find(&sentence)) {
            prev.push(' ');
            prev.push_str(m.as_str().trim());
            let rest = sentence[m.end()..].trim();
            if !rest.is_empty() {
                merged.push(rest.to_string());
            }
            continue;
        }
        merged.push(sentence);
    }
    merged
}

fn ends_with_abbreviation(text: &str) -> bool {
    let last = text
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if last.chars().count() == 1 && last.chars().all(char::is_alphabetic) {
        return true;
    }
    ABBREVIATIONS.contains(&last.as_str()) || (last.contains('.') && last.len() <= 5)
}

fn strip_markers(marker_re: &Regex, sentence: &str) -> String {
    let removed = marker_re.replace_all(sentence, "");
    let collapsed = removed.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" .", ".")
        .replace(" ,", ",")
        .replace(" !", "!")
        .replace(" ?", "?")
        .replace(" ;", ";")
        .replace(" :", ":")
}
