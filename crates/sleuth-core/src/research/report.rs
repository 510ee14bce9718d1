use serde::Serialize;

use super::citations::is_list_item;
use super::evidence::Link;

/// Links printed per source.
const MAX_LINKS_PER_SOURCE: usize = 3;

/// Why a statement carries a caveat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Caveat {
    /// Cited, but the citation does not clearly support it.
    Hedged,
    /// No source at all.
    Unverified,
    /// Supported, but framed in a one-sided way.
    Contested,
}

impl Caveat {
    pub fn tag(self) -> &'static str {
        match self {
            Caveat::Hedged => "not clearly supported by the cited source",
            Caveat::Unverified => "unverified",
            Caveat::Contested => "framing may not be neutral",
        }
    }
}

/// One sentence of the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub text: String,
    /// Evidence ids, in the order printed.
    pub citations: Vec<String>,
    pub caveat: Option<Caveat>,
    pub paragraph: usize,
}

/// A cited evidence item, numbered by first use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub number: usize,
    pub evidence_id: String,
    pub label: String,
    pub links: Vec<Link>,
}

/// The final, cited answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub query: String,
    pub statements: Vec<Statement>,
    /// Explanations for caveated statements, in statement order.
    pub notes: Vec<String>,
    pub sources: Vec<Source>,
}

impl Report {
    /// Number printed for an evidence id, if it is cited.
    pub fn source_number(&self, evidence_id: &str) -> Option<usize> {
        self.sources
            .iter()
            .find(|s| s.evidence_id == evidence_id)
            .map(|s| s.number)
    }

    /// Body text with numbered citations, without notes or sources.
    pub fn body(&self) -> String {
        let mut paragraphs: Vec<(usize, String)> = Vec::new();
        for statement in &self.statements {
            let rendered = self.render_statement(statement);
            match paragraphs.last_mut() {
                Some((index, text)) if *index == statement.paragraph => {
                    text.push(' ');
                    text.push_str(&rendered);
                }
                _ => paragraphs.push((statement.paragraph, rendered)),
            }
        }

        let mut body = String::new();
        let mut previous_was_item = false;
        for (i, (_, text)) in paragraphs.iter().enumerate() {
            let item = is_list_item(text);
            if i > 0 {
                body.push_str(if item && previous_was_item { "\n" } else { "\n\n" });
            }
            body.push_str(text);
            previous_was_item = item;
        }
        body
    }

    fn render_statement(&self, statement: &Statement) -> String {
        let markers: String = statement
            .citations
            .iter()
            .filter_map(|id| self.source_number(id))
            .map(|n| format!("[{n}]"))
            .collect();

        let mut text = statement.text.clone();
        if !markers.is_empty() {
            // place markers before the closing punctuation
            match text.pop() {
                Some(c @ ('.' | '!' | '?')) => {
                    text.push(' ');
                    text.push_str(&markers);
                    text.push(c);
                }
                Some(c) => {
                    text.push(c);
                    text.push(' ');
                    text.push_str(&markers);
                }
                None => text.push_str(&markers),
            }
        }
        if let Some(caveat) = statement.caveat {
            text.push_str(&format!(" _({})_", caveat.tag()));
        }
        text
    }

    /// Full markdown report: body, notes and numbered sources.
    pub fn to_markdown(&self) -> String {
        let mut md = self.body();
        if md.is_empty() {
            md.push_str("_No findings._");
        }

        if !self.notes.is_empty() {
            md.push_str("\n\n### Notes\n\n");
            for note in &self.notes {
                md.push_str(&format!("- {note}\n"));
            }
        }

        if !self.sources.is_empty() {
            md.push_str(if self.notes.is_empty() { "\n\n" } else { "\n" });
            md.push_str("### Sources\n\n");
            for source in &self.sources {
                md.push_str(&format!("{}. {}", source.number, source.label));
                let links: Vec<String> = source
                    .links
                    .iter()
                    .take(MAX_LINKS_PER_SOURCE)
                    .map(|l| format!("[{}]({})", l.title, l.url))
                    .collect();
                if !links.is_empty() {
                    md.push_str(&format!(": {}", links.join(", ")));
                }
                md.push('\n');
            }
        }

        md.trim_end().to_string()
    }
}
