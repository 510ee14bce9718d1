//! Research log: an append-only JSON-lines record of answered questions.
//!
//! Every completed run appends one [`LogEntry`]. At the start of a run the
//! log is consulted as a cache: entries whose query is relevant enough to the
//! new one are handed to the researcher as prior context.
//!
//! Appends hold an exclusive `fs2` lock for the duration of a single line
//! write and readers take a shared lock, so a reader never sees half an entry.
//!
//! Logs written by the older research bot are one pretty-printed JSON array.
//! Those are read as-is but never appended to.

mod error;
mod relevance;

pub use error::LogError;
pub use relevance::{normalize, EvidenceSupport, LexicalRelevance, Relevance};

use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::config::{LogConfig, DEFAULT_MATCH_THRESHOLD};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub query: String,
    pub response: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub response_time_seconds: f64,
}

impl LogEntry {
    /// Creates an entry stamped now, with the elapsed time rounded to centiseconds.
    pub fn new(query: impl Into<String>, response: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            timestamp: Utc::now(),
            response_time_seconds: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
        }
    }
}

/// Accepts RFC 3339 timestamps and zone-less ISO 8601 ones, read as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// A log entry that scored at or above the match threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMatch {
    pub entry: LogEntry,
    pub score: f64,
}

/// Handle to the research log file.
#[derive(Clone)]
pub struct ResearchLog {
    path: PathBuf,
    threshold: f64,
    scorer: Arc<dyn Relevance>,
}

impl std::fmt::Debug for ResearchLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchLog")
            .field("path", &self.path)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl ResearchLog {
    /// Opens (lazily) the log at `path` with the lexical scorer.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold: DEFAULT_MATCH_THRESHOLD,
            scorer: Arc::new(LexicalRelevance),
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(&config.path).with_threshold(config.match_threshold)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the relevance scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn Relevance>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All entries in insertion order. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<LogEntry>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).map_err(|e| LogError::io(&self.path, e))?;
        file.lock_shared()
            .map_err(|_| LogError::Lock(self.path.clone()))?;

        let result = read_log(&file, &self.path).map(|(entries, _)| entries);

        file.unlock().map_err(|_| LogError::Lock(self.path.clone()))?;
        result
    }

    /// Up to `top_k` entries scoring at least the threshold against `query`.
    ///
    /// Ordered by descending score; ties go to the most recent entry.
    pub fn find_relevant(&self, query: &str, top_k: usize) -> Result<Vec<LogMatch>, LogError> {
        let entries = self.entries()?;
        Ok(rank(entries, query, top_k, self.threshold, self.scorer.as_ref()))
    }

    /// Append one entry as a single line.
    ///
    /// The stored timestamp never goes backwards: an entry stamped earlier
    /// than the current last entry takes that entry's timestamp instead.
    pub fn append(&self, entry: &LogEntry) -> Result<LogEntry, LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| LogError::io(&self.path, e))?;

        file.lock_exclusive()
            .map_err(|_| LogError::Lock(self.path.clone()))?;

        let result = self.append_locked(&mut file, entry);

        file.unlock().map_err(|_| LogError::Lock(self.path.clone()))?;
        result
    }

    fn append_locked(&self, file: &mut File, entry: &LogEntry) -> Result<LogEntry, LogError> {
        let (existing, format) = read_log(&*file, &self.path)?;
        if format == LogFormat::Array {
            return Err(LogError::ArrayFormat(self.path.clone()));
        }

        let mut stored = entry.clone();
        if let Some(last) = existing.last() {
            if stored.timestamp < last.timestamp {
                debug!(
                    given = %stored.timestamp,
                    last = %last.timestamp,
                    "Clamping log timestamp to keep the log ordered"
                );
                stored.timestamp = last.timestamp;
            }
        }

        let mut line = String::new();
        if !ends_with_newline(file).map_err(|e| LogError::io(&self.path, e))? {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&stored)?);
        line.push('\n');

        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| LogError::io(&self.path, e))?;

        Ok(stored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Lines,
    Array,
}

fn read_log(mut file: &File, path: &Path) -> Result<(Vec<LogEntry>, LogFormat), LogError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| LogError::io(path, e))?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| LogError::io(path, e))?;

    if text.trim_start().starts_with('[') {
        let entries = serde_json::from_str::<Vec<LogEntry>>(&text).map_err(|source| LogError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok((entries, LogFormat::Array));
    }

    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                path = %path.display(),
                line = number + 1,
                error = %e,
                "Skipping unreadable research log line"
            ),
        }
    }
    Ok((entries, LogFormat::Lines))
}

/// True for an empty file or one whose last byte is a newline.
fn ends_with_newline(mut file: &File) -> std::io::Result<bool> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn rank(
    entries: Vec<LogEntry>,
    query: &str,
    top_k: usize,
    threshold: f64,
    scorer: &dyn Relevance,
) -> Vec<LogMatch> {
    let mut scored: Vec<(usize, LogMatch)> = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let score = scorer.score(query, &entry.query);
            (index, LogMatch { entry, score })
        })
        .filter(|(_, m)| m.score >= threshold)
        .collect();

    scored.sort_by(|(ia, a), (ib, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.entry.timestamp.cmp(&a.entry.timestamp))
            .then_with(|| ib.cmp(ia))
    });

    scored.into_iter().take(top_k).map(|(_, m)| m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_log() -> (ResearchLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = ResearchLog::new(temp_dir.path().join("research_log.jsonl"));
        (log, temp_dir)
    }

    fn entry_at(query: &str, secs: i64) -> LogEntry {
        LogEntry {
            query: query.to_string(),
            response: format!("answer to {query}"),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            response_time_seconds: 1.0,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (log, _dir) = create_test_log();
        assert!(log.entries().unwrap().is_empty());
        assert!(log.find_relevant("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_append_then_read_in_order() {
        let (log, _dir) = create_test_log();
        for i in 0..5 {
            log.append(&entry_at(&format!("question {i}"), i)).unwrap();
        }

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 5);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.query, format!("question {i}"));
        }
    }

    #[test]
    fn test_timestamps_clamped_monotonic() {
        let (log, _dir) = create_test_log();
        log.append(&entry_at("first", 100)).unwrap();
        let stored = log.append(&entry_at("second", 50)).unwrap();

        assert_eq!(stored.timestamp, entry_at("x", 100).timestamp);
        let entries = log.entries().unwrap();
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn test_response_time_rounded() {
        let entry = LogEntry::new("q", "a", Duration::from_millis(1234));
        assert_eq!(entry.response_time_seconds, 1.23);
    }

    #[test]
    fn test_partial_trailing_line_skipped() {
        let (log, _dir) = create_test_log();
        log.append(&entry_at("complete", 0)).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        write!(file, "{{\"query\": \"half writ").unwrap();
        drop(file);

        assert_eq!(log.entries().unwrap().len(), 1);

        // the next append starts on a fresh line
        log.append(&entry_at("after crash", 1)).unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].query, "after crash");
    }

    #[test]
    fn test_find_relevant_orders_by_score_then_recency() {
        let (log, _dir) = create_test_log();
        log.append(&entry_at("capital of France", 0)).unwrap();
        log.append(&entry_at("What is the capital of France?", 10)).unwrap();
        log.append(&entry_at("capital of France", 20)).unwrap();
        log.append(&entry_at("rust ownership rules", 30)).unwrap();

        let matches = log.find_relevant("Capital of France", 5).unwrap();
        assert_eq!(matches.len(), 3);

        // two exact matches, newest first, then the containment match
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[0].entry.timestamp, entry_at("x", 20).timestamp);
        assert_eq!(matches[1].score, 1.0);
        assert_eq!(matches[1].entry.timestamp, entry_at("x", 0).timestamp);
        assert_eq!(matches[2].score, 0.9);

        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_find_relevant_respects_threshold_and_top_k() {
        let (log, _dir) = create_test_log();
        log.append(&entry_at("capital of France", 0)).unwrap();
        log.append(&entry_at("capital of France", 1)).unwrap();

        assert!(log.find_relevant("capital of Germany", 5).unwrap().is_empty());
        assert_eq!(log.find_relevant("capital of France", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_equal_timestamps_prefer_later_insertion() {
        let entries = vec![entry_at("same question", 0), entry_at("same question", 0)];
        let mut second = entries.clone();
        second[1].response = "newer".into();

        let matches = rank(second, "same question", 2, 0.5, &LexicalRelevance);
        assert_eq!(matches[0].entry.response, "newer");
    }

    #[test]
    fn test_custom_scorer() {
        struct Always(f64);
        impl Relevance for Always {
            fn score(&self, _: &str, _: &str) -> f64 {
                self.0
            }
        }

        let (log, _dir) = create_test_log();
        log.append(&entry_at("anything", 0)).unwrap();

        let log = log.with_scorer(Arc::new(Always(0.95)));
        let matches = log.find_relevant("unrelated", 5).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.95);
    }
}
