//! Core data models used throughout Codebrief.
//!
//! These types represent the source units, extracted functions, chunks, and
//! summary results that flow through the harvesting and summarization pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Descriptor for one file to be summarized, produced by a source provider.
///
/// The raw text is fetched separately via `SourceProvider::fetch`; a unit is
/// immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUnit {
    /// Source label (e.g. `"filesystem"`, `"github"`).
    pub source: String,
    /// Root-relative path, used as the stable unit identifier.
    pub path: String,
    /// Browsable URL for the unit, when one exists.
    pub url: Option<String>,
}

/// A function definition located within a source unit's text.
///
/// The byte span is exact: slicing the unit text at `[start_byte, end_byte)`
/// reproduces the function's source losslessly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub name: String,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based line numbers.
    pub start_line: usize,
    pub end_line: usize,
    /// Byte offsets of the statement-level split points inside the function
    /// body (start of each direct child statement), ascending. These are the
    /// only legal boundaries when the function must be split across chunks.
    pub statement_starts: Vec<usize>,
}

impl FunctionSpan {
    /// Re-slice the owning unit's text at this span.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start_byte..self.end_byte]
    }
}

/// A budget-bounded text segment submitted to a backend in one call.
///
/// Chunks from one subject carry contiguous indices starting at 0 and
/// preserve source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub unit_path: String,
    /// Owning function name, or `None` in whole-file fallback mode.
    pub function: Option<String>,
    pub index: usize,
    pub text: String,
    /// SHA-256 of the chunk text.
    pub hash: String,
}

/// What a summary entry describes: one function, or a whole file when no
/// functions were extracted (or the unit failed before extraction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Function { name: String, params: Vec<String> },
    File,
}

impl Subject {
    /// Short human-readable label (`"simple()"` or `"<file>"`).
    pub fn label(&self) -> String {
        match self {
            Subject::Function { name, params } => format!("{}({})", name, params.join(", ")),
            Subject::File => "<file>".to_string(),
        }
    }
}

/// Outcome of summarizing one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Succeeded { text: String },
    Failed { reason: String },
}

/// Per-chunk record inside a summary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

/// Entry-level status. An entry succeeds only if every chunk succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Succeeded,
    Failed { reason: String },
}

/// One summary result: a function-level (or file-level) subject, its
/// per-chunk outcomes, and the aggregate summary text assembled by
/// concatenating succeeded chunk summaries in chunk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    /// Path of the owning source unit.
    pub unit: String,
    pub subject: Subject,
    /// Backend name that produced the summaries.
    pub backend: String,
    pub chunks: Vec<ChunkSummary>,
    pub summary: String,
    pub status: EntryStatus,
}

impl SummaryEntry {
    /// Build a failed file-level entry for a unit that could not be
    /// processed (fetch, parse, or chunking failure).
    pub fn failed_unit(unit: &str, backend: &str, reason: impl Into<String>) -> Self {
        Self {
            unit: unit.to_string(),
            subject: Subject::File,
            backend: backend.to_string(),
            chunks: Vec::new(),
            summary: String::new(),
            status: EntryStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, EntryStatus::Succeeded)
    }
}

/// Aggregate entry counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub succeeded: usize,
    pub failed: usize,
    /// Units never dispatched (cancellation).
    pub skipped: usize,
}

/// Ordered per-subject outcome record produced by one run.
///
/// Entries appear in unit discovery order and, within a unit, in extraction
/// order. Ordering is deterministic regardless of retries or concurrency.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub backend: String,
    pub units_discovered: usize,
    pub entries: Vec<SummaryEntry>,
    pub counts: ReportCounts,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Recompute entry counts, preserving the skipped count.
    pub fn tally(&mut self) {
        let skipped = self.counts.skipped;
        let succeeded = self.entries.iter().filter(|e| e.is_succeeded()).count();
        self.counts = ReportCounts {
            succeeded,
            failed: self.entries.len() - succeeded,
            skipped,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_slice_roundtrip() {
        let source = "x = 1\ndef f(a):\n    return a\n";
        let span = FunctionSpan {
            name: "f".into(),
            params: vec!["a".into()],
            start_byte: 6,
            end_byte: 28,
            start_line: 2,
            end_line: 3,
            statement_starts: vec![20],
        };
        assert_eq!(span.slice(source), "def f(a):\n    return a");
    }

    #[test]
    fn test_subject_label() {
        let f = Subject::Function {
            name: "parse".into(),
            params: vec!["text".into(), "strict".into()],
        };
        assert_eq!(f.label(), "parse(text, strict)");
        assert_eq!(Subject::File.label(), "<file>");
    }

    #[test]
    fn test_tally_preserves_skipped() {
        let mut report = BatchReport {
            backend: "fake".into(),
            units_discovered: 3,
            entries: vec![
                SummaryEntry {
                    unit: "a.py".into(),
                    subject: Subject::File,
                    backend: "fake".into(),
                    chunks: vec![],
                    summary: "ok".into(),
                    status: EntryStatus::Succeeded,
                },
                SummaryEntry::failed_unit("b.py", "fake", "parse error"),
            ],
            counts: ReportCounts {
                succeeded: 0,
                failed: 0,
                skipped: 1,
            },
            started_at: Utc::now(),
            elapsed_ms: 0,
        };
        report.tally();
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.skipped, 1);
    }
}
