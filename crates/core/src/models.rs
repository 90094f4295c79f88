use chrono::{FixedOffset, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat tag-name to raw-value map for one local file, keys group-qualified
/// (`EXIF:DateTimeOriginal`, `QuickTime:CreationDate`).
pub type TagMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedOffset {
    Known(FixedOffset),
    Unknown,
}

impl EmbeddedOffset {
    pub fn known(self) -> Option<FixedOffset> {
        match self {
            EmbeddedOffset::Known(o) => Some(o),
            EmbeddedOffset::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileMetadata {
    pub path: PathBuf,
    pub local_timestamp: NaiveDateTime,
    pub offset: EmbeddedOffset,
    /// Tag the timestamp was read from.
    pub source_tag: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationDecision {
    pub target_timestamp: NaiveDateTime,
    pub target_offset: FixedOffset,
    /// Absent in file-less mode.
    pub matched_path: Option<PathBuf>,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Filtered,
    Duplicate,
    NoMatch,
    Ambiguous,
    Metadata,
    UnresolvedOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Reported,
    AlreadyCorrect,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUpdate {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub seen: usize,
    pub applied: usize,
    pub reported: usize,
    pub already_correct: usize,
    pub filtered: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailedUpdate>,
}

impl RunSummary {
    pub fn record(&mut self, id: &str, outcome: &Outcome) {
        self.seen += 1;
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Reported => self.reported += 1,
            Outcome::AlreadyCorrect => self.already_correct += 1,
            Outcome::Skipped(SkipReason::Filtered) => self.filtered += 1,
            Outcome::Skipped(SkipReason::NoMatch) | Outcome::Skipped(SkipReason::Ambiguous) => {
                self.unmatched += 1
            }
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(error) => {
                self.failed += 1;
                self.failures.push(FailedUpdate {
                    id: id.to_string(),
                    error: error.clone(),
                });
            }
        }
    }
}
