/// Rolling log of per-file outcomes
///
/// Kept for operator visibility only; counters are the source of truth.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;

/// How many outcomes a job keeps
pub const LOG_CAPACITY: usize = 200;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Skipped,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

/// One per-file result
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct OutcomeLog {
    entries: VecDeque<FileOutcome>,
    capacity: usize,
}

impl OutcomeLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, entry: FileOutcome) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The `n` most recent outcomes, oldest first
    pub(crate) fn recent(&self, n: usize) -> Vec<FileOutcome> {
        let skip = self.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
