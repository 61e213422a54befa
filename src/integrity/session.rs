//! Per-run scan statistics

use crate::integrity::detector::FileStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files skipped because an earlier, interrupted attempt of this run handled them
    pub resumed_files: usize,
    pub new_files: usize,
    pub unchanged_files: usize,
    pub changed_files: usize,
    pub corrupted_files: usize,
    /// Files that could not be read (prior fingerprint kept)
    pub unreadable_files: usize,
    /// Database entries dropped at clean-up
    pub pruned_entries: usize,
}

impl ScanStats {
    pub fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::New => self.new_files += 1,
            FileStatus::Unchanged => self.unchanged_files += 1,
            FileStatus::Changed => self.changed_files += 1,
            FileStatus::Corrupted => self.corrupted_files += 1,
        }
    }

    /// Files hashed during this process
    pub fn hashed_files(&self) -> usize {
        self.new_files + self.unchanged_files + self.changed_files + self.corrupted_files
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hashed ({} new, {} unchanged, {} changed, {} corrupted), {} resumed, {} unreadable, {} pruned",
            self.hashed_files(),
            self.new_files,
            self.unchanged_files,
            self.changed_files,
            self.corrupted_files,
            self.resumed_files,
            self.unreadable_files,
            self.pruned_entries
        )
    }
}
