//! Corruption classification

use crate::integrity::fingerprint::FileFingerprint;

/// State of a file compared to its recorded fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Path not seen before
    New,
    /// Content hash matches the recorded one
    Unchanged,
    /// Content changed while the modification time did not
    Corrupted,
    /// Content and modification time both changed (ordinary edit)
    Changed,
}

impl FileStatus {
    /// Whether the recorded fingerprint must be replaced by the observed one.
    ///
    /// Corrupted files are updated too, so the same damage is reported once.
    pub fn needs_update(self) -> bool {
        !matches!(self, FileStatus::Unchanged)
    }
}

/// Classify a freshly computed `(hash, mtime)` against the prior fingerprint.
///
/// Rules are applied in order: no prior entry, matching hash, matching mtime
/// with a different hash, and finally a different hash and mtime.
pub fn classify(
    prior: Option<&FileFingerprint>,
    current_hash: &str,
    current_mtime: f64,
) -> FileStatus {
    let Some(prior) = prior else {
        return FileStatus::New;
    };

    if prior.content_hash == current_hash {
        return FileStatus::Unchanged;
    }

    if prior.modification_time == current_mtime {
        FileStatus::Corrupted
    } else {
        FileStatus::Changed
    }
}
