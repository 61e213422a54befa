//! Error kinds surfaced by the persistence and notification layers

use std::path::PathBuf;

/// Failures while reading or writing persistent scan state
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A state file exists but does not have the expected structure.
    /// Never recovered automatically: rewriting it could destroy the baseline.
    #[error("Corrupt state file {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize database: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures delivering a notification. Never allowed to abort a scan.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifications are not configured")]
    NotConfigured,

    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification rejected with HTTP status {status}")]
    Rejected { status: u16 },
}
