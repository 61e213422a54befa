//! File fingerprint computation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const BUFFER_SIZE: usize = 1024 * 1024; // 1MB

/// Tracked files keyed by absolute path. Ordered so serialized output is stable.
pub type Database = BTreeMap<String, FileFingerprint>;

/// Paths already processed in the current run
pub type HandledSet = HashSet<String>;

/// Recorded `(content hash, modification time)` pair for a single file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Lowercase hex SHA-256 of the file content
    #[serde(rename = "hash")]
    pub content_hash: String,
    /// Seconds since the Unix epoch, with sub-second precision
    #[serde(rename = "mod_time")]
    pub modification_time: f64,
}

impl FileFingerprint {
    pub fn new(content_hash: impl Into<String>, modification_time: f64) -> Self {
        Self {
            content_hash: content_hash.into(),
            modification_time,
        }
    }

    /// Hash the file, then sample its modification time.
    ///
    /// The mtime is read after hashing so a write racing with the read shows up
    /// as a metadata change rather than as corruption.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let content_hash = hash_file_sha256(path)?;
        let modification_time = modification_time(path)?;
        Ok(Self {
            content_hash,
            modification_time,
        })
    }

    /// Whether the hash has the shape of a hex SHA-256 digest
    pub fn has_valid_hash(&self) -> bool {
        self.content_hash.len() == 64
            && self
                .content_hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

/// Stream the file through SHA-256 and return the lowercase hex digest
pub fn hash_file_sha256(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(to_hex(&hasher.finalize()))
}

/// Modification time of `path` as floating-point seconds since the epoch
pub fn modification_time(path: &Path) -> io::Result<f64> {
    let mtime = std::fs::metadata(path)?.modified()?;
    Ok(system_time_to_secs(mtime))
}

fn system_time_to_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs_f64(),
        // Pre-epoch timestamps are legal on most filesystems
        Err(e) => -e.duration().as_secs_f64(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
