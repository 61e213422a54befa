//! Per-run log files
//!
//! Each run writes two append-only files named after the run's start time:
//! - `log/<start>.log`: one `<epoch-seconds>: <LEVEL>: <message>` line per event
//! - `errors/<start>.log`: one line per detected corruption
//!
//! Events are mirrored to `tracing` so they also reach the console.

use crate::config::Config;
use crate::integrity::FileFingerprint;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Severity of a run-log event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Informational log for a single run
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Prepare `log/<started_at>.log`; the file is created on first write
    pub fn create(config: &Config, started_at: DateTime<Utc>) -> Result<Self> {
        let dir = config.log_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        Ok(Self {
            path: dir.join(run_file_name(started_at)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message.as_ref());
    }

    /// Append one event. A failing log write is reported on the console only;
    /// it never interrupts the scan.
    pub fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!("{}", message),
            Level::Warn => tracing::warn!("{}", message),
            Level::Error => tracing::error!("{}", message),
        }

        let line = format!("{}: {}: {}\n", Utc::now().timestamp(), level.as_str(), message);
        if let Err(e) = append_line(&self.path, &line) {
            tracing::error!("Failed to write run log {}: {}", self.path.display(), e);
        }
    }
}

/// Corruption record log for a single run
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Prepare `errors/<started_at>.log`; the file only appears if something is recorded
    pub fn create(config: &Config, started_at: DateTime<Utc>) -> Result<Self> {
        let dir = config.error_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create error directory: {}", dir.display()))?;
        Ok(Self {
            path: dir.join(run_file_name(started_at)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a corruption record: the path with its old and new fingerprints
    pub fn record(&self, path: &str, old: &FileFingerprint, new: &FileFingerprint) -> Result<()> {
        let line = format!(
            "{}: OLD: {} != NEW: {}\n",
            path,
            serde_json::to_string(old)?,
            serde_json::to_string(new)?
        );
        append_line(&self.path, &line)
            .with_context(|| format!("Failed to write error log: {}", self.path.display()))
    }
}

fn run_file_name(started_at: DateTime<Utc>) -> String {
    format!("{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
