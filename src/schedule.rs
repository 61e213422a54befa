//! Timing policies: when to checkpoint during a scan and whether to start one

use crate::config::Config;
use crate::integrity::Store;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::time::{Duration, Instant};

/// Triggers a periodic save while a scan is running
#[derive(Debug, Clone)]
pub struct CheckpointTimer {
    interval: Duration,
    last_save: Instant,
}

impl CheckpointTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: Instant::now(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.save_interval)
    }

    /// Whether more than `interval` has elapsed since the last save
    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    pub fn is_due_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_save) > self.interval
    }

    /// Restart the interval after a successful save
    pub fn reset(&mut self) {
        self.last_save = Instant::now();
    }
}

/// Outcome of the pre-scan scheduling check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// A checkpoint exists: an earlier run was interrupted
    Resume,
    /// No run has ever completed
    FirstRun,
    /// The run record could not be read; start rather than risk never scanning
    UnreadableRecord,
    /// Enough days have passed since the last completed run
    Due { days_elapsed: i64 },
    /// The last completed run is too recent
    NotDue { days_elapsed: i64 },
}

impl RunDecision {
    pub fn should_run(self) -> bool {
        !matches!(self, RunDecision::NotDue { .. })
    }
}

impl fmt::Display for RunDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDecision::Resume => write!(f, "A previous run was unfinished. Continuing."),
            RunDecision::FirstRun => write!(f, "No completed run found. Starting a new one."),
            RunDecision::UnreadableRecord => {
                write!(f, "Last run record is unreadable. Starting a new run.")
            }
            RunDecision::Due { days_elapsed } => write!(
                f,
                "Last run finished {} days ago. Starting a new one.",
                days_elapsed
            ),
            RunDecision::NotDue { days_elapsed } => write!(
                f,
                "Last run finished {} days ago. Not running now.",
                days_elapsed
            ),
        }
    }
}

/// Decides whether a new scan should start
#[derive(Debug, Clone, Copy)]
pub struct RunScheduler {
    days_between_runs: u64,
}

impl RunScheduler {
    pub fn new(days_between_runs: u64) -> Self {
        Self { days_between_runs }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.days_between_runs)
    }

    pub fn decide(&self, store: &Store) -> RunDecision {
        self.decide_at(store, Utc::now())
    }

    pub fn decide_at(&self, store: &Store, now: DateTime<Utc>) -> RunDecision {
        if store.has_checkpoint() {
            return RunDecision::Resume;
        }

        match store.last_run_finished() {
            Ok(None) => RunDecision::FirstRun,
            Ok(Some(finished)) => self.decide_elapsed(now - finished),
            Err(e) => {
                tracing::warn!("Failed to read last run record: {}", e);
                RunDecision::UnreadableRecord
            }
        }
    }

    fn decide_elapsed(&self, elapsed: ChronoDuration) -> RunDecision {
        let days_elapsed = elapsed.num_days();
        let threshold = i64::try_from(self.days_between_runs).unwrap_or(i64::MAX);
        let due = ChronoDuration::try_days(threshold)
            .map(|min_gap| elapsed > min_gap)
            .unwrap_or(false);

        if due {
            RunDecision::Due { days_elapsed }
        } else {
            RunDecision::NotDue { days_elapsed }
        }
    }
}
