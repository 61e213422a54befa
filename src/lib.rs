//! Rotwatch library crate
//!
//! Detects silent data corruption ("bit rot") by periodically fingerprinting a
//! directory tree and comparing each file against its last known-good state.
//! Scans are resumable: progress is checkpointed so a killed process picks up
//! where it left off.

pub mod cli;
pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod notify;
pub mod progress;
pub mod run_log;
pub mod scanner;
pub mod schedule;
