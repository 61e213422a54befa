//! Console diagnostics
//!
//! Installs a global `tracing` subscriber writing to stderr. Run events are
//! persisted separately by [`crate::run_log`]; this layer only controls what
//! is echoed to the terminal (or to cron mail).

use tracing_subscriber::{fmt, EnvFilter};

/// Errors that may occur while initializing logging
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(String),
}

/// Install the subscriber. `RUST_LOG` wins over `verbosity` when set.
pub fn init(verbosity: u8) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::SetGlobal(e.to_string()))
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}
