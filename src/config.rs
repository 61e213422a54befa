//! Configuration loading
//!
//! Settings come from (lowest to highest precedence) built-in defaults, an
//! optional `config.toml` in the state directory, environment variables and
//! finally command-line overrides. The resulting [`Config`] is immutable and
//! passed by reference to every component that needs it.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_DAYS_BETWEEN_RUNS: u64 = 14;

const CONFIG_FILE: &str = "config.toml";
const HOME_ENV: &str = "ROTWATCH_HOME";
const PUSHOVER_API_KEY_ENV: &str = "PUSHOVER_API_KEY";
const PUSHOVER_USER_KEY_ENV: &str = "PUSHOVER_USER_KEY";

/// Credentials for the Pushover notification service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushoverConfig {
    pub api_key: String,
    pub user_key: String,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding `data/`, `log/` and `errors/`
    pub state_dir: PathBuf,
    /// How often scan progress is checkpointed
    pub save_interval: Duration,
    /// Minimum number of days between two completed runs
    pub days_between_runs: u64,
    pub pushover: Option<PushoverConfig>,
}

/// On-disk shape of `config.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    state_dir: Option<PathBuf>,
    save_interval_secs: Option<u64>,
    days_between_runs: Option<u64>,
    pushover: Option<PushoverConfig>,
}

impl Config {
    /// Defaults rooted at `state_dir`
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            save_interval: Duration::from_secs(DEFAULT_SAVE_INTERVAL_SECS),
            days_between_runs: DEFAULT_DAYS_BETWEEN_RUNS,
            pushover: None,
        }
    }

    /// Load configuration from the environment and the optional config file
    pub fn load() -> Result<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir()?,
        };

        let mut config = Self::load_from(&home)?;
        config.apply_env(
            std::env::var(PUSHOVER_API_KEY_ENV).ok(),
            std::env::var(PUSHOVER_USER_KEY_ENV).ok(),
        );
        Ok(config)
    }

    /// Load `config.toml` from `home` if present, on top of the defaults
    pub fn load_from(home: &Path) -> Result<Self> {
        let mut config = Self::with_state_dir(home);
        let path = home.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Some(dir) = file.state_dir {
            config.state_dir = dir;
        }
        if let Some(secs) = file.save_interval_secs {
            config.save_interval = Duration::from_secs(secs);
        }
        if let Some(days) = file.days_between_runs {
            config.days_between_runs = days;
        }
        config.pushover = file.pushover;
        Ok(config)
    }

    /// Environment credentials replace file credentials, but only as a pair
    fn apply_env(&mut self, api_key: Option<String>, user_key: Option<String>) {
        if let (Some(api_key), Some(user_key)) = (api_key, user_key) {
            if !api_key.is_empty() && !user_key.is_empty() {
                self.pushover = Some(PushoverConfig { api_key, user_key });
            }
        }
    }

    pub fn apply_cli_overrides(&mut self, days_between_runs: Option<u64>) {
        if let Some(days) = days_between_runs {
            self.days_between_runs = days;
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.state_dir.join("data")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("log")
    }

    pub fn error_dir(&self) -> PathBuf {
        self.state_dir.join("errors")
    }
}

fn default_state_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "rotwatch")
        .context("Could not determine a data directory; set ROTWATCH_HOME")?;
    Ok(dirs.data_local_dir().to_path_buf())
}
