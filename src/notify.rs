//! Corruption alerts
//!
//! The scanner only depends on the [`Notifier`] trait. Delivery failures are
//! returned as [`NotifyError`] so they can be logged, but callers must never
//! let them interrupt a scan.

use crate::config::{Config, PushoverConfig};
use crate::error::NotifyError;
use serde::Serialize;
use std::time::Duration;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A channel that accepts `(title, message)` alerts
pub trait Notifier {
    fn send(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Build the notifier described by `config`
pub fn from_config(config: &Config) -> Box<dyn Notifier> {
    match &config.pushover {
        Some(pushover) => Box::new(PushoverNotifier::new(pushover.clone())),
        None => Box::new(DisabledNotifier),
    }
}

/// Used when no notification credentials are configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn send(&self, _title: &str, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

#[derive(Serialize)]
struct PushoverMessage<'a> {
    token: &'a str,
    user: &'a str,
    title: &'a str,
    message: &'a str,
    html: u8,
}

/// Sends alerts through the Pushover HTTP API
pub struct PushoverNotifier {
    credentials: PushoverConfig,
    agent: ureq::Agent,
}

impl PushoverNotifier {
    pub fn new(credentials: PushoverConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { credentials, agent }
    }
}

impl Notifier for PushoverNotifier {
    fn send(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let body = PushoverMessage {
            token: &self.credentials.api_key,
            user: &self.credentials.user_key,
            title,
            message,
            html: 1,
        };

        match self
            .agent
            .post(PUSHOVER_URL)
            .set("User-Agent", "rotwatch")
            .send_json(&body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) => Err(NotifyError::Rejected { status }),
            Err(e) => Err(NotifyError::Transport(e.to_string())),
        }
    }
}
