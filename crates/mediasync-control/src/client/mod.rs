//! Followers
//!
//! A follower mirrors the authoritative state onto a local surface, either by
//! polling `GET /api/status` or by listening on the push channel.

mod poll;
mod push;

pub use poll::{PollClient, PollFollower};
pub use push::PushFollower;

use mediasync_core::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ControlError;

/// How a follower learns about the authoritative state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowerMode {
    /// Periodic `GET /api/status`
    Poll,
    /// WebSocket push channel
    #[default]
    Push,
}

impl fmt::Display for FollowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowerMode::Poll => write!(f, "poll"),
            FollowerMode::Push => write!(f, "push"),
        }
    }
}

impl FromStr for FollowerMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(FollowerMode::Poll),
            "push" => Ok(FollowerMode::Push),
            other => Err(ControlError::InvalidMessage(format!(
                "Unknown follower mode '{}'",
                other
            ))),
        }
    }
}

/// Follower settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:5000`
    pub server_url: String,
    /// API key, if the server requires one
    pub api_key: Option<String>,
    /// Poll or push
    pub mode: FollowerMode,
    /// Poll period
    pub poll_interval_ms: u64,
    /// Delay before reconnecting a dropped push channel
    pub reconnect_delay_ms: u64,
    /// HTTP request timeout
    pub request_timeout_ms: u64,
    /// Drift tolerated before seeking
    pub tolerance_secs: f64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            api_key: None,
            mode: FollowerMode::default(),
            poll_interval_ms: 1000,
            reconnect_delay_ms: 2000,
            request_timeout_ms: 5000,
            tolerance_secs: ReconcilerConfig::default().tolerance_secs,
        }
    }
}

impl FollowerConfig {
    /// Follow `server_url`
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Poll period, never below 50 ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    /// Reconnect delay
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    /// Reconciler settings
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            tolerance_secs: self.tolerance_secs,
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Push channel URL, with the API key as query parameter if set
    pub fn ws_url(&self) -> String {
        let base = self.base_url();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };

        match &self.api_key {
            Some(key) => {
                let key: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
                format!("{}/ws?api_key={}", base, key)
            }
            None => format!("{}/ws", base),
        }
    }
}
