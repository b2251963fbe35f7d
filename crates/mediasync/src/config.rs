//! Application configuration
//!
//! Settings come from a TOML file, then environment variables, then command
//! line flags, each layer overriding the previous one. Every section falls
//! back to its defaults, so an empty file is a valid configuration.

use anyhow::{bail, Context, Result};
use mediasync_control::{FollowerConfig, WebServerConfig};
use mediasync_core::{BeaconConfig, LogConfig, ReconcilerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "mediasync.toml";

/// Server-side surface mirroring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Mirror every event onto a local surface
    pub enabled: bool,
    /// Drift tolerated before the mirror seeks
    pub tolerance_secs: f64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tolerance_secs: ReconcilerConfig::default().tolerance_secs,
        }
    }
}

impl MirrorConfig {
    /// Reconciler settings for the mirror
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            tolerance_secs: self.tolerance_secs,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server, CORS and auth
    pub server: WebServerConfig,
    /// Clock beacon
    pub beacon: BeaconConfig,
    /// Follower settings used by `follow` and `send`
    pub sync: FollowerConfig,
    /// Logging
    pub logging: LogConfig,
    /// Surface mirror
    pub mirror: MirrorConfig,
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `PORT`, `MEDIASYNC_HOST` and `MEDIASYNC_API_KEY`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.server.port = match port.trim().parse() {
                Ok(port) => port,
                Err(_) => bail!("PORT must be a port number, got '{}'", port),
            };
        }
        if let Some(host) = lookup("MEDIASYNC_HOST") {
            self.server.host = host.trim().to_string();
        }
        if let Some(key) = lookup("MEDIASYNC_API_KEY").filter(|k| !k.trim().is_empty()) {
            let key = key.trim().to_string();
            self.server.auth.add_key(&key);
            self.sync.api_key = Some(key);
        }
        Ok(())
    }
}
