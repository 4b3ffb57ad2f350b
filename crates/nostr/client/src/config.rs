//! Client configuration

use crate::error::{ClientError, Result};
use crate::recovery::{ExponentialBackoff, duration_ms};
use crate::relay::RelayConfig;
use crate::subscription::FetchOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the user config dir that holds client files.
pub const APP_DIR: &str = "classroom";

/// Comma-separated relay list that replaces the configured relays.
pub const RELAYS_ENV: &str = "NOSTR_RELAYS";

/// Relay and timing settings shared by every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relays to connect to
    pub relays: Vec<String>,
    /// Timeout for a single connection attempt
    #[serde(with = "duration_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    /// Quiet period after every relay sent EOSE
    #[serde(with = "duration_ms", rename = "idle_timeout_ms")]
    pub idle_timeout: Duration,
    /// Ceiling on a single query
    #[serde(with = "duration_ms", rename = "hard_timeout_ms")]
    pub hard_timeout: Duration,
    /// How long to wait for each relay's `OK`
    #[serde(with = "duration_ms", rename = "ack_timeout_ms")]
    pub ack_timeout: Duration,
    /// Connection retry policy
    pub retry: ExponentialBackoff,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let fetch = FetchOptions::default();
        Self {
            relays: crate::DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: fetch.idle_timeout,
            hard_timeout: fetch.hard_timeout,
            ack_timeout: Duration::from_secs(5),
            retry: ExponentialBackoff::default(),
        }
    }
}

impl ClientConfig {
    /// Load from the default path, falling back to defaults, then apply
    /// `NOSTR_RELAYS`.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(relays) = std::env::var(RELAYS_ENV) {
            config.apply_relay_override(&relays);
        }
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `~/.config/classroom/nostr.toml` on Linux.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join(APP_DIR).join("nostr.toml"))
    }

    /// Replace the relay list with the entries of a comma-separated value.
    /// Blank values leave the list unchanged.
    pub fn apply_relay_override(&mut self, value: &str) {
        let relays: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !relays.is_empty() {
            self.relays = relays;
        }
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_timeout: self.connect_timeout,
            retry: self.retry.clone(),
            ..RelayConfig::default()
        }
    }

    /// Fresh query options with this config's timeouts.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            ..FetchOptions::default()
        }
    }
}
