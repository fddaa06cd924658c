// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Settings come from an optional TOML file; every field has a default, so
//! an empty file (or none at all) is valid:
//!
//! ```toml
//! url = "ws://localhost:3000/"
//! read_timeout_secs = 60
//! keepalive_interval_ms = 0   # 0 = half the read timeout
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{BackoffConfig, ClientConfig};

/// Default server URL.
pub const DEFAULT_URL: &str = "ws://localhost:3000/";

/// Client settings stored in a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Server URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,
    /// Read deadline in seconds (default: 60).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Write deadline in seconds (default: 30).
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Ping interval in milliseconds. 0 = half the read timeout.
    #[serde(default)]
    pub keepalive_interval_ms: u64,
    /// Wait after a probe before reading again, in milliseconds (default: 5000).
    #[serde(default = "default_probe_grace_ms")]
    pub probe_grace_ms: u64,
    /// Initial delay for exponential backoff in milliseconds (default: 100).
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts in seconds (default: 30).
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,
    /// Interval between directory scans in milliseconds (default: 1000).
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Seconds a sync round may stall before it is started over (default: 60).
    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_write_timeout_secs() -> u64 {
    30
}

fn default_probe_grace_ms() -> u64 {
    5000
}

fn default_reconnect_initial_delay_ms() -> u64 {
    100
}

fn default_reconnect_max_delay_secs() -> u64 {
    30
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_round_timeout_secs() -> u64 {
    60
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            url: default_url(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            keepalive_interval_ms: 0,
            probe_grace_ms: default_probe_grace_ms(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            scan_interval_ms: default_scan_interval_ms(),
            round_timeout_secs: default_round_timeout_secs(),
        }
    }
}

impl ClientSettings {
    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: ClientSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that the URL is a WebSocket URL and the timings are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(Error::InvalidUrl(self.url.clone()));
        }
        if self.read_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "read_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "write_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.scan_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "scan_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.round_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "round_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the transport configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            keepalive_interval: match self.keepalive_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            probe_grace: Duration::from_millis(self.probe_grace_ms),
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.reconnect_initial_delay_ms),
                max: Duration::from_secs(self.reconnect_max_delay_secs),
                ..BackoffConfig::default()
            },
        }
    }

    /// Interval between directory scans.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// How long a sync round may stall.
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
