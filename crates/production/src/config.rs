//! Runner configuration loaded from TOML.
//!
//! ```toml
//! event_channel_capacity = 4096
//!
//! [sync]
//! request_timeout_ms = 15000
//! max_pending_per_peer = 20
//! request_batch_size = 40
//!
//! [rate_limit]
//! requests_per_sec = 1000
//! burst = 200
//!
//! [telemetry]
//! log_filter = "info,fastsync_sync=debug"
//! ```
//!
//! Every field is optional and falls back to the defaults below.

use crate::network::RateLimitConfig;
use fastsync_sync::{ConfigError, SyncConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid sync configuration: {0}")]
    Sync(#[from] ConfigError),

    #[error("Event channel capacity must be non-zero")]
    ZeroChannelCapacity,
}

/// Top-level runner configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Capacity of the inbound network event queue.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,
}

fn default_event_channel_capacity() -> usize {
    4096
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            sync: SyncSection::default(),
            rate_limit: RateLimitSection::default(),
            telemetry: TelemetrySection::default(),
        }
    }
}

impl RunnerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, RunnerConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunnerConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        if self.event_channel_capacity == 0 {
            return Err(RunnerConfigError::ZeroChannelCapacity);
        }
        self.sync_config().validate()?;
        Ok(())
    }

    /// Sync tunables for the state machine.
    pub fn sync_config(&self) -> SyncConfig {
        let s = &self.sync;
        SyncConfig {
            request_timeout: Duration::from_millis(s.request_timeout_ms),
            max_pending_per_peer: s.max_pending_per_peer,
            request_batch_size: s.request_batch_size,
            max_timeout_strikes: s.max_timeout_strikes,
            max_bad_block_strikes: s.max_bad_block_strikes,
            timeout_check_interval: Duration::from_millis(s.timeout_check_interval_ms),
            status_update_interval: Duration::from_millis(s.status_update_interval_ms),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_sec: self.rate_limit.requests_per_sec,
            burst: self.rate_limit.burst,
            peer_ttl: Duration::from_secs(self.rate_limit.peer_ttl_secs),
        }
    }
}

/// `[sync]` table. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub request_timeout_ms: u64,
    pub max_pending_per_peer: usize,
    pub request_batch_size: u64,
    pub max_timeout_strikes: u32,
    pub max_bad_block_strikes: u32,
    pub timeout_check_interval_ms: u64,
    pub status_update_interval_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        let d = SyncConfig::default();
        Self {
            request_timeout_ms: d.request_timeout.as_millis() as u64,
            max_pending_per_peer: d.max_pending_per_peer,
            request_batch_size: d.request_batch_size,
            max_timeout_strikes: d.max_timeout_strikes,
            max_bad_block_strikes: d.max_bad_block_strikes,
            timeout_check_interval_ms: d.timeout_check_interval.as_millis() as u64,
            status_update_interval_ms: d.status_update_interval.as_millis() as u64,
        }
    }
}

/// `[rate_limit]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    pub requests_per_sec: u32,
    pub burst: u32,
    pub peer_ttl_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let d = RateLimitConfig::default();
        Self {
            requests_per_sec: d.requests_per_sec,
            burst: d.burst,
            peer_ttl_secs: d.peer_ttl.as_secs(),
        }
    }
}

/// `[telemetry]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    /// Filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
        }
    }
}
