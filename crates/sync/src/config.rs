//! Sync configuration.

use crate::ConfigError;
use std::time::Duration;

/// Configuration for the sync protocol.
///
/// Constructed once and handed to the state machine; nothing reads tunables
/// from global state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a block request may stay unanswered before it expires.
    pub request_timeout: Duration,

    /// Maximum number of requests in flight to a single peer.
    pub max_pending_per_peer: usize,

    /// Size of the request window starting at the lowest unapplied height.
    /// Bounds the number of buffered blocks.
    pub request_batch_size: u64,

    /// Timeout passes a peer may fail in a row before it is evicted.
    pub max_timeout_strikes: u32,

    /// Bad blocks a peer may deliver before it is evicted.
    /// 1 evicts on the first bad block.
    pub max_bad_block_strikes: u32,

    /// Interval of the timer that scans for expired requests.
    /// Must be shorter than `request_timeout`.
    pub timeout_check_interval: Duration,

    /// Interval at which peers are asked to re-announce their height.
    pub status_update_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_pending_per_peer: 20,
            request_batch_size: 40,
            max_timeout_strikes: 3,
            max_bad_block_strikes: 1,
            timeout_check_interval: Duration::from_secs(1),
            status_update_interval: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Create a config with a custom request window.
    pub fn with_batch_size(request_batch_size: u64) -> Self {
        Self {
            request_batch_size,
            ..Default::default()
        }
    }

    /// Check the values are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_batch_size == 0 {
            return Err(ConfigError::Zero("request_batch_size"));
        }
        if self.max_pending_per_peer == 0 {
            return Err(ConfigError::Zero("max_pending_per_peer"));
        }
        if self.max_timeout_strikes == 0 {
            return Err(ConfigError::Zero("max_timeout_strikes"));
        }
        if self.max_bad_block_strikes == 0 {
            return Err(ConfigError::Zero("max_bad_block_strikes"));
        }
        if self.timeout_check_interval.is_zero() {
            return Err(ConfigError::Zero("timeout_check_interval"));
        }
        if self.status_update_interval.is_zero() {
            return Err(ConfigError::Zero("status_update_interval"));
        }
        if self.timeout_check_interval >= self.request_timeout {
            return Err(ConfigError::TickNotShorterThanTimeout {
                tick: self.timeout_check_interval,
                timeout: self.request_timeout,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(SyncConfig::default().validate(), Ok(()));
        assert_eq!(SyncConfig::with_batch_size(128).request_batch_size, 128);
    }

    #[test]
    fn test_rejects_zero_values() {
        let config = SyncConfig {
            request_batch_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("request_batch_size"))
        );

        let config = SyncConfig {
            max_bad_block_strikes: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("max_bad_block_strikes"))
        );
    }

    #[test]
    fn test_tick_must_be_shorter_than_timeout() {
        let config = SyncConfig {
            request_timeout: Duration::from_secs(1),
            timeout_check_interval: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TickNotShorterThanTimeout { .. })
        ));
    }
}
