//! Sync error types.

use fastsync_core::{ApplyError, StoreError};
use fastsync_types::{BlockHeight, PeerId};
use std::time::Duration;
use thiserror::Error;

/// Faults raised by the peer tracker and block pool.
///
/// None of these are fatal: the state machine logs them and either ignores
/// the input or recovers by evicting a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Operation on a peer that is not tracked.
    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    /// Peer registered twice.
    #[error("Peer {0} is already tracked")]
    DuplicatePeer(PeerId),

    /// No peer can currently serve this height. The height is deferred.
    #[error("No eligible peer for {0}")]
    NoEligiblePeer(BlockHeight),

    /// Response that does not match a pending request for that peer.
    #[error("Unexpected response for {height} from {peer}")]
    UnexpectedBlock { peer: PeerId, height: BlockHeight },

    /// Block failed verification or application.
    #[error("Bad block at {height} from {peer}: {source}")]
    BadBlock {
        peer: PeerId,
        height: BlockHeight,
        #[source]
        source: ApplyError,
    },

    /// Verified block could not be persisted. It stays buffered.
    #[error("Failed to persist block at {height}: {source}")]
    Store {
        height: BlockHeight,
        #[source]
        source: StoreError,
    },
}

/// Invalid sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A count or interval that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Expired requests could go unnoticed for longer than the timeout itself.
    #[error("Timeout check interval {tick:?} must be shorter than request timeout {timeout:?}")]
    TickNotShorterThanTimeout { tick: Duration, timeout: Duration },
}
