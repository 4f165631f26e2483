//! Action types for the sync state machine.

use crate::TimerId;
use fastsync_messages::SyncMessage;
use fastsync_types::{BlockHeight, PeerId};
use std::fmt;
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes them against its transport and timer facility and
/// converts results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send a message to one peer.
    SendToPeer { peer: PeerId, message: SyncMessage },

    /// Send a message to every connected peer.
    Broadcast { message: SyncMessage },

    /// Drop the connection to a peer that was evicted.
    DisconnectPeer {
        peer: PeerId,
        reason: EvictionReason,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration, replacing any pending one.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Sync reached a terminal phase. Emitted exactly once per state machine.
    SyncCompleted { outcome: SyncOutcome },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SendToPeer { .. } => "SendToPeer",
            Action::Broadcast { .. } => "Broadcast",
            Action::DisconnectPeer { .. } => "DisconnectPeer",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::SyncCompleted { .. } => "SyncCompleted",
        }
    }
}

/// Why a peer was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The peer delivered blocks that failed verification.
    BadBlock { height: BlockHeight },

    /// The peer let requests expire too many times in a row.
    Timeouts { strikes: u32 },
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::BadBlock { height } => write!(f, "bad block at {}", height),
            EvictionReason::Timeouts { strikes } => write!(f, "{} request timeouts", strikes),
        }
    }
}

/// How a sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Caught up with the peers; `height` is the last applied block.
    Finished { height: BlockHeight },

    /// Stopped explicitly before (or after) catching up.
    Stopped { height: BlockHeight },
}

impl SyncOutcome {
    /// Last applied height at the time the run ended.
    pub fn height(&self) -> BlockHeight {
        match self {
            SyncOutcome::Finished { height } | SyncOutcome::Stopped { height } => *height,
        }
    }

    /// Whether the run caught up.
    pub fn is_finished(&self) -> bool {
        matches!(self, SyncOutcome::Finished { .. })
    }
}
