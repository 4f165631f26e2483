//! Event types for the sync state machine.

use fastsync_messages::SyncMessage;
use fastsync_types::{BlockHeight, PeerId};

/// Priority levels for event ordering within the same timestamp.
///
/// Lower values = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Control events: stop must overtake anything queued at the same instant.
    Control = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: peer lifecycle and inbound messages.
    Network = 2,
}

/// All possible events the sync state machine can receive.
///
/// Events are **passive data** - they describe something that happened.
/// Every input reaches the state machine through one ordered queue of these.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// Scan pending block requests for expired deadlines.
    TimeoutCheckTimer,

    /// Ask every peer for its current height.
    StatusUpdateTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Transport (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A sync peer connected and announced its height.
    PeerJoined { peer: PeerId, height: BlockHeight },

    /// A sync peer disconnected.
    PeerLeft { peer: PeerId },

    /// A message arrived from a peer.
    MessageReceived { from: PeerId, message: SyncMessage },

    // ═══════════════════════════════════════════════════════════════════════
    // Control (priority: Control)
    // ═══════════════════════════════════════════════════════════════════════
    /// Shut down. Every later event is ignored.
    Stop,
}

impl Event {
    /// Get the priority of this event for queue ordering.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::TimeoutCheckTimer | Event::StatusUpdateTimer => EventPriority::Timer,
            Event::PeerJoined { .. } | Event::PeerLeft { .. } | Event::MessageReceived { .. } => {
                EventPriority::Network
            }
            Event::Stop => EventPriority::Control,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TimeoutCheckTimer => "TimeoutCheckTimer",
            Event::StatusUpdateTimer => "StatusUpdateTimer",
            Event::PeerJoined { .. } => "PeerJoined",
            Event::PeerLeft { .. } => "PeerLeft",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::Stop => "Stop",
        }
    }

    /// The peer this event concerns, if any.
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            Event::PeerJoined { peer, .. } | Event::PeerLeft { peer } => Some(*peer),
            Event::MessageReceived { from, .. } => Some(*from),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastsync_messages::StatusRequest;

    #[test]
    fn test_priority_order() {
        assert!(EventPriority::Control < EventPriority::Timer);
        assert!(EventPriority::Timer < EventPriority::Network);

        assert_eq!(Event::Stop.priority(), EventPriority::Control);
        assert_eq!(Event::TimeoutCheckTimer.priority(), EventPriority::Timer);
        assert_eq!(
            Event::PeerLeft { peer: PeerId(1) }.priority(),
            EventPriority::Network
        );
    }

    #[test]
    fn test_event_peer() {
        let event = Event::MessageReceived {
            from: PeerId(4),
            message: StatusRequest.into(),
        };
        assert_eq!(event.peer(), Some(PeerId(4)));
        assert_eq!(Event::StatusUpdateTimer.peer(), None);
    }
}
