//! Status announcement.

use crate::NetworkMessage;
use fastsync_types::BlockHeight;
use serde::{Deserialize, Serialize};

/// A peer's highest stored block height.
///
/// Self-reported and advisory: a peer may claim a height it cannot serve,
/// which the requester learns through `NoBlockResponse` or a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAnnounce {
    /// Highest block height this node has stored.
    pub height: BlockHeight,
}

impl StatusAnnounce {
    /// Create a new status announcement.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }
}

impl NetworkMessage for StatusAnnounce {
    fn message_type_id() -> &'static str {
        "status.announce"
    }
}
