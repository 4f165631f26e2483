//! Network messages for the fast-sync protocol.
//!
//! Four exchanges make up the protocol:
//!
//! | Request          | Response                               |
//! |------------------|----------------------------------------|
//! | `StatusRequest`  | `StatusAnnounce { height }`            |
//! | `BlockRequest`   | `BlockResponse` or `NoBlockResponse`   |
//!
//! `StatusAnnounce` is also sent unsolicited when a peer's height changes.

pub mod request;
pub mod response;

use serde::{Deserialize, Serialize};

pub use request::{BlockRequest, StatusRequest};
pub use response::{BlockResponse, NoBlockResponse, StatusAnnounce};

/// A message with a stable wire type identifier.
pub trait NetworkMessage {
    /// Identifier used by transports for routing and metrics.
    fn message_type_id() -> &'static str;
}

/// Type-safe request/response pairing.
pub trait Request: NetworkMessage {
    /// The message a well-behaved peer answers with.
    type Response;
}

/// Every message exchanged by sync peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Ask a peer for its current height.
    StatusRequest(StatusRequest),

    /// A peer's current height.
    StatusAnnounce(StatusAnnounce),

    /// Ask a peer for the block at a height.
    BlockRequest(BlockRequest),

    /// The requested block.
    BlockResponse(Box<BlockResponse>),

    /// The peer does not have the requested block.
    NoBlockResponse(NoBlockResponse),
}

impl SyncMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::StatusRequest(_) => StatusRequest::message_type_id(),
            SyncMessage::StatusAnnounce(_) => StatusAnnounce::message_type_id(),
            SyncMessage::BlockRequest(_) => BlockRequest::message_type_id(),
            SyncMessage::BlockResponse(_) => BlockResponse::message_type_id(),
            SyncMessage::NoBlockResponse(_) => NoBlockResponse::message_type_id(),
        }
    }

    /// Check if this message asks the receiver to answer from its store.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            SyncMessage::StatusRequest(_) | SyncMessage::BlockRequest(_)
        )
    }
}

impl From<StatusRequest> for SyncMessage {
    fn from(msg: StatusRequest) -> Self {
        SyncMessage::StatusRequest(msg)
    }
}

impl From<StatusAnnounce> for SyncMessage {
    fn from(msg: StatusAnnounce) -> Self {
        SyncMessage::StatusAnnounce(msg)
    }
}

impl From<BlockRequest> for SyncMessage {
    fn from(msg: BlockRequest) -> Self {
        SyncMessage::BlockRequest(msg)
    }
}

impl From<BlockResponse> for SyncMessage {
    fn from(msg: BlockResponse) -> Self {
        SyncMessage::BlockResponse(Box::new(msg))
    }
}

impl From<NoBlockResponse> for SyncMessage {
    fn from(msg: NoBlockResponse) -> Self {
        SyncMessage::NoBlockResponse(msg)
    }
}
