//! Status request.

use crate::response::StatusAnnounce;
use crate::{NetworkMessage, Request};
use serde::{Deserialize, Serialize};

/// Ask a peer to announce its current height.
///
/// Sent to every peer periodically so that announced heights keep up with
/// peers that are themselves still growing their chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusRequest;

impl NetworkMessage for StatusRequest {
    fn message_type_id() -> &'static str {
        "status.request"
    }
}

impl Request for StatusRequest {
    type Response = StatusAnnounce;
}
