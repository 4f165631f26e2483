//! Block fetch request.

use crate::response::BlockResponse;
use crate::{NetworkMessage, Request};
use fastsync_types::BlockHeight;
use serde::{Deserialize, Serialize};

/// Request to fetch the full block at a height during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRequest {
    /// Height of the block being requested
    pub height: BlockHeight,
}

impl BlockRequest {
    /// Create a new block fetch request.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }
}

impl NetworkMessage for BlockRequest {
    fn message_type_id() -> &'static str {
        "block.request"
    }
}

/// BlockRequest expects BlockResponse (or NoBlockResponse when the peer lacks it).
impl Request for BlockRequest {
    type Response = BlockResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_request() {
        let request = BlockRequest::new(BlockHeight(100));
        assert_eq!(request.height, BlockHeight(100));
    }
}
