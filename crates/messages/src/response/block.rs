//! Block fetch responses.

use crate::NetworkMessage;
use fastsync_types::{Block, BlockHeight};
use serde::{Deserialize, Serialize};

/// Response to a block fetch request containing the full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    /// The requested block. Its height identifies the request it answers.
    pub block: Block,
}

impl BlockResponse {
    /// Create a response carrying `block`.
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// Height of the carried block.
    pub fn height(&self) -> BlockHeight {
        self.block.height()
    }

    /// Consume and return the block.
    pub fn into_block(self) -> Block {
        self.block
    }
}

impl NetworkMessage for BlockResponse {
    fn message_type_id() -> &'static str {
        "block.response"
    }
}

/// The peer does not have the requested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoBlockResponse {
    /// Height that was requested.
    pub height: BlockHeight,
}

impl NoBlockResponse {
    /// Create a not-found response for `height`.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }
}

impl NetworkMessage for NoBlockResponse {
    fn message_type_id() -> &'static str {
        "block.none"
    }
}
