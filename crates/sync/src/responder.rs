//! Serving side of the protocol: answers peers' status and block requests
//! from the local store.

use fastsync_core::BlockStore;
use fastsync_messages::{BlockResponse, NoBlockResponse, StatusAnnounce, SyncMessage};
use fastsync_types::BlockHeight;

/// Answer a block request: the block if stored, otherwise "no block".
pub fn respond_to_block_request<S: BlockStore + ?Sized>(
    store: &S,
    height: BlockHeight,
) -> SyncMessage {
    match store.load_block(height) {
        Some(block) => BlockResponse::new(block).into(),
        None => NoBlockResponse::new(height).into(),
    }
}

/// Answer a status request with the stored height.
pub fn respond_to_status_request<S: BlockStore + ?Sized>(store: &S) -> SyncMessage {
    StatusAnnounce::new(store.height()).into()
}
