//! Domain-separated signing messages.
//!
//! A block seal is the chain validator's signature over the block hash.
//! The chain id and height are part of the signed message so a seal from
//! one chain (or one height) cannot be replayed on another.
//!
//! Format: `block_seal:` || chain_id || height || block_hash

use crate::{BlockHeight, Hash};

/// Domain tag for block seals.
pub const DOMAIN_BLOCK_SEAL: &[u8] = b"block_seal:";

/// Build the signing message for a block seal.
pub fn block_seal_message(chain_id: &Hash, height: BlockHeight, block_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_BLOCK_SEAL.len() + 72);
    message.extend_from_slice(DOMAIN_BLOCK_SEAL);
    message.extend_from_slice(chain_id.as_bytes());
    message.extend_from_slice(&height.0.to_le_bytes());
    message.extend_from_slice(block_hash.as_bytes());
    message
}
