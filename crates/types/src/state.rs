//! Chain state threaded through block application.

use crate::{Block, BlockHeight, Hash, PublicKey};
use serde::{Deserialize, Serialize};

/// The result of applying every block up to `height`.
///
/// Verification of block `h + 1` depends on the state produced by block `h`
/// (parent hash, running application hash), which is why blocks can only be
/// applied in increasing height order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Identifier of the chain. Part of every seal message.
    pub chain_id: Hash,

    /// Validator whose seal every block must carry.
    pub validator: PublicKey,

    /// Height of the last applied block (genesis = 0).
    pub height: BlockHeight,

    /// Hash of the last applied block (zero at genesis).
    pub last_block_hash: Hash,

    /// Running hash over every applied payload.
    pub app_hash: Hash,
}

impl ChainState {
    /// State before any block has been applied.
    pub fn genesis(chain_id: Hash, validator: PublicKey) -> Self {
        Self {
            chain_id,
            validator,
            height: BlockHeight::GENESIS,
            last_block_hash: Hash::ZERO,
            app_hash: Hash::from_parts(&[b"genesis:".as_slice(), chain_id.as_bytes().as_slice()]),
        }
    }

    /// Height the next applied block must have.
    pub fn next_height(&self) -> BlockHeight {
        self.height.next()
    }

    /// State after applying `block`. Performs no validation.
    pub fn advance(&self, block: &Block) -> Self {
        Self {
            chain_id: self.chain_id,
            validator: self.validator,
            height: block.height(),
            last_block_hash: block.hash(),
            app_hash: Hash::from_parts(&[
                self.app_hash.as_bytes().as_slice(),
                block.header.payload_hash.as_bytes().as_slice(),
            ]),
        }
    }
}
