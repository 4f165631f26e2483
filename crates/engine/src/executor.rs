//! Block verification and state transition.

use fastsync_core::{ApplyError, BlockExecutor};
use fastsync_types::{Block, ChainState, Hash};
use tracing::trace;

/// Verifies blocks against the chain state and applies them.
///
/// Checks run in this order:
///
/// 1. The height follows the state's height
/// 2. The parent hash is the last applied block
/// 3. The transactions match the payload hash
/// 4. The seal is a valid signature by the chain validator
/// 5. The block hashes to the id pinned by the caller
/// 6. The block is within the transaction limit, if one is set
///
/// The id check comes after the seal, so a mismatch on an authentic block
/// means whoever supplied the pinned id is wrong.
#[derive(Debug, Default)]
pub struct ChainExecutor {
    max_transactions: Option<usize>,
    blocks_applied: u64,
}

impl ChainExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse blocks carrying more than `limit` transactions.
    pub fn with_max_transactions(limit: usize) -> Self {
        Self {
            max_transactions: Some(limit),
            ..Self::default()
        }
    }

    /// Number of blocks this executor accepted.
    pub fn blocks_applied(&self) -> u64 {
        self.blocks_applied
    }

    /// Run every check without committing anything.
    pub fn verify(
        &self,
        state: &ChainState,
        expected_block_id: &Hash,
        block: &Block,
    ) -> Result<(), ApplyError> {
        let height = block.height();

        if height != state.next_height() {
            return Err(ApplyError::HeightMismatch {
                expected: state.next_height(),
                actual: height,
            });
        }
        if block.header.parent_hash != state.last_block_hash {
            return Err(ApplyError::ParentMismatch { height });
        }
        if !block.has_valid_payload() {
            return Err(ApplyError::InvalidPayload { height });
        }
        if !block.has_valid_seal(&state.chain_id, &state.validator) {
            return Err(ApplyError::InvalidSeal { height });
        }
        if block.hash() != *expected_block_id {
            return Err(ApplyError::BlockIdMismatch { height });
        }
        if let Some(limit) = self.max_transactions {
            if block.transaction_count() > limit {
                return Err(ApplyError::Rejected {
                    height,
                    reason: format!(
                        "{} transactions exceed the limit of {limit}",
                        block.transaction_count()
                    ),
                });
            }
        }
        Ok(())
    }
}

impl BlockExecutor for ChainExecutor {
    fn apply_block(
        &mut self,
        state: &ChainState,
        expected_block_id: &Hash,
        block: &Block,
    ) -> Result<ChainState, ApplyError> {
        self.verify(state, expected_block_id, block)?;
        let next = state.advance(block);
        self.blocks_applied += 1;
        trace!(height = next.height.0, app_hash = ?next.app_hash, "Applied block");
        Ok(next)
    }
}
