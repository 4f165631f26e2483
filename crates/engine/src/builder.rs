//! Sealed chain generation.

use fastsync_types::{Block, BlockHeight, ChainState, Hash, KeyPair};

/// Builds a chain of sealed blocks on top of genesis.
///
/// Output is deterministic for a given chain id, key and settings.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    chain_id: Hash,
    key: KeyPair,
    transactions_per_block: usize,
    tip: ChainState,
}

impl ChainBuilder {
    pub fn new(chain_id: Hash, key: KeyPair) -> Self {
        let tip = ChainState::genesis(chain_id, key.public_key());
        Self {
            chain_id,
            key,
            transactions_per_block: 2,
            tip,
        }
    }

    pub fn transactions_per_block(mut self, count: usize) -> Self {
        self.transactions_per_block = count;
        self
    }

    /// Chain state before any block, validated by this builder's key.
    pub fn genesis(&self) -> ChainState {
        ChainState::genesis(self.chain_id, self.key.public_key())
    }

    /// Height of the last block built.
    pub fn height(&self) -> BlockHeight {
        self.tip.height
    }

    /// Seal the next block.
    pub fn next_block(&mut self) -> Block {
        let height = self.tip.next_height();
        let transactions = (0..self.transactions_per_block)
            .map(|i| format!("tx-{}-{}", height.0, i).into_bytes())
            .collect();
        let block = Block::sealed(
            &self.chain_id,
            &self.key,
            height,
            self.tip.last_block_hash,
            height.0 * 1_000,
            transactions,
        );
        self.tip = self.tip.advance(&block);
        block
    }

    /// Seal `count` more blocks.
    pub fn build(mut self, count: u64) -> Vec<Block> {
        (0..count).map(|_| self.next_block()).collect()
    }
}
