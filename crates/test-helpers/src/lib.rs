//! Sealed chain fixtures shared by the sync, simulation and production tests.
//!
//! Every fixture is deterministic: the same length always yields the same
//! blocks, so tests can compare hashes across nodes.

use fastsync_core::BlockStore;
use fastsync_engine::{ChainBuilder, MemBlockStore};
use fastsync_types::{Block, BlockHeight, ChainState, Hash, KeyPair};

/// Chain id used by every fixture.
pub fn test_chain_id() -> Hash {
    Hash::from_bytes(b"fastsync-test-chain")
}

/// Deterministic keypair for tests.
pub fn test_keypair(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

const HONEST_VALIDATOR_SEED: u8 = 1;
const FORGING_VALIDATOR_SEED: u8 = 66;

/// Key that seals [`TestChain::honest`].
pub fn honest_validator() -> KeyPair {
    test_keypair(HONEST_VALIDATOR_SEED)
}

/// A pre-built chain plus the genesis state that validates it.
#[derive(Debug, Clone)]
pub struct TestChain {
    genesis: ChainState,
    blocks: Vec<Block>,
}

impl TestChain {
    /// `len` blocks sealed by the honest test validator.
    pub fn honest(len: u64) -> Self {
        Self::sealed_by(honest_validator(), len)
    }

    /// `len` blocks on the same chain id sealed by a different key.
    ///
    /// Block ids match the honest chain at every height, but none of the
    /// seals verify against the honest genesis.
    pub fn forked(len: u64) -> Self {
        Self::sealed_by(test_keypair(FORGING_VALIDATOR_SEED), len)
    }

    fn sealed_by(key: KeyPair, len: u64) -> Self {
        let builder = ChainBuilder::new(test_chain_id(), key);
        let genesis = builder.genesis();
        Self {
            genesis,
            blocks: builder.build(len),
        }
    }

    pub fn genesis(&self) -> ChainState {
        self.genesis.clone()
    }

    /// Block at `height`. Panics outside `1..=len`.
    pub fn block(&self, height: u64) -> &Block {
        &self.blocks[(height - 1) as usize]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> BlockHeight {
        BlockHeight(self.len())
    }

    /// Store holding blocks `1..=height`.
    pub fn store_up_to(&self, height: u64) -> MemBlockStore {
        let count = height.min(self.len()) as usize;
        MemBlockStore::with_blocks(self.blocks[..count].iter().cloned())
            .expect("fixture blocks are contiguous")
    }

    /// Chain state after applying blocks `1..=height`.
    pub fn state_at(&self, height: u64) -> ChainState {
        self.blocks
            .iter()
            .take(height as usize)
            .fold(self.genesis(), |state, block| state.advance(block))
    }
}

/// Store height and tip hash agree with `chain` up to `height`.
pub fn store_matches(store: &MemBlockStore, chain: &TestChain, height: u64) -> bool {
    store.height() == BlockHeight(height)
        && (1..=height).all(|h| store.load_block(BlockHeight(h)).as_ref() == Some(chain.block(h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_deterministic() {
        assert_eq!(TestChain::honest(3).blocks(), TestChain::honest(3).blocks());
        assert_eq!(TestChain::honest(5).block(4).height(), BlockHeight(4));
    }

    #[test]
    fn test_forked_chain_fails_honest_seal() {
        let honest = TestChain::honest(2);
        let forked = TestChain::forked(2);
        let genesis = honest.genesis();

        assert_eq!(honest.block(1).hash(), forked.block(1).hash());
        assert!(!forked
            .block(1)
            .has_valid_seal(&genesis.chain_id, &genesis.validator));
    }

    #[test]
    fn test_store_and_state_prefixes() {
        let chain = TestChain::honest(4);
        let store = chain.store_up_to(2);
        assert!(store_matches(&store, &chain, 2));
        assert_eq!(chain.state_at(2).last_block_hash, chain.block(2).hash());
        assert_eq!(chain.store_up_to(10).height(), BlockHeight(4));
    }
}
