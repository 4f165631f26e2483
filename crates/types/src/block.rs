//! Block and BlockHeader types.

use crate::{block_seal_message, BlockHeight, Hash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Block header.
///
/// The header hash is the block identifier. It commits to the parent hash,
/// which chains every block to its predecessor, and to the payload hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height in the chain (first block = 1).
    pub height: BlockHeight,

    /// Hash of parent block (zero for the first block).
    pub parent_hash: Hash,

    /// Unix timestamp (milliseconds) when the block was produced.
    pub timestamp: u64,

    /// Hash over the block's transactions.
    pub payload_hash: Hash,
}

impl BlockHeader {
    /// Compute hash of this block header.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[
            b"block_header:".as_slice(),
            self.height.0.to_le_bytes().as_slice(),
            self.parent_hash.as_bytes().as_slice(),
            self.timestamp.to_le_bytes().as_slice(),
            self.payload_hash.as_bytes().as_slice(),
        ])
    }
}

/// Complete block with header, transaction payload and validator seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,

    /// Opaque transactions. Their meaning belongs to the application.
    pub transactions: Vec<Vec<u8>>,

    /// Validator signature over the header hash.
    pub seal: Signature,
}

impl Block {
    /// Build and seal a block on top of `parent_hash`.
    pub fn sealed(
        chain_id: &Hash,
        key: &KeyPair,
        height: BlockHeight,
        parent_hash: Hash,
        timestamp: u64,
        transactions: Vec<Vec<u8>>,
    ) -> Self {
        let header = BlockHeader {
            height,
            parent_hash,
            timestamp,
            payload_hash: Self::compute_payload_hash(&transactions),
        };
        let seal = key.sign(&block_seal_message(chain_id, height, &header.hash()));
        Self {
            header,
            transactions,
            seal,
        }
    }

    /// Hash a transaction list the way `payload_hash` commits to it.
    pub fn compute_payload_hash(transactions: &[Vec<u8>]) -> Hash {
        let mut hasher_input: Vec<&[u8]> = Vec::with_capacity(transactions.len() + 1);
        hasher_input.push(b"payload:");
        for tx in transactions {
            hasher_input.push(tx.as_slice());
        }
        Hash::from_parts(&hasher_input)
    }

    /// Compute hash of this block (hashes the header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Get block height.
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Get number of transactions in this block.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the transactions match the header's payload hash.
    pub fn has_valid_payload(&self) -> bool {
        Self::compute_payload_hash(&self.transactions) == self.header.payload_hash
    }

    /// Whether the seal was produced by `validator` for this chain.
    pub fn has_valid_seal(&self, chain_id: &Hash, validator: &PublicKey) -> bool {
        let message = block_seal_message(chain_id, self.height(), &self.hash());
        validator.verify(&message, &self.seal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_id() -> Hash {
        Hash::from_bytes(b"test-chain")
    }

    #[test]
    fn test_block_header_hash_deterministic() {
        let header = BlockHeader {
            height: BlockHeight(1),
            parent_hash: Hash::from_bytes(b"parent"),
            timestamp: 1234567890,
            payload_hash: Hash::ZERO,
        };

        assert_eq!(header.hash(), header.clone().hash());

        let mut other = header.clone();
        other.height = BlockHeight(2);
        assert_ne!(header.hash(), other.hash());
    }

    #[test]
    fn test_sealed_block_verifies() {
        let key = KeyPair::from_seed(&[7u8; 32]);
        let block = Block::sealed(
            &chain_id(),
            &key,
            BlockHeight(1),
            Hash::ZERO,
            10,
            vec![b"tx1".to_vec(), b"tx2".to_vec()],
        );

        assert_eq!(block.height(), BlockHeight(1));
        assert_eq!(block.transaction_count(), 2);
        assert!(block.has_valid_payload());
        assert!(block.has_valid_seal(&chain_id(), &key.public_key()));

        let stranger = KeyPair::from_seed(&[8u8; 32]);
        assert!(!block.has_valid_seal(&chain_id(), &stranger.public_key()));
        assert!(!block.has_valid_seal(&Hash::from_bytes(b"other"), &key.public_key()));
    }

    #[test]
    fn test_tampered_payload_detected() {
        let key = KeyPair::from_seed(&[7u8; 32]);
        let mut block = Block::sealed(
            &chain_id(),
            &key,
            BlockHeight(1),
            Hash::ZERO,
            10,
            vec![b"tx1".to_vec()],
        );
        block.transactions.push(b"injected".to_vec());

        assert!(!block.has_valid_payload());
        // The seal covers the header only, which is unchanged.
        assert!(block.has_valid_seal(&chain_id(), &key.public_key()));
    }
}
