//! Collaborator error types.

use fastsync_types::BlockHeight;
use thiserror::Error;

/// Why the executor refused a block.
///
/// Every variant means the block (not the local node) is at fault, so the
/// state machine blames the peer that delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Block is not at the height following the chain state.
    #[error("Expected block at {expected}, got {actual}")]
    HeightMismatch {
        expected: BlockHeight,
        actual: BlockHeight,
    },

    /// Block's parent hash is not the last applied block.
    #[error("Block at {height} does not extend the applied chain")]
    ParentMismatch { height: BlockHeight },

    /// Block hashes to something other than the pinned id.
    #[error("Block at {height} does not match the expected block id")]
    BlockIdMismatch { height: BlockHeight },

    /// Seal is not a valid signature by the chain validator.
    #[error("Block at {height} carries an invalid seal")]
    InvalidSeal { height: BlockHeight },

    /// Transactions do not hash to the header's payload hash.
    #[error("Block at {height} has transactions that do not match its header")]
    InvalidPayload { height: BlockHeight },

    /// The application refused the block.
    #[error("Block at {height} rejected by application: {reason}")]
    Rejected { height: BlockHeight, reason: String },
}

/// Block store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Saved block does not extend the stored chain by exactly one.
    #[error("Store is at {stored}, cannot save block at {attempted}")]
    NonContiguous {
        stored: BlockHeight,
        attempted: BlockHeight,
    },

    /// The storage backend failed.
    #[error("Storage backend failure: {0}")]
    Backend(String),
}
