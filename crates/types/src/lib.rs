//! Core chain types for fast sync.
//!
//! These types are shared by the sync state machine, the network messages
//! and the reference collaborators (store, executor, simulation).

mod block;
mod crypto;
mod hash;
mod identifiers;
mod signing;
mod state;

pub use block::{Block, BlockHeader};
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use identifiers::{BlockHeight, PeerId};
pub use signing::{block_seal_message, DOMAIN_BLOCK_SEAL};
pub use state::ChainState;
