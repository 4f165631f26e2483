//! Reference collaborators for the sync state machine.
//!
//! - [`ChainExecutor`]: verifies blocks and advances [`ChainState`](fastsync_types::ChainState)
//! - [`MemBlockStore`]: in-memory, height-ordered [`BlockStore`](fastsync_core::BlockStore)
//! - [`ChainBuilder`]: produces sealed chains for serving nodes and tests

mod builder;
mod executor;
mod storage;

pub use builder::ChainBuilder;
pub use executor::ChainExecutor;
pub use storage::MemBlockStore;
