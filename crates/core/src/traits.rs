//! Core traits for the state machine and its collaborators.

use crate::{Action, ApplyError, Event, StoreError};
use fastsync_messages::SyncMessage;
use fastsync_types::{Block, BlockHeight, ChainState, Hash, PeerId};
use std::time::Duration;

/// A state machine that processes events.
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **No network I/O**: Messages and disconnects are returned as actions
///
/// # Example
///
/// ```ignore
/// loop {
///     let event = queue.pop();
///     machine.set_time(clock.now());
///     for action in machine.handle(event) {
///         runner.execute(action);
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **Deterministic**: Given the same state and event, always returns the same actions
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Durable storage of applied blocks.
///
/// Blocks are saved strictly in height order starting at height 1.
pub trait BlockStore {
    /// Persist the block that extends the stored chain by one.
    fn save_block(&mut self, block: Block) -> Result<(), StoreError>;

    /// Load the block at `height`, if stored.
    fn load_block(&self, height: BlockHeight) -> Option<Block>;

    /// Highest stored height (genesis when empty).
    fn height(&self) -> BlockHeight;
}

/// Verifies a block against the chain state and commits its transition.
pub trait BlockExecutor {
    /// Validate `block` as the successor of `state` and return the next state.
    ///
    /// `expected_block_id` is the id the caller pinned for this height,
    /// usually the parent hash of the block above it; a block hashing to
    /// anything else must be refused with [`ApplyError::BlockIdMismatch`].
    /// Report other faults first so a mismatch implicates the pin.
    fn apply_block(
        &mut self,
        state: &ChainState,
        expected_block_id: &Hash,
        block: &Block,
    ) -> Result<ChainState, ApplyError>;
}

/// Outbound half of the peer transport.
///
/// Inbound traffic arrives as [`Event::PeerJoined`], [`Event::PeerLeft`] and
/// [`Event::MessageReceived`].
pub trait Transport: Send + Sync {
    /// Send `message` to `peer`. Delivery is best effort.
    fn send(&self, peer: PeerId, message: SyncMessage);

    /// Send `message` to every connected peer.
    fn broadcast(&self, message: SyncMessage);

    /// Close the connection to `peer`.
    fn disconnect(&self, peer: PeerId);
}
