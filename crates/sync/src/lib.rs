//! Fast block synchronization.
//!
//! A node that starts behind its peers downloads the missing blocks in
//! parallel from several peers, verifies and applies them strictly in height
//! order, and stops once it has caught up with the tallest peer.
//!
//! # Protocol Overview
//!
//! 1. **Discovery**: Each peer announces its height when it joins and again
//!    whenever it answers a periodic status request.
//!
//! 2. **Parallel Fetching**: Heights in the window
//!    `[base, base + request_batch_size)` are spread across peers that have
//!    them, least loaded first, with a per-peer cap on requests in flight.
//!
//! 3. **Verification**: Each block is checked by the [`BlockExecutor`]
//!    against the state produced by its predecessor. A bad block is blamed
//!    on the peer that sent it; that peer is evicted and its heights are
//!    fetched again from someone else.
//!
//! 4. **Application**: Verified blocks are persisted to the [`BlockStore`]
//!    and `base` advances. Sync finishes when `base` passes the tallest peer.
//!
//! # Architecture
//!
//! ```text
//! Event ──► SyncStateMachine ──────────────────────────► Action
//!              │                                    (SendToPeer, SetTimer,
//!              ▼                                     DisconnectPeer, ...)
//!           BlockPool ── PeerTracker
//!              │
//!              ├─ make_next_requests()  → BlockRequest per height
//!              ├─ on_block_received()   → buffered by height
//!              ├─ check_timeouts()      → strikes, eviction
//!              └─ apply_ready()         → executor + store, base += 1
//! ```
//!
//! [`BlockExecutor`]: fastsync_core::BlockExecutor
//! [`BlockStore`]: fastsync_core::BlockStore

mod config;
mod error;
mod peers;
mod pool;
pub mod responder;
mod state;

pub use config::SyncConfig;
pub use error::{ConfigError, SyncError};
pub use peers::{PeerInfo, PeerTracker};
pub use pool::{BlockPool, PendingRequest};
pub use state::{SyncPhase, SyncStateMachine, SyncStats};
