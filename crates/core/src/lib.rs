//! Core types for the fast-sync subsystem.
//!
//! This crate provides the foundational types for the sync architecture:
//!
//! - [`Event`]: All possible inputs to the sync state machine
//! - [`Action`]: All possible outputs from the sync state machine
//! - [`StateMachine`]: The trait the sync state machine implements
//! - [`BlockStore`], [`BlockExecutor`], [`Transport`]: external collaborators
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is synchronous and deterministic. Store and executor are
//! called synchronously from inside `handle()`; everything that touches the
//! network is returned as an [`Action`] for the runner (simulation or
//! production) to execute against its [`Transport`].

mod action;
mod error;
mod event;
mod traits;

pub use action::{Action, EvictionReason, SyncOutcome};
pub use error::{ApplyError, StoreError};
pub use event::{Event, EventPriority};
pub use traits::{BlockExecutor, BlockStore, StateMachine, Transport};

/// Timers the sync state machine arms through [`Action::SetTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Periodic scan for expired block requests.
    TimeoutCheck,
    /// Periodic status request broadcast to refresh peer heights.
    StatusUpdate,
}
