//! Deterministic simulation runner.
//!
//! This crate provides a fully deterministic simulation environment for
//! testing fast sync across many nodes. Given the same seed, it produces
//! identical results every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Event>)        │ │
//! │  │     Ordered by: time, priority, node, sequence     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     nodes: Vec<SyncStateMachine>                   │ │
//! │  │     Each processes events sequentially             │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Actions → SimulatedNetwork → new events        │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every node is a full [`SyncStateMachine`](fastsync_sync::SyncStateMachine):
//! nodes that already hold the chain finish immediately and keep serving
//! requests, nodes that are behind sync from their connected peers.

mod event_queue;
mod network;
mod runner;

pub use event_queue::EventKey;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{Eviction, SimNode, SimulationRunner, SimulationStats};

/// Index of a node inside one simulation.
///
/// The node's peer identity on the wire is `PeerId(index as u64)`.
pub type NodeIndex = u32;
