//! Deterministic event ordering.

use crate::NodeIndex;
use fastsync_core::{Event, EventPriority};
use std::time::Duration;

/// Key for ordering events in the simulation queue.
///
/// Events are ordered by time, then priority, then node, then insertion
/// sequence, so two events at the same instant always run in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node_index: NodeIndex,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node_index: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node_index,
            sequence,
        }
    }
}
