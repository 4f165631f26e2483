//! Simulated network with deterministic latency, packet loss, and partitions.

use crate::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// Configuration for simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way latency between connected nodes.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Simulated network for deterministic message delivery.
///
/// Supports:
/// - Peer connections (only connected nodes exchange messages)
/// - Configurable latency with jitter
/// - Packet loss (probabilistic message drops)
/// - Network partitions (blocking communication between node pairs)
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Undirected connections, stored with the lower index first.
    connections: BTreeSet<(NodeIndex, NodeIndex)>,
    /// Partitioned node pairs. If (a, b) is in this set, messages from a to b are dropped.
    /// Partitions are directional - add both (a, b) and (b, a) for bidirectional partition.
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

fn link(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
    (a.min(b), a.max(b))
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            connections: BTreeSet::new(),
            partitions: HashSet::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    // ─── Connections ───

    /// Connect two nodes. Returns false if they were already connected.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        a != b && self.connections.insert(link(a, b))
    }

    /// Disconnect two nodes. Returns false if they were not connected.
    pub fn disconnect(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        self.connections.remove(&link(a, b))
    }

    pub fn is_connected(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.connections.contains(&link(a, b))
    }

    /// Nodes connected to `node`, in index order.
    pub fn neighbours(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.connections
            .iter()
            .filter_map(|&(a, b)| match (a == node, b == node) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    // ─── Partition Management ───

    /// Check if two nodes are partitioned (message from `from` to `to` would be dropped).
    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Create a unidirectional partition: messages from `from` to `to` are dropped.
    pub fn partition_unidirectional(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.insert((from, to));
    }

    /// Create a bidirectional partition between two nodes.
    pub fn partition_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Heal a bidirectional partition between two nodes.
    pub fn heal_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.remove(&(a, b));
        self.partitions.remove(&(b, a));
    }

    /// Heal all partitions - restore full network connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    // ─── Packet Loss ───

    /// Check if a packet should be dropped based on the configured loss rate.
    pub fn should_drop_packet(&self, rng: &mut ChaCha8Rng) -> bool {
        self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate
    }

    /// Set the packet loss rate (0.0 - 1.0).
    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    // ─── Message Delivery Decision ───

    /// Sample latency for one message.
    pub fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.001))
    }
}
