//! Configuration types for the simulator.

use fastsync_core::StoreError;
use fastsync_simulation::NetworkConfig;
use fastsync_sync::{ConfigError, SyncConfig};
use std::time::Duration;
use thiserror::Error;

/// Configuration for a simulation run.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Peers serving the honest chain.
    pub honest_peers: usize,

    /// Peers serving a chain sealed by a different validator.
    pub forging_peers: usize,

    /// Peers that accept requests but never answer.
    pub silent_peers: usize,

    /// Length of the chain the peers hold.
    pub chain_length: u64,

    /// Transactions in every generated block.
    pub transactions_per_block: usize,

    /// Simulated time after which the run is abandoned.
    pub deadline: Duration,

    /// Random seed for deterministic simulation.
    pub seed: u64,

    /// Network conditions.
    pub network: NetworkConfig,

    /// Sync tunables of the joining node.
    pub sync: SyncConfig,
}

impl SimulatorConfig {
    /// Create a configuration with `honest_peers` peers holding `chain_length` blocks.
    pub fn new(honest_peers: usize, chain_length: u64) -> Self {
        Self {
            honest_peers,
            forging_peers: 0,
            silent_peers: 0,
            chain_length,
            transactions_per_block: 2,
            deadline: Duration::from_secs(600),
            seed: 12345,
            network: NetworkConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Set the number of peers serving an incompatible chain.
    pub fn with_forging_peers(mut self, count: usize) -> Self {
        self.forging_peers = count;
        self
    }

    /// Set the number of peers that never answer.
    pub fn with_silent_peers(mut self, count: usize) -> Self {
        self.silent_peers = count;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the packet loss rate (0.0 - 1.0).
    pub fn with_packet_loss(mut self, rate: f64) -> Self {
        self.network.packet_loss_rate = rate;
        self
    }

    /// Set the one-way network latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.network.latency = latency;
        self
    }

    /// Set the joining node's sync configuration.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Set the simulated-time deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Total number of serving peers.
    pub fn total_peers(&self) -> usize {
        self.honest_peers + self.forging_peers + self.silent_peers
    }

    /// Check the configuration describes a runnable scenario.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.honest_peers == 0 {
            return Err(SimulatorError::NoHonestPeers);
        }
        if !(0.0..1.0).contains(&self.network.packet_loss_rate) {
            return Err(SimulatorError::PacketLoss(self.network.packet_loss_rate));
        }
        self.sync.validate()?;
        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new(4, 500)
    }
}

/// Invalid simulator configuration.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Without an honest peer the joiner can never catch up.
    #[error("At least one honest peer is required")]
    NoHonestPeers,

    /// Packet loss must leave some messages through.
    #[error("Packet loss rate {0} must be in [0.0, 1.0)")]
    PacketLoss(f64),

    /// Generated chain could not be loaded into a store.
    #[error("Failed to build peer store: {0}")]
    Store(#[from] StoreError),

    /// Sync configuration rejected.
    #[error("Invalid sync configuration: {0}")]
    Sync(#[from] ConfigError),
}
