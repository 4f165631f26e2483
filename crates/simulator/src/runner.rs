//! Scenario construction and execution.

use crate::config::{SimulatorConfig, SimulatorError};
use fastsync_core::{BlockStore, SyncOutcome};
use fastsync_engine::{ChainBuilder, MemBlockStore};
use fastsync_simulation::{Eviction, NodeIndex, SimulationRunner, SimulationStats};
use fastsync_sync::{SyncConfig, SyncPhase, SyncStats};
use fastsync_types::{Block, BlockHeight, ChainState, Hash, KeyPair};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Salt for the key sealing the honest chain.
const HONEST_KEY_SALT: u8 = 0;
/// Salt for the key sealing the chain forging peers serve.
const FORGING_KEY_SALT: u8 = 1;

/// Derive a validator key from the simulation seed.
fn validator_key(seed: u64, salt: u8) -> KeyPair {
    let material = Hash::from_parts(&[
        b"fastsync-sim-validator".as_slice(),
        seed.to_le_bytes().as_slice(),
        [salt].as_slice(),
    ]);
    KeyPair::from_seed(material.as_bytes())
}

/// A chain together with the tip state that results from applying it.
struct BuiltChain {
    genesis: ChainState,
    tip: ChainState,
    blocks: Vec<Block>,
}

impl BuiltChain {
    fn new(chain_id: Hash, key: KeyPair, config: &SimulatorConfig) -> Self {
        let builder =
            ChainBuilder::new(chain_id, key).transactions_per_block(config.transactions_per_block);
        let genesis = builder.genesis();
        let blocks = builder.build(config.chain_length);
        let tip = blocks
            .iter()
            .fold(genesis.clone(), |state, block| state.advance(block));
        Self {
            genesis,
            tip,
            blocks,
        }
    }

    fn store(&self) -> Result<MemBlockStore, SimulatorError> {
        Ok(MemBlockStore::with_blocks(self.blocks.iter().cloned())?)
    }
}

/// Results of one simulation run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// How the joining node's run ended, if it ended before the deadline.
    pub outcome: Option<SyncOutcome>,
    /// Phase of the joining node when the run stopped.
    pub phase: SyncPhase,
    /// Height of the joining node's store.
    pub final_height: BlockHeight,
    /// Height the peers announced.
    pub target_height: BlockHeight,
    /// Whether every stored block matches the honest chain.
    pub matches_honest_chain: bool,
    /// Simulated time at the end of the run.
    pub simulated_time: Duration,
    /// Wall-clock time the run took.
    pub wall_time: Duration,
    /// Peers the joining node evicted.
    pub evictions: Vec<Eviction>,
    /// Counters of the joining node.
    pub sync_stats: SyncStats,
    /// Counters of the simulated network.
    pub network_stats: SimulationStats,
}

impl SyncReport {
    /// Whether the joining node caught up with the honest chain.
    pub fn is_success(&self) -> bool {
        self.outcome.is_some_and(|o| o.is_finished())
            && self.final_height == self.target_height
            && self.matches_honest_chain
    }

    /// Blocks applied per simulated second.
    pub fn blocks_per_second(&self) -> f64 {
        let secs = self.simulated_time.as_secs_f64();
        if secs > 0.0 {
            self.sync_stats.blocks_applied as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Complete ===")?;
        match self.outcome {
            Some(SyncOutcome::Finished { height }) => {
                writeln!(f, "Outcome:          finished at {height}")?
            }
            Some(SyncOutcome::Stopped { height }) => {
                writeln!(f, "Outcome:          stopped at {height}")?
            }
            None => writeln!(f, "Outcome:          incomplete ({})", self.phase)?,
        }
        writeln!(
            f,
            "Height:           {} / {}",
            self.final_height, self.target_height
        )?;
        writeln!(f, "Chain matches:    {}", self.matches_honest_chain)?;
        writeln!(f, "Simulated time:   {:?}", self.simulated_time)?;
        writeln!(f, "Wall time:        {:?}", self.wall_time)?;
        writeln!(f, "Throughput:       {:.1} blocks/s", self.blocks_per_second())?;
        writeln!(f)?;
        writeln!(f, "Requests sent:    {}", self.sync_stats.requests_sent)?;
        writeln!(f, "Request timeouts: {}", self.sync_stats.request_timeouts)?;
        writeln!(f, "Bad blocks:       {}", self.sync_stats.bad_blocks)?;
        writeln!(f, "Unexpected:       {}", self.sync_stats.unexpected_responses)?;
        writeln!(f, "Messages sent:    {}", self.network_stats.messages_sent)?;
        writeln!(f, "Messages dropped: {}", self.network_stats.messages_dropped())?;
        writeln!(f, "Evictions:        {}", self.evictions.len())?;
        for eviction in &self.evictions {
            writeln!(
                f,
                "  node {} at {:?}: {}",
                eviction.peer, eviction.at, eviction.reason
            )?;
        }
        Ok(())
    }
}

/// Runs one joining node against a configured set of serving peers.
pub struct Simulator {
    config: SimulatorConfig,
    runner: SimulationRunner,
    joiner: NodeIndex,
    honest: BuiltChain,
    honest_peers: Vec<NodeIndex>,
    forging_peers: Vec<NodeIndex>,
    silent_peers: Vec<NodeIndex>,
}

impl Simulator {
    /// Build the network described by `config`.
    ///
    /// Serving peers get the lowest node indices in the order forging,
    /// silent, honest; the joining node comes last.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;

        let chain_id = Hash::from_parts(&[
            b"fastsync-sim-chain".as_slice(),
            config.seed.to_le_bytes().as_slice(),
        ]);
        let honest = BuiltChain::new(chain_id, validator_key(config.seed, HONEST_KEY_SALT), &config);
        let forged = (config.forging_peers > 0).then(|| {
            BuiltChain::new(chain_id, validator_key(config.seed, FORGING_KEY_SALT), &config)
        });

        let mut runner = SimulationRunner::new(config.network.clone(), config.seed);

        let mut forging_peers = Vec::with_capacity(config.forging_peers);
        if let Some(forged) = &forged {
            for _ in 0..config.forging_peers {
                forging_peers.push(Self::add_server(&mut runner, forged)?);
            }
        }
        let silent_peers = (0..config.silent_peers)
            .map(|_| Self::add_server(&mut runner, &honest))
            .collect::<Result<Vec<_>, _>>()?;
        let honest_peers = (0..config.honest_peers)
            .map(|_| Self::add_server(&mut runner, &honest))
            .collect::<Result<Vec<_>, _>>()?;

        let joiner = runner.add_node(
            config.sync.clone(),
            honest.genesis.clone(),
            MemBlockStore::new(),
        );

        for &peer in forging_peers.iter().chain(&silent_peers).chain(&honest_peers) {
            runner.connect(peer, joiner);
        }
        for &peer in &silent_peers {
            runner.network_mut().partition_unidirectional(peer, joiner);
        }

        info!(
            honest = honest_peers.len(),
            forging = forging_peers.len(),
            silent = silent_peers.len(),
            chain_length = config.chain_length,
            seed = config.seed,
            "Simulation network built"
        );

        Ok(Self {
            config,
            runner,
            joiner,
            honest,
            honest_peers,
            forging_peers,
            silent_peers,
        })
    }

    fn add_server(
        runner: &mut SimulationRunner,
        chain: &BuiltChain,
    ) -> Result<NodeIndex, SimulatorError> {
        Ok(runner.add_node(SyncConfig::default(), chain.tip.clone(), chain.store()?))
    }

    /// Run until the joining node completes or the deadline passes.
    pub fn run(&mut self) -> SyncReport {
        let started = Instant::now();
        let outcome = self
            .runner
            .run_until_complete(self.joiner, self.config.deadline);
        let wall_time = started.elapsed();

        if outcome.is_none() {
            warn!(
                deadline = ?self.config.deadline,
                "Joining node did not complete before the deadline"
            );
        }
        self.report(outcome, wall_time)
    }

    fn report(&self, outcome: Option<SyncOutcome>, wall_time: Duration) -> SyncReport {
        let node = self.runner.node(self.joiner);
        let store = node.store();
        let matches_honest_chain = store
            .blocks()
            .iter()
            .zip(&self.honest.blocks)
            .all(|(stored, honest)| stored == honest);

        SyncReport {
            outcome,
            phase: node.phase(),
            final_height: store.height(),
            target_height: self.honest.tip.height,
            matches_honest_chain,
            simulated_time: self.runner.now(),
            wall_time,
            evictions: self
                .runner
                .evictions()
                .iter()
                .filter(|e| e.node == self.joiner)
                .copied()
                .collect(),
            sync_stats: node.stats().clone(),
            network_stats: self.runner.stats().clone(),
        }
    }

    /// Index of the joining node.
    pub fn joiner(&self) -> NodeIndex {
        self.joiner
    }

    pub fn honest_peers(&self) -> &[NodeIndex] {
        &self.honest_peers
    }

    pub fn forging_peers(&self) -> &[NodeIndex] {
        &self.forging_peers
    }

    pub fn silent_peers(&self) -> &[NodeIndex] {
        &self.silent_peers
    }

    /// The underlying simulation.
    pub fn runner(&self) -> &SimulationRunner {
        &self.runner
    }
}
