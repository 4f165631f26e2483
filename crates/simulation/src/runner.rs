//! Deterministic simulation runner.
//!
//! Each node owns its store and executor. The runner only routes actions:
//! messages become delayed `MessageReceived` events at the receiver, timers
//! become future timer events, disconnects become `PeerLeft` events.

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::NodeIndex;
use fastsync_core::{
    Action, BlockStore, Event, EvictionReason, StateMachine, SyncOutcome, TimerId,
};
use fastsync_engine::{ChainExecutor, MemBlockStore};
use fastsync_messages::SyncMessage;
use fastsync_sync::{SyncConfig, SyncStateMachine};
use fastsync_types::{ChainState, PeerId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// State machine type run by every simulated node.
pub type SimNode = SyncStateMachine<MemBlockStore, ChainExecutor>;

/// A peer eviction observed by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub at: Duration,
    pub node: NodeIndex,
    pub peer: NodeIndex,
    pub reason: EvictionReason,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 3],
    /// Total actions generated.
    pub actions_generated: u64,
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Messages addressed to a node the sender is not connected to.
    pub messages_dropped_unconnected: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
}

impl SimulationStats {
    /// Total messages dropped.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition
            + self.messages_dropped_loss
            + self.messages_dropped_unconnected
    }
}

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
pub struct SimulationRunner {
    /// All nodes in the simulation, indexed by NodeIndex.
    nodes: Vec<SimNode>,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    /// Network simulator.
    network: SimulatedNetwork,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    /// Completion signal per node, recorded from `Action::SyncCompleted`.
    outcomes: BTreeMap<NodeIndex, SyncOutcome>,

    evictions: Vec<Eviction>,

    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create an empty simulation.
    pub fn new(network_config: NetworkConfig, seed: u64) -> Self {
        info!(
            seed,
            latency_ms = network_config.latency.as_millis() as u64,
            packet_loss = network_config.packet_loss_rate,
            "Created simulation runner"
        );
        Self {
            nodes: Vec::new(),
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(network_config),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timers: HashMap::new(),
            outcomes: BTreeMap::new(),
            evictions: Vec::new(),
            stats: SimulationStats::default(),
        }
    }

    /// Add a node whose store holds the chain up to `state.height`.
    pub fn add_node(
        &mut self,
        config: SyncConfig,
        state: ChainState,
        store: MemBlockStore,
    ) -> NodeIndex {
        let index = self.nodes.len() as NodeIndex;
        debug!(node = index, height = store.height().0, "Adding node");
        self.nodes.push(SyncStateMachine::new(
            config,
            state,
            store,
            ChainExecutor::new(),
        ));
        index
    }

    /// Connect two nodes. Each side learns the other's current height.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex) {
        if !self.network.connect(a, b) {
            return;
        }
        let height_a = self.nodes[a as usize].store().height();
        let height_b = self.nodes[b as usize].store().height();
        self.schedule_event(
            a,
            self.now,
            Event::PeerJoined {
                peer: peer_id(b),
                height: height_b,
            },
        );
        self.schedule_event(
            b,
            self.now,
            Event::PeerJoined {
                peer: peer_id(a),
                height: height_a,
            },
        );
    }

    /// Disconnect two nodes. Both sides see the other leave.
    pub fn disconnect(&mut self, a: NodeIndex, b: NodeIndex) {
        if !self.network.disconnect(a, b) {
            return;
        }
        self.schedule_event(a, self.now, Event::PeerLeft { peer: peer_id(b) });
        self.schedule_event(b, self.now, Event::PeerLeft { peer: peer_id(a) });
    }

    /// Deliver a stop request to `node` now.
    pub fn stop_node(&mut self, node: NodeIndex) {
        self.schedule_event(node, self.now, Event::Stop);
    }

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) {
        while self.step(end_time) {}
        trace!(
            events_processed = self.stats.events_processed,
            final_time = ?self.now,
            "Simulation run complete"
        );
    }

    /// Run until `node` completes, the queue drains, or `deadline` passes.
    ///
    /// Returns the node's outcome if it completed.
    pub fn run_until_complete(
        &mut self,
        node: NodeIndex,
        deadline: Duration,
    ) -> Option<SyncOutcome> {
        while !self.outcomes.contains_key(&node) && self.step(deadline) {}
        let outcome = self.outcomes.get(&node).copied();
        if outcome.is_none() {
            warn!(node, now = ?self.now, "Node did not complete before deadline");
        }
        outcome
    }

    /// Process the next event if it is due at or before `end_time`.
    fn step(&mut self, end_time: Duration) -> bool {
        let Some(entry) = self.event_queue.first_entry() else {
            return false;
        };
        if entry.key().time > end_time {
            return false;
        }
        let (key, event) = entry.remove_entry();
        self.now = key.time;
        let node_index = key.node_index;

        if let Some(id) = timer_id(&event) {
            if self.timers.get(&(node_index, id)) == Some(&key) {
                self.timers.remove(&(node_index, id));
            }
        }

        trace!(time = ?self.now, node = node_index, event = event.type_name(), "Processing event");
        self.stats.events_processed += 1;
        self.stats.events_by_priority[event.priority() as usize] += 1;

        let node = &mut self.nodes[node_index as usize];
        node.set_time(self.now);
        let actions = node.handle(event);
        self.stats.actions_generated += actions.len() as u64;

        for action in actions {
            self.process_action(node_index, action);
        }
        true
    }

    /// Process an action from a node.
    fn process_action(&mut self, from: NodeIndex, action: Action) {
        match action {
            Action::SendToPeer { peer, message } => {
                self.send(from, node_index(peer), message);
            }

            Action::Broadcast { message } => {
                for to in self.network.neighbours(from) {
                    self.send(from, to, message.clone());
                }
            }

            Action::DisconnectPeer { peer, reason } => {
                let to = node_index(peer);
                self.evictions.push(Eviction {
                    at: self.now,
                    node: from,
                    peer: to,
                    reason,
                });
                info!(node = from, peer = to, %reason, "Node evicted peer");
                if self.network.disconnect(from, to) {
                    self.schedule_event(to, self.now, Event::PeerLeft { peer: peer_id(from) });
                }
            }

            Action::SetTimer { id, duration } => {
                if let Some(old) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&old);
                }
                let key = self.schedule_event(from, self.now + duration, timer_event(id));
                self.timers.insert((from, id), key);
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }

            Action::SyncCompleted { outcome } => {
                info!(node = from, ?outcome, now = ?self.now, "Node completed sync");
                self.outcomes.insert(from, outcome);
            }
        }
    }

    /// Try to deliver a message, accounting for connections, partitions and
    /// packet loss.
    fn send(&mut self, from: NodeIndex, to: NodeIndex, message: SyncMessage) {
        if !self.network.is_connected(from, to) {
            self.stats.messages_dropped_unconnected += 1;
            trace!(from, to, "Message dropped, nodes not connected");
            return;
        }

        // Check partition first (deterministic - doesn't consume RNG)
        if self.network.is_partitioned(from, to) {
            self.stats.messages_dropped_partition += 1;
            trace!(from, to, "Message dropped due to partition");
            return;
        }

        if self.network.should_drop_packet(&mut self.rng) {
            self.stats.messages_dropped_loss += 1;
            trace!(from, to, "Message dropped due to packet loss");
            return;
        }

        let latency = self.network.sample_latency(&mut self.rng);
        self.schedule_event(
            to,
            self.now + latency,
            Event::MessageReceived {
                from: peer_id(from),
                message,
            },
        );
        self.stats.messages_sent += 1;
    }

    fn schedule_event(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.event_queue.insert(key, event);
        key
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn node(&self, index: NodeIndex) -> &SimNode {
        &self.nodes[index as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn outcome(&self, index: NodeIndex) -> Option<SyncOutcome> {
        self.outcomes.get(&index).copied()
    }

    pub fn evictions(&self) -> &[Eviction] {
        &self.evictions
    }

    /// Nodes currently connected to `index`.
    pub fn connected_peers(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.network.neighbours(index)
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }
}

fn peer_id(node: NodeIndex) -> PeerId {
    PeerId(node as u64)
}

fn node_index(peer: PeerId) -> NodeIndex {
    peer.0 as NodeIndex
}

fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::TimeoutCheck => Event::TimeoutCheckTimer,
        TimerId::StatusUpdate => Event::StatusUpdateTimer,
    }
}

fn timer_id(event: &Event) -> Option<TimerId> {
    match event {
        Event::TimeoutCheckTimer => Some(TimerId::TimeoutCheck),
        Event::StatusUpdateTimer => Some(TimerId::StatusUpdate),
        _ => None,
    }
}
