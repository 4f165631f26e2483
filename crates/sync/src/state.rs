//! Sync state machine.

use crate::{responder, BlockPool, SyncConfig, SyncError};
use fastsync_core::{
    Action, BlockExecutor, BlockStore, EvictionReason, Event, StateMachine, SyncOutcome, TimerId,
};
use fastsync_messages::{BlockRequest, StatusRequest, SyncMessage};
use fastsync_types::{Block, BlockHeight, ChainState, PeerId};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Phase of the sync lifecycle.
///
/// ```text
/// Init ──PeerJoined──► WaitForPeer ──requests issued──► WaitForBlock ──► Finished
///                          ▲                                 │
///                          └──────── all peers gone ─────────┘
///
/// any phase ──Stop──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// No peer seen yet.
    Init,
    /// Peers known but none of them is ahead of us.
    WaitForPeer,
    /// Requests are outstanding; blocks are being fetched and applied.
    WaitForBlock,
    /// Caught up with the tallest peer. Terminal.
    Finished,
    /// Shut down on request. Terminal.
    Stopped,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Finished | SyncPhase::Stopped)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Init => "init",
            SyncPhase::WaitForPeer => "wait_for_peer",
            SyncPhase::WaitForBlock => "wait_for_block",
            SyncPhase::Finished => "finished",
            SyncPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters exposed for tests and runners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub blocks_applied: u64,
    pub requests_sent: u64,
    pub request_timeouts: u64,
    pub bad_blocks: u64,
    pub unexpected_responses: u64,
    pub peers_evicted: u64,
    pub requests_served: u64,
}

/// Fast-sync state machine.
///
/// Owns the block pool, the chain state and the local store and executor.
/// Network effects are returned as [`Action`]s; store and executor calls
/// happen synchronously inside [`handle`](StateMachine::handle).
pub struct SyncStateMachine<S, E> {
    config: SyncConfig,
    phase: SyncPhase,
    pool: BlockPool,
    chain: ChainState,
    store: S,
    executor: E,
    now: Duration,
    /// Set once `SyncCompleted` has been emitted.
    completed: bool,
    stats: SyncStats,
}

impl<S: BlockStore, E: BlockExecutor> SyncStateMachine<S, E> {
    /// Create a machine that resumes from `chain`.
    ///
    /// `chain` must describe the store's tip; the first height requested is
    /// `chain.height + 1`.
    pub fn new(config: SyncConfig, chain: ChainState, store: S, executor: E) -> Self {
        if store.height() != chain.height {
            warn!(
                store_height = store.height().0,
                state_height = chain.height.0,
                "Store and chain state disagree; resuming from chain state"
            );
        }
        let pool = BlockPool::new(&config, chain.next_height());
        Self {
            config,
            phase: SyncPhase::Init,
            pool,
            chain,
            store,
            executor,
            now: Duration::ZERO,
            completed: false,
            stats: SyncStats::default(),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SyncPhase::Finished
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn chain_state(&self) -> &ChainState {
        &self.chain
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Take the store and chain state back, e.g. to hand over to consensus.
    pub fn into_parts(self) -> (S, E, ChainState) {
        (self.store, self.executor, self.chain)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn on_peer_joined(&mut self, peer: PeerId, height: BlockHeight) -> Vec<Action> {
        if let Err(e) = self.pool.add_peer(peer, height) {
            warn!(peer = %peer, error = %e, "Ignoring peer join");
            return vec![];
        }
        info!(peer = %peer, height = height.0, phase = %self.phase, "Sync peer joined");

        let mut actions = vec![];
        if self.phase == SyncPhase::Init {
            self.transition(SyncPhase::WaitForPeer);
            actions.extend(self.arm_timers());
        }
        actions.extend(self.advance());
        actions
    }

    fn on_peer_left(&mut self, peer: PeerId) -> Vec<Action> {
        if !self.pool.peers().contains(peer) {
            trace!(peer = %peer, "Unknown peer left");
            return vec![];
        }
        let orphaned = self.pool.remove_peer(peer);
        info!(peer = %peer, orphaned = orphaned.len(), "Sync peer left");
        self.advance()
    }

    fn on_stop(&mut self) -> Vec<Action> {
        info!(
            height = self.chain.height.0,
            phase = %self.phase,
            "Stopping sync"
        );
        let was_running = !matches!(self.phase, SyncPhase::Init | SyncPhase::Finished);
        self.pool.stop();
        self.transition(SyncPhase::Stopped);

        let mut actions = vec![];
        if was_running {
            actions.extend(self.cancel_timers());
        }
        actions.extend(self.complete(SyncOutcome::Stopped {
            height: self.chain.height,
        }));
        actions
    }

    fn finish(&mut self) -> Vec<Action> {
        info!(
            height = self.chain.height.0,
            applied = self.stats.blocks_applied,
            "Sync finished"
        );
        self.transition(SyncPhase::Finished);
        let mut actions = self.cancel_timers();
        actions.extend(self.complete(SyncOutcome::Finished {
            height: self.chain.height,
        }));
        actions
    }

    fn complete(&mut self, outcome: SyncOutcome) -> Option<Action> {
        if std::mem::replace(&mut self.completed, true) {
            return None;
        }
        Some(Action::SyncCompleted { outcome })
    }

    fn transition(&mut self, to: SyncPhase) {
        if self.phase != to {
            debug!(from = %self.phase, to = %to, "Sync phase transition");
            self.phase = to;
        }
    }

    fn arm_timers(&self) -> Vec<Action> {
        vec![
            Action::SetTimer {
                id: TimerId::TimeoutCheck,
                duration: self.config.timeout_check_interval,
            },
            Action::SetTimer {
                id: TimerId::StatusUpdate,
                duration: self.config.status_update_interval,
            },
        ]
    }

    fn cancel_timers(&self) -> Vec<Action> {
        vec![
            Action::CancelTimer {
                id: TimerId::TimeoutCheck,
            },
            Action::CancelTimer {
                id: TimerId::StatusUpdate,
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════

    fn on_timeout_check(&mut self) -> Vec<Action> {
        if !self.is_syncing() {
            return vec![];
        }
        let mut actions = vec![Action::SetTimer {
            id: TimerId::TimeoutCheck,
            duration: self.config.timeout_check_interval,
        }];

        let expired = self
            .pool
            .check_timeouts(self.now, self.config.request_timeout);
        if !expired.is_empty() {
            self.stats.request_timeouts += expired.len() as u64;
            // One strike per peer per pass, however many of its requests expired.
            let offenders: BTreeSet<PeerId> = expired.iter().map(|req| req.peer).collect();
            for peer in offenders {
                if self.pool.record_timeout(peer) {
                    let strikes = self
                        .pool
                        .peers()
                        .get(peer)
                        .map_or(0, |info| info.timeout_strikes());
                    actions.extend(self.evict(peer, EvictionReason::Timeouts { strikes }));
                } else {
                    debug!(peer = %peer, "Peer missed a request deadline");
                }
            }
        }

        actions.extend(self.advance());
        actions
    }

    fn on_status_update(&mut self) -> Vec<Action> {
        if !self.is_syncing() {
            return vec![];
        }
        vec![
            Action::Broadcast {
                message: StatusRequest.into(),
            },
            Action::SetTimer {
                id: TimerId::StatusUpdate,
                duration: self.config.status_update_interval,
            },
        ]
    }

    fn is_syncing(&self) -> bool {
        matches!(self.phase, SyncPhase::WaitForPeer | SyncPhase::WaitForBlock)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Messages
    // ═══════════════════════════════════════════════════════════════════════

    fn on_message(&mut self, from: PeerId, message: SyncMessage) -> Vec<Action> {
        match message {
            SyncMessage::StatusRequest(_) => {
                vec![Action::SendToPeer {
                    peer: from,
                    message: responder::respond_to_status_request(&self.store),
                }]
            }
            SyncMessage::BlockRequest(request) => {
                self.stats.requests_served += 1;
                vec![Action::SendToPeer {
                    peer: from,
                    message: responder::respond_to_block_request(&self.store, request.height),
                }]
            }
            SyncMessage::StatusAnnounce(status) => self.on_status(from, status.height),
            SyncMessage::BlockResponse(response) => self.on_block(from, response.into_block()),
            SyncMessage::NoBlockResponse(response) => self.on_no_block(from, response.height),
        }
    }

    fn on_status(&mut self, from: PeerId, height: BlockHeight) -> Vec<Action> {
        match self.pool.update_peer_height(from, height) {
            Ok(true) => {
                debug!(peer = %from, height = height.0, "Peer height raised");
                self.advance()
            }
            Ok(false) => vec![],
            Err(e) => {
                debug!(peer = %from, error = %e, "Ignoring status");
                vec![]
            }
        }
    }

    fn on_block(&mut self, from: PeerId, block: Block) -> Vec<Action> {
        if !self.is_syncing() {
            trace!(peer = %from, height = block.height().0, "Ignoring block, not syncing");
            return vec![];
        }
        match self.pool.on_block_received(from, block) {
            Ok(_) => self.advance(),
            Err(e) => {
                self.stats.unexpected_responses += 1;
                debug!(peer = %from, error = %e, "Dropping block response");
                vec![]
            }
        }
    }

    fn on_no_block(&mut self, from: PeerId, height: BlockHeight) -> Vec<Action> {
        if !self.is_syncing() {
            return vec![];
        }
        match self.pool.on_no_block_response(from, height) {
            Ok(()) => self.advance(),
            Err(e) => {
                self.stats.unexpected_responses += 1;
                debug!(peer = %from, error = %e, "Dropping no-block response");
                vec![]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Progress
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply what can be applied, finish if caught up, otherwise fill the
    /// request window.
    fn advance(&mut self) -> Vec<Action> {
        if !self.is_syncing() {
            return vec![];
        }

        let mut actions = self.apply_ready_blocks();

        if self.pool.is_finished() {
            actions.extend(self.finish());
            return actions;
        }

        if self.pool.peers().is_empty() {
            if self.phase == SyncPhase::WaitForBlock {
                info!(base = self.pool.base().0, "All sync peers gone");
            }
            self.transition(SyncPhase::WaitForPeer);
            return actions;
        }

        let issued = self.pool.make_next_requests(self.config.request_batch_size);
        self.stats.requests_sent += issued.len() as u64;
        actions.extend(issued.into_iter().map(|req| Action::SendToPeer {
            peer: req.peer,
            message: BlockRequest::new(req.height).into(),
        }));

        // Not finished, so `base <= max_peer_height` here. With nothing in
        // flight no connected peer can serve `base` and we wait for one.
        if self.pool.num_pending() == 0 {
            if self.phase == SyncPhase::WaitForBlock {
                info!(
                    base = self.pool.base().0,
                    max_peer_height = self.pool.max_peer_height().0,
                    "No connected peer can serve the next block"
                );
            }
            self.transition(SyncPhase::WaitForPeer);
        } else {
            self.transition(SyncPhase::WaitForBlock);
        }
        actions
    }

    fn apply_ready_blocks(&mut self) -> Vec<Action> {
        let mut actions = vec![];
        loop {
            let base_before = self.pool.base();
            let result = self
                .pool
                .apply_ready(&mut self.chain, &mut self.executor, &mut self.store);
            self.stats.blocks_applied += base_before.distance_to(self.pool.base());

            match result {
                Ok(0) => break,
                Ok(applied) => {
                    debug!(
                        applied,
                        height = self.chain.height.0,
                        "Applied synced blocks"
                    );
                    break;
                }
                Err(SyncError::BadBlock {
                    peer,
                    height,
                    source,
                }) => {
                    self.stats.bad_blocks += 1;
                    warn!(peer = %peer, height = height.0, error = %source, "Peer sent bad block");
                    if self.pool.record_bad_block(peer) {
                        actions.extend(self.evict(peer, EvictionReason::BadBlock { height }));
                    }
                    // Blocks after the discarded one may still apply later;
                    // the gap stops this loop on the next pass.
                }
                Err(e) => {
                    error!(error = %e, "Failed to apply synced block");
                    break;
                }
            }
        }
        actions
    }

    fn evict(&mut self, peer: PeerId, reason: EvictionReason) -> Vec<Action> {
        let orphaned = self.pool.evict_peer(peer);
        self.stats.peers_evicted += 1;
        warn!(peer = %peer, %reason, orphaned = orphaned.len(), "Evicting sync peer");
        vec![Action::DisconnectPeer { peer, reason }]
    }
}

impl<S: BlockStore, E: BlockExecutor> StateMachine for SyncStateMachine<S, E> {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.phase == SyncPhase::Stopped {
            trace!(event = event.type_name(), "Ignoring event after stop");
            return vec![];
        }
        match event {
            Event::Stop => self.on_stop(),
            Event::PeerJoined { peer, height } => self.on_peer_joined(peer, height),
            Event::PeerLeft { peer } => self.on_peer_left(peer),
            Event::MessageReceived { from, message } => self.on_message(from, message),
            Event::TimeoutCheckTimer => self.on_timeout_check(),
            Event::StatusUpdateTimer => self.on_status_update(),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.pool.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl<S, E> fmt::Debug for SyncStateMachine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStateMachine")
            .field("phase", &self.phase)
            .field("height", &self.chain.height)
            .field("base", &self.pool.base())
            .field("max_peer_height", &self.pool.max_peer_height())
            .field("pending", &self.pool.num_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastsync_engine::{ChainExecutor, MemBlockStore};
    use fastsync_messages::{BlockResponse, NoBlockResponse, StatusAnnounce};
    use fastsync_test_helpers::{store_matches, TestChain};
    use tracing_test::traced_test;

    type Machine = SyncStateMachine<MemBlockStore, ChainExecutor>;

    fn config() -> SyncConfig {
        SyncConfig {
            request_batch_size: 8,
            max_pending_per_peer: 8,
            ..Default::default()
        }
    }

    fn machine_at(chain: &TestChain, height: u64, config: SyncConfig) -> Machine {
        SyncStateMachine::new(
            config,
            chain.state_at(height),
            chain.store_up_to(height),
            ChainExecutor::new(),
        )
    }

    fn block_requests(actions: &[Action]) -> Vec<(PeerId, BlockHeight)> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::SendToPeer {
                    peer,
                    message: SyncMessage::BlockRequest(req),
                } => Some((*peer, req.height)),
                _ => None,
            })
            .collect()
    }

    fn completions(actions: &[Action]) -> Vec<SyncOutcome> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::SyncCompleted { outcome } => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    fn block_from(peer: PeerId, block: &Block) -> Event {
        Event::MessageReceived {
            from: peer,
            message: BlockResponse::new(block.clone()).into(),
        }
    }

    /// Answer every block request in `actions` from `chain`, repeating until
    /// no new requests appear. Returns every action produced.
    fn serve_all(machine: &mut Machine, chain: &TestChain, first: Vec<Action>) -> Vec<Action> {
        let mut all = first.clone();
        let mut queue = block_requests(&first);
        while let Some((peer, height)) = queue.pop() {
            let actions = machine.handle(block_from(peer, chain.block(height.0)));
            queue.extend(block_requests(&actions));
            all.extend(actions);
        }
        all
    }

    #[traced_test]
    #[test]
    fn test_first_peer_starts_sync() {
        let chain = TestChain::honest(20);
        let config = SyncConfig {
            max_pending_per_peer: 4,
            ..config()
        };
        let mut machine = machine_at(&chain, 0, config);
        assert_eq!(machine.phase(), SyncPhase::Init);

        let actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(20),
        });

        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::TimeoutCheck,
                ..
            }
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::StatusUpdate,
                ..
            }
        )));
        // Capped by the per-peer capacity.
        let requests = block_requests(&actions);
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0], (PeerId(1), BlockHeight(1)));
        assert_eq!(machine.phase(), SyncPhase::WaitForBlock);
    }

    #[traced_test]
    #[test]
    fn test_syncs_to_tallest_peer_and_completes_once() {
        let chain = TestChain::honest(30);
        let mut machine = machine_at(&chain, 5, config());

        let mut actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(30),
        });
        actions.extend(machine.handle(Event::PeerJoined {
            peer: PeerId(2),
            height: BlockHeight(18),
        }));
        let all = serve_all(&mut machine, &chain, actions);

        assert_eq!(machine.phase(), SyncPhase::Finished);
        assert_eq!(
            completions(&all),
            vec![SyncOutcome::Finished {
                height: BlockHeight(30)
            }]
        );
        assert!(store_matches(machine.store(), &chain, 30));
        assert_eq!(machine.pool().base(), BlockHeight(31));
        assert_eq!(machine.stats().blocks_applied, 25);

        // Nothing requested twice or outside the range.
        let mut requested: Vec<u64> = block_requests(&all).iter().map(|(_, h)| h.0).collect();
        requested.sort_unstable();
        assert_eq!(requested, (6..=30).collect::<Vec<_>>());

        // Terminal: a late peer changes nothing.
        let late = machine.handle(Event::PeerJoined {
            peer: PeerId(3),
            height: BlockHeight(40),
        });
        assert!(block_requests(&late).is_empty());
        assert!(completions(&late).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_peer_at_our_height_finishes_immediately() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 10, config());

        let actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(10),
        });
        assert_eq!(machine.phase(), SyncPhase::Finished);
        assert_eq!(
            completions(&actions),
            vec![SyncOutcome::Finished {
                height: BlockHeight(10)
            }]
        );
        assert!(block_requests(&actions).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_unexpected_block_changes_nothing() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 0, config());
        machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(10),
        });

        let actions = machine.handle(block_from(PeerId(2), chain.block(1)));
        assert!(actions.is_empty());
        let actions = machine.handle(block_from(PeerId(1), chain.block(9)));
        assert!(actions.is_empty());

        assert_eq!(machine.stats().unexpected_responses, 2);
        assert_eq!(machine.pool().base(), BlockHeight(1));
        assert_eq!(machine.pool().num_received(), 0);
    }

    #[traced_test]
    #[test]
    fn test_bad_block_evicts_sender_and_refetches() {
        let honest = TestChain::honest(6);
        let forged = TestChain::forked(6);
        let mut machine = machine_at(&honest, 0, config());

        let mut actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(6),
        });
        actions.extend(machine.handle(Event::PeerJoined {
            peer: PeerId(2),
            height: BlockHeight(6),
        }));
        let requests = block_requests(&actions);
        assert_eq!(requests[0], (PeerId(1), BlockHeight(1)));

        let actions = machine.handle(block_from(PeerId(1), forged.block(1)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::DisconnectPeer {
                peer: PeerId(1),
                reason: EvictionReason::BadBlock {
                    height: BlockHeight(1)
                }
            }
        )));
        assert!(!machine.pool().peers().contains(PeerId(1)));
        assert_eq!(machine.stats().bad_blocks, 1);

        // Height 1 goes to the remaining peer within the same pass.
        let refetch = block_requests(&actions);
        assert!(refetch.contains(&(PeerId(2), BlockHeight(1))));

        let all = serve_all(&mut machine, &honest, actions);
        assert_eq!(machine.phase(), SyncPhase::Finished);
        assert!(store_matches(machine.store(), &honest, 6));
        assert_eq!(completions(&all).len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_silent_peer_evicted_after_timeout_strikes() {
        let chain = TestChain::honest(4);
        let config = SyncConfig {
            max_timeout_strikes: 2,
            ..config()
        };
        let mut machine = machine_at(&chain, 0, config.clone());
        machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(4),
        });

        let step = config.request_timeout + Duration::from_secs(1);
        machine.set_time(step);
        let actions = machine.handle(Event::TimeoutCheckTimer);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::TimeoutCheck,
                ..
            }
        )));
        // Re-requested from the only peer; one strike so far.
        assert_eq!(block_requests(&actions).len(), 4);
        assert_eq!(
            machine.pool().peers().get(PeerId(1)).unwrap().timeout_strikes(),
            1
        );

        machine.set_time(step * 2);
        let actions = machine.handle(Event::TimeoutCheckTimer);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::DisconnectPeer {
                peer: PeerId(1),
                reason: EvictionReason::Timeouts { .. }
            }
        )));
        assert_eq!(machine.phase(), SyncPhase::WaitForPeer);
        assert_eq!(machine.stats().peers_evicted, 1);
        assert_eq!(machine.pool().num_pending(), 0);
    }

    #[traced_test]
    #[test]
    fn test_peer_left_redistributes_requests() {
        let chain = TestChain::honest(8);
        let mut machine = machine_at(&chain, 0, config());
        let first = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(8),
        });
        assert_eq!(block_requests(&first).len(), 8);
        machine.handle(Event::PeerJoined {
            peer: PeerId(2),
            height: BlockHeight(8),
        });

        let actions = machine.handle(Event::PeerLeft { peer: PeerId(1) });
        let moved = block_requests(&actions);
        assert!(moved.iter().all(|(peer, _)| *peer == PeerId(2)));
        assert!(moved.contains(&(PeerId(2), BlockHeight(1))));

        // Losing the last peer falls back to waiting.
        machine.handle(Event::PeerLeft { peer: PeerId(2) });
        assert_eq!(machine.phase(), SyncPhase::WaitForPeer);
        assert_eq!(machine.pool().num_pending(), 0);
    }

    #[traced_test]
    #[test]
    fn test_tallest_peer_leaving_keeps_target() {
        let chain = TestChain::honest(20);
        let mut machine = machine_at(&chain, 0, config());
        let mut actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(2),
        });
        actions.extend(machine.handle(Event::PeerJoined {
            peer: PeerId(2),
            height: BlockHeight(20),
        }));

        // Serve only what peer 1 was asked for, then the tall peer leaves.
        for (peer, height) in block_requests(&actions) {
            if peer == PeerId(1) {
                machine.handle(block_from(peer, chain.block(height.0)));
            }
        }
        assert_eq!(machine.pool().base(), BlockHeight(3));
        let actions = machine.handle(Event::PeerLeft { peer: PeerId(2) });

        // Peer 1 cannot serve height 3, and the target stays at 20.
        assert!(block_requests(&actions).is_empty());
        assert!(completions(&actions).is_empty());
        assert_eq!(machine.phase(), SyncPhase::WaitForPeer);
        assert_eq!(machine.pool().max_peer_height(), BlockHeight(20));
        assert!(machine.pool().base() <= machine.pool().max_peer_height().next());

        // A new tall peer picks the sync back up.
        let actions = machine.handle(Event::PeerJoined {
            peer: PeerId(3),
            height: BlockHeight(20),
        });
        assert_eq!(machine.phase(), SyncPhase::WaitForBlock);
        let all = serve_all(&mut machine, &chain, actions);
        assert_eq!(
            completions(&all),
            vec![SyncOutcome::Finished {
                height: BlockHeight(20)
            }]
        );
        assert!(store_matches(machine.store(), &chain, 20));
    }

    #[traced_test]
    #[test]
    fn test_no_block_response_tries_another_peer() {
        let chain = TestChain::honest(5);
        let mut machine = machine_at(&chain, 0, config());
        machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(5),
        });
        machine.handle(Event::PeerJoined {
            peer: PeerId(2),
            height: BlockHeight(5),
        });
        assert_eq!(
            machine.pool().pending_request(BlockHeight(1)).unwrap().peer,
            PeerId(1)
        );

        let actions = machine.handle(Event::MessageReceived {
            from: PeerId(1),
            message: NoBlockResponse::new(BlockHeight(1)).into(),
        });
        assert_eq!(block_requests(&actions), vec![(PeerId(2), BlockHeight(1))]);
    }

    #[traced_test]
    #[test]
    fn test_status_announcement_extends_target() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 0, config());
        let actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(2),
        });
        let actions = serve_all(&mut machine, &chain, actions);
        assert_eq!(completions(&actions).len(), 1);
        assert_eq!(machine.phase(), SyncPhase::Finished);

        // A fresh machine hears about more blocks before finishing.
        let mut machine = machine_at(&chain, 0, config());
        let mut actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(2),
        });
        actions.extend(machine.handle(Event::MessageReceived {
            from: PeerId(1),
            message: StatusAnnounce::new(BlockHeight(10)).into(),
        }));
        serve_all(&mut machine, &chain, actions);
        assert_eq!(machine.chain_state().height, BlockHeight(10));
    }

    #[traced_test]
    #[test]
    fn test_status_timer_broadcasts_and_rearms() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 0, config());
        assert!(machine.handle(Event::StatusUpdateTimer).is_empty());

        machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(10),
        });
        let actions = machine.handle(Event::StatusUpdateTimer);
        assert!(matches!(
            actions[0],
            Action::Broadcast {
                message: SyncMessage::StatusRequest(_)
            }
        ));
        assert!(matches!(
            actions[1],
            Action::SetTimer {
                id: TimerId::StatusUpdate,
                ..
            }
        ));
    }

    #[traced_test]
    #[test]
    fn test_serves_requests_while_syncing() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 3, config());
        machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(10),
        });

        let actions = machine.handle(Event::MessageReceived {
            from: PeerId(7),
            message: BlockRequest::new(BlockHeight(2)).into(),
        });
        match &actions[..] {
            [Action::SendToPeer {
                peer: PeerId(7),
                message: SyncMessage::BlockResponse(resp),
            }] => assert_eq!(&resp.block, chain.block(2)),
            other => panic!("unexpected actions: {other:?}"),
        }

        let actions = machine.handle(Event::MessageReceived {
            from: PeerId(7),
            message: StatusRequest.into(),
        });
        assert!(matches!(
            &actions[..],
            [Action::SendToPeer {
                message: SyncMessage::StatusAnnounce(StatusAnnounce {
                    height: BlockHeight(3)
                }),
                ..
            }]
        ));
    }

    #[traced_test]
    #[test]
    fn test_stop_is_terminal() {
        let chain = TestChain::honest(10);
        let mut machine = machine_at(&chain, 0, config());
        let first = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(10),
        });

        let actions = machine.handle(Event::Stop);
        assert_eq!(machine.phase(), SyncPhase::Stopped);
        assert_eq!(
            completions(&actions),
            vec![SyncOutcome::Stopped {
                height: BlockHeight::GENESIS
            }]
        );
        assert!(actions.iter().any(|a| matches!(a, Action::CancelTimer { .. })));

        // Late responses, requests and a second stop are all ignored.
        let (peer, height) = block_requests(&first)[0];
        assert!(machine.handle(block_from(peer, chain.block(height.0))).is_empty());
        assert!(machine
            .handle(Event::MessageReceived {
                from: PeerId(2),
                message: BlockRequest::new(BlockHeight(1)).into(),
            })
            .is_empty());
        assert!(machine.handle(Event::Stop).is_empty());
        assert_eq!(machine.store().height(), BlockHeight::GENESIS);
    }

    #[traced_test]
    #[test]
    fn test_stop_after_finish_does_not_complete_twice() {
        let chain = TestChain::honest(3);
        let mut machine = machine_at(&chain, 3, config());
        let actions = machine.handle(Event::PeerJoined {
            peer: PeerId(1),
            height: BlockHeight(3),
        });
        assert_eq!(completions(&actions).len(), 1);

        let actions = machine.handle(Event::Stop);
        assert!(completions(&actions).is_empty());
        assert_eq!(machine.phase(), SyncPhase::Stopped);
    }
}
