//! Block pool: request scheduling, response buffering and in-order apply.
//!
//! The pool owns the [`PeerTracker`] and three maps keyed by height:
//!
//! - `pending`: heights requested and not yet answered (at most one peer each)
//! - `received`: blocks delivered and waiting for their turn to be applied
//! - `avoid`: peers that answered "no block" for a height
//!
//! Blocks are applied strictly in height order starting at `base`, the
//! lowest height not yet applied. Requests are only issued inside the window
//! `[base, base + batch_size)`, which bounds how many blocks are buffered.

use crate::{PeerTracker, SyncConfig, SyncError};
use fastsync_core::{ApplyError, BlockExecutor, BlockStore};
use fastsync_types::{Block, BlockHeight, ChainState, Hash, PeerId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An outstanding block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub height: BlockHeight,
    pub peer: PeerId,
    pub issued_at: Duration,
}

/// A delivered block waiting to be applied.
#[derive(Debug)]
struct ReceivedBlock {
    block: Block,
    peer: PeerId,
}

/// Scheduler and buffer for fast-sync blocks.
#[derive(Debug)]
pub struct BlockPool {
    /// Lowest height not yet applied.
    base: BlockHeight,
    peers: PeerTracker,
    pending: BTreeMap<BlockHeight, PendingRequest>,
    received: BTreeMap<BlockHeight, ReceivedBlock>,
    avoid: HashMap<BlockHeight, BTreeSet<PeerId>>,
    /// Highest height any peer has announced this session. Never lowered.
    max_peer_height: BlockHeight,
    stopped: bool,
    now: Duration,
}

impl BlockPool {
    /// Create a pool whose first height to apply is `base`.
    pub fn new(config: &SyncConfig, base: BlockHeight) -> Self {
        Self {
            base,
            peers: PeerTracker::new(config),
            pending: BTreeMap::new(),
            received: BTreeMap::new(),
            avoid: HashMap::new(),
            max_peer_height: BlockHeight::GENESIS,
            stopped: false,
            now: Duration::ZERO,
        }
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peers
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_peer(&mut self, peer: PeerId, height: BlockHeight) -> Result<(), SyncError> {
        self.peers.add_peer(peer, height, self.now)?;
        self.raise_max_peer_height(height);
        Ok(())
    }

    /// Record a status announcement.
    ///
    /// A peer that reports progress gets another chance at heights it
    /// previously had no block for.
    pub fn update_peer_height(
        &mut self,
        peer: PeerId,
        height: BlockHeight,
    ) -> Result<bool, SyncError> {
        let raised = self.peers.update_height(peer, height, self.now)?;
        if raised {
            self.raise_max_peer_height(height);
            self.forget_avoidance(peer);
        }
        Ok(raised)
    }

    fn raise_max_peer_height(&mut self, height: BlockHeight) {
        if height > self.max_peer_height {
            debug!(
                from = self.max_peer_height.0,
                to = height.0,
                "Raised sync target"
            );
            self.max_peer_height = height;
        }
    }

    /// Remove a disconnected peer.
    ///
    /// Its pending heights become unassigned and are returned so the caller
    /// can reschedule them. Blocks it already delivered stay buffered, and
    /// the height it announced still counts towards [`Self::max_peer_height`].
    pub fn remove_peer(&mut self, peer: PeerId) -> Vec<BlockHeight> {
        let orphaned = self.peers.remove_peer(peer);
        for height in &orphaned {
            self.pending.remove(height);
        }
        self.forget_avoidance(peer);
        orphaned.into_iter().collect()
    }

    /// Remove a misbehaving peer and discard every unapplied block it sent.
    pub fn evict_peer(&mut self, peer: PeerId) -> Vec<BlockHeight> {
        let orphaned = self.remove_peer(peer);
        let before = self.received.len();
        self.received.retain(|_, entry| entry.peer != peer);
        let discarded = before - self.received.len();
        if discarded > 0 {
            debug!(peer = %peer, discarded, "Discarded buffered blocks from evicted peer");
        }
        orphaned
    }

    /// Add a timeout strike. Returns true once the peer must be evicted.
    pub fn record_timeout(&mut self, peer: PeerId) -> bool {
        self.peers.record_timeout(peer)
    }

    /// Add a bad-block strike. Returns true once the peer must be evicted.
    pub fn record_bad_block(&mut self, peer: PeerId) -> bool {
        self.peers.record_bad_block(peer)
    }

    fn forget_avoidance(&mut self, peer: PeerId) {
        self.avoid.retain(|_, set| {
            set.remove(&peer);
            !set.is_empty()
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scheduling
    // ═══════════════════════════════════════════════════════════════════════

    /// Issue requests for every unrequested height in the window.
    ///
    /// Heights already pending or received are skipped, as are heights no
    /// peer can currently serve. Returns the requests issued by this call.
    pub fn make_next_requests(&mut self, batch_size: u64) -> Vec<PendingRequest> {
        let mut issued = Vec::new();
        if self.stopped || batch_size == 0 {
            return issued;
        }

        let max = self.max_peer_height;
        if max < self.base {
            return issued;
        }

        let end = self
            .base
            .0
            .saturating_add(batch_size - 1)
            .min(max.0);

        for h in self.base.0..=end {
            let height = BlockHeight(h);
            if self.pending.contains_key(&height) || self.received.contains_key(&height) {
                continue;
            }

            let peer = match self.peers.select_peer_for(height, self.avoid.get(&height)) {
                Ok(peer) => peer,
                Err(e) => {
                    trace!(height = h, error = %e, "Deferring request");
                    continue;
                }
            };
            if let Err(e) = self.peers.assign(peer, height) {
                warn!(height = h, error = %e, "Selected peer vanished");
                continue;
            }

            let request = PendingRequest {
                height,
                peer,
                issued_at: self.now,
            };
            self.pending.insert(height, request);
            issued.push(request);
        }

        if !issued.is_empty() {
            debug!(
                base = self.base.0,
                max_peer_height = max.0,
                count = issued.len(),
                "Issued block requests"
            );
        }
        issued
    }

    /// Expire requests issued more than `timeout` ago.
    ///
    /// Expired heights become unassigned. Returns the expired requests.
    pub fn check_timeouts(&mut self, now: Duration, timeout: Duration) -> Vec<PendingRequest> {
        let expired: Vec<PendingRequest> = self
            .pending
            .values()
            .filter(|req| now.saturating_sub(req.issued_at) > timeout)
            .copied()
            .collect();

        for req in &expired {
            self.pending.remove(&req.height);
            self.peers.release(req.peer, req.height);
            debug!(height = req.height.0, peer = %req.peer, "Block request timed out");
        }
        expired
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Responses
    // ═══════════════════════════════════════════════════════════════════════

    /// Accept a block from `peer`.
    ///
    /// The block must answer a request pending on that same peer; anything
    /// else is rejected with [`SyncError::UnexpectedBlock`] and leaves the
    /// pool untouched. Returns whether the block sits at `base` and can be
    /// applied right away.
    pub fn on_block_received(&mut self, peer: PeerId, block: Block) -> Result<bool, SyncError> {
        let height = block.height();
        self.take_pending(peer, height)?;

        self.peers.record_delivery(peer, self.now);
        self.avoid.remove(&height);

        trace!(height = height.0, peer = %peer, block = ?block.hash(), "Block received");
        self.received.insert(height, ReceivedBlock { block, peer });
        Ok(height == self.base)
    }

    /// `peer` does not have the block at `height`.
    ///
    /// The height becomes unassigned and `peer` will not be asked for it
    /// again until it announces a higher status.
    pub fn on_no_block_response(
        &mut self,
        peer: PeerId,
        height: BlockHeight,
    ) -> Result<(), SyncError> {
        self.take_pending(peer, height)?;
        self.peers.record_delivery(peer, self.now);
        self.avoid.entry(height).or_default().insert(peer);
        debug!(height = height.0, peer = %peer, "Peer has no block");
        Ok(())
    }

    fn take_pending(&mut self, peer: PeerId, height: BlockHeight) -> Result<(), SyncError> {
        match self.pending.get(&height) {
            Some(req) if req.peer == peer => {
                self.pending.remove(&height);
                self.peers.release(peer, height);
                Ok(())
            }
            _ => Err(SyncError::UnexpectedBlock { peer, height }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Apply
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply buffered blocks in order starting at `base`.
    ///
    /// Each block is verified and executed against `state`, then persisted.
    /// Only after both succeed do `state` and `base` advance. Stops at the
    /// first gap.
    ///
    /// The block id a block is checked against comes from the parent hash of
    /// the block buffered right after it. When that block has not arrived
    /// yet, the block is pinned to its own hash and verification rests on the
    /// parent link and the seal.
    ///
    /// A block that fails verification is discarded and returned as
    /// [`SyncError::BadBlock`] naming the peer that sent it; that peer is
    /// also kept off the height. If the block at `base` verifies but does not
    /// match the id its successor points at, the successor is the one
    /// discarded and blamed. A block the store refuses stays buffered and is
    /// returned as [`SyncError::Store`]. Blocks applied before a failure stay
    /// applied.
    pub fn apply_ready<S, E>(
        &mut self,
        state: &mut ChainState,
        executor: &mut E,
        store: &mut S,
    ) -> Result<u64, SyncError>
    where
        S: BlockStore + ?Sized,
        E: BlockExecutor + ?Sized,
    {
        let mut applied = 0;
        while let Some(entry) = self.received.remove(&self.base) {
            let height = self.base;
            let expected_id = self.expected_block_id(&entry.block);

            let next_state = match executor.apply_block(state, &expected_id, &entry.block) {
                Ok(next) => next,
                Err(source) => {
                    if matches!(source, ApplyError::BlockIdMismatch { .. }) {
                        if let Some(next) = self.received.remove(&height.next()) {
                            self.received.insert(height, entry);
                            return Err(self.blame(next.peer, height.next(), source));
                        }
                    }
                    return Err(self.blame(entry.peer, height, source));
                }
            };

            if let Err(source) = store.save_block(entry.block.clone()) {
                self.received.insert(height, entry);
                return Err(SyncError::Store { height, source });
            }

            *state = next_state;
            self.base = height.next();
            applied += 1;
            trace!(height = height.0, peer = %entry.peer, "Block applied");
        }
        Ok(applied)
    }

    fn expected_block_id(&self, block: &Block) -> Hash {
        self.received
            .get(&block.height().next())
            .map(|next| next.block.header.parent_hash)
            .unwrap_or_else(|| block.hash())
    }

    fn blame(&mut self, peer: PeerId, height: BlockHeight, source: ApplyError) -> SyncError {
        self.avoid.entry(height).or_default().insert(peer);
        SyncError::BadBlock {
            peer,
            height,
            source,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Status
    // ═══════════════════════════════════════════════════════════════════════

    /// True once every height up to the highest announced peer height is
    /// applied, or the pool is stopped. A pool without peers is never
    /// finished.
    pub fn is_finished(&self) -> bool {
        self.stopped || (!self.peers.is_empty() && self.base > self.max_peer_height)
    }

    /// Stop scheduling. Pending requests are dropped and no new ones issued.
    pub fn stop(&mut self) {
        self.stopped = true;
        for (height, req) in std::mem::take(&mut self.pending) {
            self.peers.release(req.peer, height);
        }
    }

    pub fn base(&self) -> BlockHeight {
        self.base
    }

    /// Highest height announced by any peer since the pool was created.
    ///
    /// Does not drop when the tallest peer leaves or is evicted.
    pub fn max_peer_height(&self) -> BlockHeight {
        self.max_peer_height
    }

    pub fn peers(&self) -> &PeerTracker {
        &self.peers
    }

    pub fn pending_request(&self, height: BlockHeight) -> Option<&PendingRequest> {
        self.pending.get(&height)
    }

    pub fn pending_heights(&self) -> impl Iterator<Item = BlockHeight> + '_ {
        self.pending.keys().copied()
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn has_received(&self, height: BlockHeight) -> bool {
        self.received.contains_key(&height)
    }

    pub fn num_received(&self) -> usize {
        self.received.len()
    }

    pub fn is_avoided(&self, height: BlockHeight, peer: PeerId) -> bool {
        self.avoid.get(&height).is_some_and(|set| set.contains(&peer))
    }
}
