//! Peer bookkeeping for block sync.
//!
//! Tracks every sync peer's announced height, its in-flight requests and its
//! standing. Strikes accumulate for timeouts and bad blocks; a peer whose
//! strikes reach the configured threshold drops out of good standing and is
//! never selected again.

use crate::{SyncConfig, SyncError};
use fastsync_types::{BlockHeight, PeerId};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, trace};

/// What the tracker knows about one peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    id: PeerId,
    height: BlockHeight,
    pending: BTreeSet<BlockHeight>,
    last_activity: Duration,
    timeout_strikes: u32,
    bad_block_strikes: u32,
    good_standing: bool,
}

impl PeerInfo {
    fn new(id: PeerId, height: BlockHeight, now: Duration) -> Self {
        Self {
            id,
            height,
            pending: BTreeSet::new(),
            last_activity: now,
            timeout_strikes: 0,
            bad_block_strikes: 0,
            good_standing: true,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Highest height the peer has announced.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Heights currently requested from this peer.
    pub fn pending_heights(&self) -> impl Iterator<Item = BlockHeight> + '_ {
        self.pending.iter().copied()
    }

    /// Time of the last announcement or delivery from this peer.
    pub fn last_activity(&self) -> Duration {
        self.last_activity
    }

    /// Consecutive timeout passes in which this peer had an expired request.
    pub fn timeout_strikes(&self) -> u32 {
        self.timeout_strikes
    }

    pub fn bad_block_strikes(&self) -> u32 {
        self.bad_block_strikes
    }

    pub fn is_good(&self) -> bool {
        self.good_standing
    }
}

/// Registry of sync peers.
#[derive(Debug)]
pub struct PeerTracker {
    peers: BTreeMap<PeerId, PeerInfo>,
    max_pending_per_peer: usize,
    max_timeout_strikes: u32,
    max_bad_block_strikes: u32,
}

impl PeerTracker {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            peers: BTreeMap::new(),
            max_pending_per_peer: config.max_pending_per_peer,
            max_timeout_strikes: config.max_timeout_strikes,
            max_bad_block_strikes: config.max_bad_block_strikes,
        }
    }

    /// Register a newly connected peer.
    pub fn add_peer(
        &mut self,
        id: PeerId,
        height: BlockHeight,
        now: Duration,
    ) -> Result<(), SyncError> {
        if self.peers.contains_key(&id) {
            return Err(SyncError::DuplicatePeer(id));
        }
        self.peers.insert(id, PeerInfo::new(id, height, now));
        debug!(peer = %id, height = height.0, "Peer added");
        Ok(())
    }

    /// Forget a peer, returning the heights that were pending on it.
    ///
    /// Removing an unknown peer is a no-op.
    pub fn remove_peer(&mut self, id: PeerId) -> BTreeSet<BlockHeight> {
        match self.peers.remove(&id) {
            Some(info) => {
                debug!(peer = %id, orphaned = info.pending.len(), "Peer removed");
                info.pending
            }
            None => BTreeSet::new(),
        }
    }

    /// Record a height announcement. Stale announcements are ignored.
    ///
    /// Returns whether the peer's height increased.
    pub fn update_height(
        &mut self,
        id: PeerId,
        height: BlockHeight,
        now: Duration,
    ) -> Result<bool, SyncError> {
        let info = self.peers.get_mut(&id).ok_or(SyncError::UnknownPeer(id))?;
        info.last_activity = now;
        if height <= info.height {
            trace!(peer = %id, announced = height.0, known = info.height.0, "Stale height announcement");
            return Ok(false);
        }
        info.height = height;
        Ok(true)
    }

    /// Choose the peer to request `height` from.
    ///
    /// Candidates must have announced at least `height`, have spare request
    /// capacity, be in good standing and not appear in `avoid`. The least
    /// loaded candidate wins; ties go to the lowest peer id.
    pub fn select_peer_for(
        &self,
        height: BlockHeight,
        avoid: Option<&BTreeSet<PeerId>>,
    ) -> Result<PeerId, SyncError> {
        self.peers
            .values()
            .filter(|p| p.good_standing)
            .filter(|p| p.height >= height)
            .filter(|p| p.pending.len() < self.max_pending_per_peer)
            .filter(|p| !avoid.is_some_and(|set| set.contains(&p.id)))
            .min_by_key(|p| (p.pending.len(), p.id))
            .map(|p| p.id)
            .ok_or(SyncError::NoEligiblePeer(height))
    }

    /// Record that `height` was requested from `id`.
    pub fn assign(&mut self, id: PeerId, height: BlockHeight) -> Result<(), SyncError> {
        let info = self.peers.get_mut(&id).ok_or(SyncError::UnknownPeer(id))?;
        info.pending.insert(height);
        Ok(())
    }

    /// Clear the request for `height` from `id`. Returns whether it was pending.
    pub fn release(&mut self, id: PeerId, height: BlockHeight) -> bool {
        self.peers
            .get_mut(&id)
            .is_some_and(|info| info.pending.remove(&height))
    }

    /// A response arrived from `id`; the peer is alive.
    pub fn record_delivery(&mut self, id: PeerId, now: Duration) {
        if let Some(info) = self.peers.get_mut(&id) {
            info.last_activity = now;
            info.timeout_strikes = 0;
        }
    }

    /// Add a timeout strike. Returns true once the peer must be evicted.
    pub fn record_timeout(&mut self, id: PeerId) -> bool {
        let threshold = self.max_timeout_strikes;
        self.strike(id, threshold, |info| &mut info.timeout_strikes)
    }

    /// Add a bad-block strike. Returns true once the peer must be evicted.
    pub fn record_bad_block(&mut self, id: PeerId) -> bool {
        let threshold = self.max_bad_block_strikes;
        self.strike(id, threshold, |info| &mut info.bad_block_strikes)
    }

    fn strike(
        &mut self,
        id: PeerId,
        threshold: u32,
        counter: impl FnOnce(&mut PeerInfo) -> &mut u32,
    ) -> bool {
        let Some(info) = self.peers.get_mut(&id) else {
            return false;
        };
        let strikes = counter(info);
        *strikes += 1;
        if *strikes >= threshold {
            info.good_standing = false;
        }
        !info.good_standing
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerInfo> {
        self.peers.get(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn tracker() -> PeerTracker {
        PeerTracker::new(&SyncConfig {
            max_pending_per_peer: 2,
            max_timeout_strikes: 2,
            max_bad_block_strikes: 1,
            ..Default::default()
        })
    }

    const T0: Duration = Duration::ZERO;

    #[traced_test]
    #[test]
    fn test_add_and_remove() {
        let mut peers = tracker();
        peers.add_peer(PeerId(1), BlockHeight(10), T0).unwrap();
        assert_eq!(
            peers.add_peer(PeerId(1), BlockHeight(12), T0),
            Err(SyncError::DuplicatePeer(PeerId(1)))
        );
        assert_eq!(peers.get(PeerId(1)).unwrap().height(), BlockHeight(10));

        peers.assign(PeerId(1), BlockHeight(3)).unwrap();
        let orphaned = peers.remove_peer(PeerId(1));
        assert_eq!(orphaned.into_iter().collect::<Vec<_>>(), vec![BlockHeight(3)]);
        assert!(peers.is_empty());

        // Second removal is a no-op.
        assert!(peers.remove_peer(PeerId(1)).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_stale_announcement_ignored() {
        let mut peers = tracker();
        peers.add_peer(PeerId(1), BlockHeight(10), T0).unwrap();

        assert_eq!(
            peers.update_height(PeerId(1), BlockHeight(8), T0),
            Ok(false)
        );
        assert_eq!(peers.get(PeerId(1)).unwrap().height(), BlockHeight(10));

        assert_eq!(
            peers.update_height(PeerId(1), BlockHeight(15), Duration::from_secs(3)),
            Ok(true)
        );
        let info = peers.get(PeerId(1)).unwrap();
        assert_eq!(info.height(), BlockHeight(15));
        assert_eq!(info.last_activity(), Duration::from_secs(3));

        assert_eq!(
            peers.update_height(PeerId(9), BlockHeight(1), T0),
            Err(SyncError::UnknownPeer(PeerId(9)))
        );
    }

    #[traced_test]
    #[test]
    fn test_selection_prefers_least_loaded_then_lowest_id() {
        let mut peers = tracker();
        peers.add_peer(PeerId(2), BlockHeight(10), T0).unwrap();
        peers.add_peer(PeerId(1), BlockHeight(10), T0).unwrap();

        assert_eq!(peers.select_peer_for(BlockHeight(1), None), Ok(PeerId(1)));

        peers.assign(PeerId(1), BlockHeight(1)).unwrap();
        assert_eq!(peers.select_peer_for(BlockHeight(2), None), Ok(PeerId(2)));
    }

    #[traced_test]
    #[test]
    fn test_selection_respects_height_capacity_and_avoid() {
        let mut peers = tracker();
        peers.add_peer(PeerId(1), BlockHeight(5), T0).unwrap();
        peers.add_peer(PeerId(2), BlockHeight(20), T0).unwrap();

        // Only peer 2 is tall enough.
        assert_eq!(peers.select_peer_for(BlockHeight(6), None), Ok(PeerId(2)));

        // Avoided peers are skipped.
        let avoid = BTreeSet::from([PeerId(1)]);
        assert_eq!(
            peers.select_peer_for(BlockHeight(1), Some(&avoid)),
            Ok(PeerId(2))
        );

        // Full peers are skipped.
        peers.assign(PeerId(2), BlockHeight(6)).unwrap();
        peers.assign(PeerId(2), BlockHeight(7)).unwrap();
        assert_eq!(
            peers.select_peer_for(BlockHeight(8), None),
            Err(SyncError::NoEligiblePeer(BlockHeight(8)))
        );

        assert!(peers.release(PeerId(2), BlockHeight(6)));
        assert!(!peers.release(PeerId(2), BlockHeight(6)));
        assert_eq!(peers.select_peer_for(BlockHeight(8), None), Ok(PeerId(2)));
    }

    #[traced_test]
    #[test]
    fn test_timeout_strikes_reset_on_delivery() {
        let mut peers = tracker();
        peers.add_peer(PeerId(1), BlockHeight(10), T0).unwrap();

        assert!(!peers.record_timeout(PeerId(1)));
        peers.record_delivery(PeerId(1), Duration::from_secs(1));
        assert_eq!(peers.get(PeerId(1)).unwrap().timeout_strikes(), 0);

        assert!(!peers.record_timeout(PeerId(1)));
        assert!(peers.record_timeout(PeerId(1)));
        assert!(!peers.get(PeerId(1)).unwrap().is_good());
        assert_eq!(
            peers.select_peer_for(BlockHeight(1), None),
            Err(SyncError::NoEligiblePeer(BlockHeight(1)))
        );
    }

    #[traced_test]
    #[test]
    fn test_bad_block_strike_evicts_at_threshold() {
        let mut peers = tracker();
        peers.add_peer(PeerId(1), BlockHeight(10), T0).unwrap();

        assert!(peers.record_bad_block(PeerId(1)));
        assert_eq!(peers.get(PeerId(1)).unwrap().bad_block_strikes(), 1);

        // Unknown peers never trigger eviction.
        assert!(!peers.record_bad_block(PeerId(7)));
    }
}
