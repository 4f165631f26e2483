//! In-process network connecting sync runners.
//!
//! Every frame goes through the wire codec, so a message crossing this
//! network is encoded, compressed, decompressed and decoded exactly as it
//! would be on a socket. Inbound requests are rate limited per sender at the
//! receiving node.
//!
//! Messages go to a node's bounded message queue and are dropped when it is
//! full. Peer joins and departures go to its unbounded peer queue and are
//! never dropped while the node is running.

use super::codec::{decode_message, encode_message, topic_for_message};
use super::rate_limiter::{RateLimitConfig, SyncRateLimiter};
use crate::RunnerInbox;
use fastsync_core::{Event, Transport};
use fastsync_messages::SyncMessage;
use fastsync_types::{BlockHeight, PeerId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("Peer already registered: {0}")]
    AlreadyRegistered(PeerId),

    #[error("Peer cannot connect to itself: {0}")]
    SelfConnection(PeerId),
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub delivered: u64,
    pub dropped_unconnected: u64,
    pub dropped_rate_limited: u64,
    pub dropped_queue_full: u64,
    pub codec_failures: u64,
}

#[derive(Debug)]
struct NodeEntry {
    inbox: RunnerInbox,
    limiter: SyncRateLimiter,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<PeerId, NodeEntry>,
    /// Undirected links, stored with the lower id first.
    links: BTreeSet<(PeerId, PeerId)>,
    stats: NetworkStats,
}

impl Inner {
    /// Post a peer join or departure.
    fn notify(&self, to: PeerId, event: Event) {
        let Some(node) = self.nodes.get(&to) else {
            return;
        };
        if node.inbox.peers.send(event).is_err() {
            debug!(peer = %to, "Runner gone, peer event not delivered");
        }
    }

    fn push_message(&mut self, to: PeerId, event: Event) {
        let Some(node) = self.nodes.get(&to) else {
            return;
        };
        match node.inbox.messages.try_send(event) {
            Ok(()) => self.stats.delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped_queue_full += 1;
                warn!(peer = %to, "Message queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(peer = %to, "Runner gone, message not delivered");
            }
        }
    }

    fn height_of(&self, id: PeerId) -> Result<BlockHeight, NetworkError> {
        self.nodes
            .get(&id)
            .map(|node| *node.inbox.height.borrow())
            .ok_or(NetworkError::UnknownPeer(id))
    }

    fn neighbours(&self, id: PeerId) -> Vec<PeerId> {
        self.links
            .iter()
            .filter_map(|&(a, b)| match (a == id, b == id) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }
}

fn link(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    (a.min(b), a.max(b))
}

/// A set of runners exchanging encoded frames over tokio channels.
#[derive(Debug)]
pub struct LocalNetwork {
    rate_limit: RateLimitConfig,
    inner: Mutex<Inner>,
}

impl LocalNetwork {
    pub fn new(rate_limit: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            rate_limit,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Attach a node through its runner's inbox.
    pub fn register(
        self: &Arc<Self>,
        id: PeerId,
        inbox: RunnerInbox,
    ) -> Result<LocalTransport, NetworkError> {
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(&id) {
            return Err(NetworkError::AlreadyRegistered(id));
        }
        inner.nodes.insert(
            id,
            NodeEntry {
                inbox,
                limiter: SyncRateLimiter::new(self.rate_limit.clone()),
            },
        );
        debug!(peer = %id, "Registered node");
        Ok(LocalTransport {
            id,
            network: Arc::clone(self),
        })
    }

    /// Detach a node, closing every link it had.
    pub fn unregister(&self, id: PeerId) {
        let mut inner = self.inner.lock();
        if inner.nodes.remove(&id).is_none() {
            return;
        }
        for peer in inner.neighbours(id) {
            inner.links.remove(&link(id, peer));
            inner.notify(peer, Event::PeerLeft { peer: id });
        }
    }

    /// Link two nodes. Each side learns the other's current height.
    ///
    /// Returns false if they were already linked.
    pub fn connect(&self, a: PeerId, b: PeerId) -> Result<bool, NetworkError> {
        if a == b {
            return Err(NetworkError::SelfConnection(a));
        }
        let mut inner = self.inner.lock();
        let height_a = inner.height_of(a)?;
        let height_b = inner.height_of(b)?;
        if !inner.links.insert(link(a, b)) {
            return Ok(false);
        }
        debug!(a = %a, b = %b, "Connected");
        inner.notify(
            a,
            Event::PeerJoined {
                peer: b,
                height: height_b,
            },
        );
        inner.notify(
            b,
            Event::PeerJoined {
                peer: a,
                height: height_a,
            },
        );
        Ok(true)
    }

    /// Unlink two nodes. Both sides see the other leave.
    pub fn disconnect(&self, a: PeerId, b: PeerId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.links.remove(&link(a, b)) {
            return false;
        }
        inner.notify(a, Event::PeerLeft { peer: b });
        inner.notify(b, Event::PeerLeft { peer: a });
        true
    }

    pub fn is_connected(&self, a: PeerId, b: PeerId) -> bool {
        self.inner.lock().links.contains(&link(a, b))
    }

    /// Nodes linked to `id`, in id order.
    pub fn neighbours(&self, id: PeerId) -> Vec<PeerId> {
        self.inner.lock().neighbours(id)
    }

    pub fn stats(&self) -> NetworkStats {
        self.inner.lock().stats
    }

    /// Close a link from one side. Only the remote side is notified; the
    /// closing side already dropped the peer.
    fn close(&self, by: PeerId, peer: PeerId) {
        let mut inner = self.inner.lock();
        if inner.links.remove(&link(by, peer)) {
            debug!(by = %by, peer = %peer, "Link closed");
            inner.notify(peer, Event::PeerLeft { peer: by });
        }
    }

    fn deliver(&self, from: PeerId, to: PeerId, message: &SyncMessage) {
        let topic = topic_for_message(message);
        let frame = match encode_message(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, %topic, "Failed to encode message");
                self.inner.lock().stats.codec_failures += 1;
                return;
            }
        };

        let mut inner = self.inner.lock();
        if !inner.links.contains(&link(from, to)) {
            inner.stats.dropped_unconnected += 1;
            trace!(from = %from, to = %to, %topic, "Dropping message to unlinked peer");
            return;
        }
        if message.is_request() {
            let allowed = inner
                .nodes
                .get_mut(&to)
                .is_some_and(|node| node.limiter.check_request(from));
            if !allowed {
                inner.stats.dropped_rate_limited += 1;
                debug!(from = %from, to = %to, %topic, "Request rate limited");
                return;
            }
        }

        match decode_message(&topic, &frame) {
            Ok(message) => inner.push_message(to, Event::MessageReceived { from, message }),
            Err(e) => {
                inner.stats.codec_failures += 1;
                warn!(error = %e, %topic, "Failed to decode frame");
            }
        }
    }
}

/// One node's handle on a [`LocalNetwork`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    id: PeerId,
    network: Arc<LocalNetwork>,
}

impl LocalTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }
}

impl Transport for LocalTransport {
    fn send(&self, peer: PeerId, message: SyncMessage) {
        self.network.deliver(self.id, peer, &message);
    }

    fn broadcast(&self, message: SyncMessage) {
        for peer in self.network.neighbours(self.id) {
            self.network.deliver(self.id, peer, &message);
        }
    }

    fn disconnect(&self, peer: PeerId) {
        self.network.close(self.id, peer);
    }
}
