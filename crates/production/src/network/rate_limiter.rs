//! Per-peer rate limiting for inbound sync requests.
//!
//! Uses a token bucket algorithm to limit the rate of status and block
//! requests each peer may make. Requests over the limit are dropped before
//! they reach the state machine; the requester sees them time out.

use fastsync_types::PeerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How often stale buckets are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for rate limiting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained requests per second per peer.
    pub requests_per_sec: u32,
    /// Maximum burst size (bucket capacity).
    pub burst: u32,
    /// How long to track a peer after their last request.
    pub peer_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // A syncing peer keeps at most a few dozen requests in flight,
            // so this never throttles an honest one.
            requests_per_sec: 1000,
            burst: 200,
            peer_ttl: Duration::from_secs(300),
        }
    }
}

/// Token bucket state for a single peer.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            last_update: now,
        }
    }

    /// Try to consume one token. Returns true if allowed, false if rate limited.
    fn try_consume(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_update) > ttl
    }
}

/// Per-peer rate limiter using token buckets.
#[derive(Debug)]
pub struct SyncRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<PeerId, TokenBucket>,
    last_cleanup: Instant,
}

impl SyncRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Check if a request from `peer` should be allowed now.
    pub fn check_request(&mut self, peer: PeerId) -> bool {
        self.check_request_at(peer, Instant::now())
    }

    /// Check if a request from `peer` should be allowed at `now`.
    pub fn check_request_at(&mut self, peer: PeerId, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_cleanup) > CLEANUP_INTERVAL {
            self.cleanup(now);
        }

        let config = &self.config;
        self.buckets
            .entry(peer)
            .or_insert_with(|| TokenBucket::new(config.burst, config.requests_per_sec, now))
            .try_consume(now)
    }

    /// Forget a disconnected peer.
    pub fn remove_peer(&mut self, peer: PeerId) {
        self.buckets.remove(&peer);
    }

    /// Remove stale peer entries to prevent unbounded memory growth.
    fn cleanup(&mut self, now: Instant) {
        let ttl = self.config.peer_ttl;
        self.buckets.retain(|_, bucket| !bucket.is_stale(ttl, now));
        self.last_cleanup = now;
    }

    pub fn tracked_peer_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests_per_sec: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_sec,
            burst,
            peer_ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_burst_then_limit() {
        let mut limiter = SyncRateLimiter::new(config(10, 5));
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_request_at(PeerId(1), now), "Should allow burst");
        }
        assert!(
            !limiter.check_request_at(PeerId(1), now),
            "Should rate limit after burst"
        );
    }

    #[test]
    fn test_separate_buckets_per_peer() {
        let mut limiter = SyncRateLimiter::new(config(10, 2));
        let now = Instant::now();

        assert!(limiter.check_request_at(PeerId(1), now));
        assert!(limiter.check_request_at(PeerId(1), now));
        assert!(!limiter.check_request_at(PeerId(1), now));

        assert!(limiter.check_request_at(PeerId(2), now));
        assert!(limiter.check_request_at(PeerId(2), now));
        assert_eq!(limiter.tracked_peer_count(), 2);
    }

    #[test]
    fn test_token_refill() {
        let mut limiter = SyncRateLimiter::new(config(1000, 1));
        let now = Instant::now();

        assert!(limiter.check_request_at(PeerId(1), now));
        assert!(!limiter.check_request_at(PeerId(1), now));

        // 1000/sec refills one token per millisecond.
        assert!(limiter.check_request_at(PeerId(1), now + Duration::from_millis(5)));
    }

    #[test]
    fn test_stale_peers_are_swept() {
        let mut limiter = SyncRateLimiter::new(config(10, 2));
        let start = Instant::now();
        limiter.check_request_at(PeerId(1), start);

        let later = start + CLEANUP_INTERVAL + Duration::from_secs(1);
        limiter.check_request_at(PeerId(2), later);
        assert_eq!(limiter.tracked_peer_count(), 1);

        limiter.remove_peer(PeerId(2));
        assert_eq!(limiter.tracked_peer_count(), 0);
    }
}
