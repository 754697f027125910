//! Per-peer rate limiting for inbound messages.
//!
//! Uses a token bucket algorithm to limit the rate of messages per peer.
//! Configured peers get higher limits than unknown senders.

use gambit_types::PeerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum messages per second for configured peers.
    pub peer_messages_per_sec: u32,
    /// Maximum burst size (bucket capacity) for configured peers.
    pub peer_burst: u32,
    /// Maximum messages per second for unknown senders.
    pub unknown_peer_messages_per_sec: u32,
    /// Maximum burst size (bucket capacity) for unknown senders.
    pub unknown_peer_burst: u32,
    /// How long to track a peer after their last message (cleanup threshold).
    pub peer_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            peer_messages_per_sec: 500,
            peer_burst: 200,
            unknown_peer_messages_per_sec: 10,
            unknown_peer_burst: 20,
            peer_ttl: Duration::from_secs(300),
        }
    }
}

/// Token bucket state for a single peer.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens available.
    tokens: f64,
    /// Maximum tokens (bucket capacity).
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last time we updated the bucket.
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
pub struct InboundRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<PeerId, TokenBucket>,
    last_cleanup: Instant,
}

impl InboundRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Check if a message from `peer` should be accepted.
    ///
    /// `is_peer` says whether the sender is in the configured peer set.
    pub fn check(&mut self, peer: &PeerId, is_peer: bool) -> bool {
        self.check_at(peer, is_peer, Instant::now())
    }

    fn check_at(&mut self, peer: &PeerId, is_peer: bool, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_cleanup) > Duration::from_secs(60) {
            self.cleanup(now);
        }

        let config = &self.config;
        let bucket = self.buckets.entry(*peer).or_insert_with(|| {
            if is_peer {
                TokenBucket::new(config.peer_burst, config.peer_messages_per_sec, now)
            } else {
                TokenBucket::new(
                    config.unknown_peer_burst,
                    config.unknown_peer_messages_per_sec,
                    now,
                )
            }
        });

        bucket.try_consume(now)
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
    use gambit_test_helpers::test_keypair;

    fn config(burst: u32, per_sec: u32) -> RateLimitConfig {
        RateLimitConfig {
            peer_messages_per_sec: per_sec,
            peer_burst: burst,
            unknown_peer_messages_per_sec: 1,
            unknown_peer_burst: 2,
            peer_ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_peer_rate_limit() {
        let mut limiter = InboundRateLimiter::new(config(5, 10));
        let peer = test_keypair(1).peer_id();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&peer, true, now), "Should allow burst");
        }
        assert!(
            !limiter.check_at(&peer, true, now),
            "Should rate limit after burst"
        );
    }

    #[test]
    fn test_unknown_peer_lower_limit() {
        let mut limiter = InboundRateLimiter::new(config(50, 100));
        let stranger = test_keypair(99).peer_id();
        let now = Instant::now();

        assert!(limiter.check_at(&stranger, false, now));
        assert!(limiter.check_at(&stranger, false, now));
        assert!(!limiter.check_at(&stranger, false, now));
    }

    #[test]
    fn test_separate_buckets_per_peer() {
        let mut limiter = InboundRateLimiter::new(config(2, 10));
        let peer1 = test_keypair(1).peer_id();
        let peer2 = test_keypair(2).peer_id();
        let now = Instant::now();

        assert!(limiter.check_at(&peer1, true, now));
        assert!(limiter.check_at(&peer1, true, now));
        assert!(!limiter.check_at(&peer1, true, now));

        assert!(limiter.check_at(&peer2, true, now));
        assert!(limiter.check_at(&peer2, true, now));
        assert_eq!(limiter.tracked_peer_count(), 2);
    }

    #[test]
    fn test_token_refill() {
        let mut limiter = InboundRateLimiter::new(config(1, 10));
        let peer = test_keypair(1).peer_id();
        let now = Instant::now();

        assert!(limiter.check_at(&peer, true, now));
        assert!(!limiter.check_at(&peer, true, now));

        // 10/sec: one token after 100ms
        let later = now + Duration::from_millis(150);
        assert!(limiter.check_at(&peer, true, later));
        assert!(!limiter.check_at(&peer, true, later));
    }

    #[test]
    fn test_stale_buckets_dropped() {
        let mut limiter = InboundRateLimiter::new(config(1, 10));
        let now = Instant::now();
        limiter.check_at(&test_keypair(1).peer_id(), true, now);
        assert_eq!(limiter.tracked_peer_count(), 1);

        let much_later = now + Duration::from_secs(120);
        limiter.check_at(&test_keypair(2).peer_id(), true, much_later);
        assert_eq!(limiter.tracked_peer_count(), 1);
    }
}
