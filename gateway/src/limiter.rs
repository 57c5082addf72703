//! Per-caller rate limiting with continuously refilled token buckets
//!
//! One bucket per caller identity, created full on first use. There is no
//! background refill timer: elapsed time is converted to tokens at the
//! moment of each acquire. Buckets live in a sharded map so unrelated
//! callers never serialize behind a single global lock.

use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Admission decision for one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Denied { retry_after_seconds: u64 },
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    granted: u64,
    denied: u64,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            granted: 0,
            denied: 0,
        }
    }
}

/// Read-only view of one bucket for reporting
#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    pub caller: String,
    /// Token count as of the bucket's last acquire; reading does not refill
    pub tokens: f64,
    pub granted: u64,
    pub denied: u64,
}

/// Token-bucket rate limiter keyed by caller identity
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_per_sec: f64,
    idle_window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        // Guard against a zero/negative refill rate from config
        let per_minute = config.per_minute.max(1.0 / 60.0);
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(config.burst_capacity.max(1)),
            refill_per_sec: per_minute / 60.0,
            idle_window: Duration::from_secs(config.idle_eviction_secs.max(1)),
        }
    }

    /// Try to admit one unit of work for `caller` at the given `cost`.
    ///
    /// Refill, check and debit happen under the bucket's shard lock, so two
    /// concurrent acquires for the same caller never jointly overdraw the
    /// bucket. A denial leaves the token count unchanged.
    pub fn try_acquire(&self, caller: &str, cost: f64) -> Admission {
        self.acquire_at(caller, cost, Instant::now())
    }

    fn acquire_at(&self, caller: &str, cost: f64, now: Instant) -> Admission {
        // A bucket idle past the window restarts full; its saved burst is
        // deliberately forgotten
        if let Some(entry) = self.buckets.get(caller) {
            if now.saturating_duration_since(entry.last_refill) > self.idle_window {
                drop(entry);
                self.buckets.remove(caller);
            }
        }

        let mut entry = self
            .buckets
            .entry(caller.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity, now));
        let bucket = entry.value_mut();

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            bucket.granted += 1;
            Admission::Granted
        } else {
            bucket.denied += 1;
            let deficit = cost - bucket.tokens;
            Admission::Denied {
                retry_after_seconds: (deficit / self.refill_per_sec).ceil() as u64,
            }
        }
    }

    /// Purge buckets untouched for longer than the idle window.
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= self.idle_window);
        before - self.buckets.len()
    }

    /// Best-effort snapshot of all live buckets. Token counts are reported
    /// as of each bucket's last acquire — the peek never advances refill
    /// state, so reading metrics cannot change admission outcomes.
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let mut snapshots: Vec<BucketSnapshot> = self
            .buckets
            .iter()
            .map(|entry| BucketSnapshot {
                caller: entry.key().clone(),
                tokens: entry.value().tokens,
                granted: entry.value().granted,
                denied: entry.value().denied,
            })
            .collect();
        snapshots.sort_by(|a, b| a.caller.cmp(&b.caller));
        snapshots
    }

    pub fn configured_burst(&self) -> f64 {
        self.capacity
    }

    pub fn configured_per_minute(&self) -> f64 {
        self.refill_per_sec * 60.0
    }
}
