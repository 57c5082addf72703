//! Invocation metrics — in-memory counters read back as a snapshot
//!
//! Counters are advisory telemetry, not a ledger: individual atomics keep
//! recording cheap and contention-free, and the snapshot derives `total`
//! from the outcome counters so the total always equals their sum.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal outcome of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ValidationError,
    RateLimited,
    UpstreamError,
    InternalError,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ValidationError => "validation_error",
            Outcome::RateLimited => "rate_limited",
            Outcome::UpstreamError => "upstream_error",
            Outcome::InternalError => "internal_error",
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

#[derive(Default)]
struct OperationCounters {
    count: AtomicU64,
    errors: AtomicU64,
    duration_ms: AtomicU64,
}

/// Collects per-invocation counters; snapshots are read on demand
#[derive(Default)]
pub struct MetricsCollector {
    success: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    duration_ms: AtomicU64,
    per_operation: DashMap<String, OperationCounters>,
}

/// Per-operation breakdown inside a snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationSnapshot {
    pub count: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
}

/// Aggregate view of all completed invocations
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub success_rate: f64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub operations: BTreeMap<String, OperationSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed invocation
    pub fn record(&self, operation: &str, outcome: Outcome, duration_ms: u64) {
        match outcome {
            Outcome::Success => self.success.fetch_add(1, Ordering::Relaxed),
            Outcome::RateLimited => self.rate_limited.fetch_add(1, Ordering::Relaxed),
            Outcome::ValidationError | Outcome::UpstreamError | Outcome::InternalError => {
                self.failed.fetch_add(1, Ordering::Relaxed)
            }
        };
        self.duration_ms.fetch_add(duration_ms, Ordering::Relaxed);

        let entry = self.per_operation.entry(operation.to_string()).or_default();
        entry.count.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_success() {
            entry.errors.fetch_add(1, Ordering::Relaxed);
        }
        entry.duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Aggregate view of everything recorded so far. `total` is derived
    /// from the outcome counters, so `total == success + failed +
    /// rate_limited` holds in every snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let success = self.success.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        let total = success + failed + rate_limited;
        let total_duration_ms = self.duration_ms.load(Ordering::Relaxed);

        let success_rate = if total == 0 {
            0.0
        } else {
            success as f64 / total as f64 * 100.0
        };
        let avg_duration_ms = if total == 0 {
            0.0
        } else {
            total_duration_ms as f64 / total as f64
        };

        let operations = self
            .per_operation
            .iter()
            .map(|entry| {
                let count = entry.value().count.load(Ordering::Relaxed);
                let duration = entry.value().duration_ms.load(Ordering::Relaxed);
                (
                    entry.key().clone(),
                    OperationSnapshot {
                        count,
                        errors: entry.value().errors.load(Ordering::Relaxed),
                        total_duration_ms: duration,
                        avg_duration_ms: if count == 0 {
                            0.0
                        } else {
                            duration as f64 / count as f64
                        },
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            total,
            success,
            failed,
            rate_limited,
            success_rate,
            total_duration_ms,
            avg_duration_ms,
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let metrics = MetricsCollector::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.total, 0);
        // No divide-by-zero: rates are defined as 0 for an empty collector
        assert_eq!(snap.success_rate, 0.0);
        assert_eq!(snap.avg_duration_ms, 0.0);
        assert!(snap.operations.is_empty());
    }

    #[test]
    fn test_total_equals_sum_of_outcomes() {
        let metrics = MetricsCollector::new();
        metrics.record("list_watches", Outcome::Success, 12);
        metrics.record("get_watch", Outcome::UpstreamError, 30);
        metrics.record("get_watch", Outcome::RateLimited, 0);
        metrics.record("create_watch", Outcome::ValidationError, 1);
        metrics.record("system_info", Outcome::InternalError, 5);

        let snap = metrics.snapshot();
        assert_eq!(snap.total, 5);
        assert_eq!(snap.success, 1);
        assert_eq!(snap.failed, 3);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.total, snap.success + snap.failed + snap.rate_limited);
    }

    #[test]
    fn test_success_rate() {
        let metrics = MetricsCollector::new();
        metrics.record("list_watches", Outcome::Success, 10);
        metrics.record("list_watches", Outcome::Success, 10);
        metrics.record("list_watches", Outcome::UpstreamError, 10);
        metrics.record("list_watches", Outcome::RateLimited, 0);

        let snap = metrics.snapshot();
        assert!((snap.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_per_operation_breakdown() {
        let metrics = MetricsCollector::new();
        metrics.record("get_watch", Outcome::Success, 20);
        metrics.record("get_watch", Outcome::Success, 40);
        metrics.record("get_watch", Outcome::UpstreamError, 60);
        metrics.record("delete_watch", Outcome::Success, 5);

        let snap = metrics.snapshot();
        let get_watch = &snap.operations["get_watch"];
        assert_eq!(get_watch.count, 3);
        assert_eq!(get_watch.errors, 1);
        assert_eq!(get_watch.total_duration_ms, 120);
        assert!((get_watch.avg_duration_ms - 40.0).abs() < f64::EPSILON);

        let delete_watch = &snap.operations["delete_watch"];
        assert_eq!(delete_watch.count, 1);
        assert_eq!(delete_watch.errors, 0);
    }

    #[test]
    fn test_rate_limited_counts_as_error_per_operation() {
        let metrics = MetricsCollector::new();
        metrics.record("trigger_check", Outcome::RateLimited, 0);
        let snap = metrics.snapshot();
        assert_eq!(snap.operations["trigger_check"].errors, 1);
    }

    #[test]
    fn test_snapshot_idempotent_without_records() {
        let metrics = MetricsCollector::new();
        metrics.record("list_watches", Outcome::Success, 7);
        let first = metrics.snapshot();
        let second = metrics.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_records_sum_exactly() {
        use std::sync::Arc;

        let metrics = Arc::new(MetricsCollector::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let metrics = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    let outcome = match (t + i) % 3 {
                        0 => Outcome::Success,
                        1 => Outcome::UpstreamError,
                        _ => Outcome::RateLimited,
                    };
                    metrics.record("list_watches", outcome, 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.total, 1000);
        assert_eq!(snap.total, snap.success + snap.failed + snap.rate_limited);
        assert_eq!(snap.total_duration_ms, 1000);
        assert_eq!(snap.operations["list_watches"].count, 1000);
    }
}
