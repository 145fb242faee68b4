//! Cache statistics and telemetry tracking
//!
//! Tracks hit/miss effectiveness per data domain so the admin view can show
//! how much the cache is actually saving in external calls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kisanmandi_domain::{Namespace, NamespaceStats};

/// Sentinel for "no lookup recorded yet" in the last-updated slot.
const NEVER: i64 = i64::MIN;

#[derive(Debug)]
struct NamespaceCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    last_updated_ms: AtomicI64,
}

impl NamespaceCounters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            last_updated_ms: AtomicI64::new(NEVER),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.last_updated_ms.store(NEVER, Ordering::Relaxed);
    }

    fn snapshot(&self) -> NamespaceStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate_pct = if total == 0 { 0.0 } else { 100.0 * hits as f64 / total as f64 };
        let last_updated = match self.last_updated_ms.load(Ordering::Relaxed) {
            NEVER => None,
            ms => DateTime::from_timestamp_millis(ms),
        };
        NamespaceStats { hits, misses, total, hit_rate_pct, last_updated }
    }
}

/// Thread-safe per-namespace hit/miss tracker.
///
/// Uses atomic counters so recording adds no lock contention to lookups.
/// Clones share the same underlying counters.
#[derive(Debug, Clone)]
pub struct StatisticsTracker {
    counters: Arc<[NamespaceCounters; 3]>,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            counters: Arc::new([
                NamespaceCounters::new(),
                NamespaceCounters::new(),
                NamespaceCounters::new(),
            ]),
        }
    }

    fn slot(&self, namespace: Namespace) -> &NamespaceCounters {
        match namespace {
            Namespace::Weather => &self.counters[0],
            Namespace::MarketPrice => &self.counters[1],
            Namespace::Prediction => &self.counters[2],
        }
    }

    /// Record a lookup satisfied from cache.
    pub fn record_hit(&self, namespace: Namespace, now: DateTime<Utc>) {
        let slot = self.slot(namespace);
        slot.hits.fetch_add(1, Ordering::Relaxed);
        slot.last_updated_ms.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    /// Record a lookup that fell through to the external source.
    pub fn record_miss(&self, namespace: Namespace, now: DateTime<Utc>) {
        let slot = self.slot(namespace);
        slot.misses.fetch_add(1, Ordering::Relaxed);
        slot.last_updated_ms.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    /// Snapshot one namespace.
    pub fn snapshot_for(&self, namespace: Namespace) -> NamespaceStats {
        self.slot(namespace).snapshot()
    }

    /// Snapshot every namespace.
    pub fn snapshot(&self) -> BTreeMap<Namespace, NamespaceStats> {
        Namespace::ALL.iter().map(|&ns| (ns, self.snapshot_for(ns))).collect()
    }

    /// Zero every counter. Used by the administrative "clear all" action.
    pub fn reset_all(&self) {
        for counters in self.counters.iter() {
            counters.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::stats.
    use std::thread;

    use super::*;

    #[test]
    fn test_fresh_tracker_reports_zero_rate() {
        let tracker = StatisticsTracker::new();
        let stats = tracker.snapshot_for(Namespace::Weather);

        assert_eq!(stats.total, 0);
        assert_eq!(stats.hit_rate_pct, 0.0);
        assert!(stats.last_updated.is_none());
    }

    #[test]
    fn test_hit_rate_formula() {
        let tracker = StatisticsTracker::new();
        let now = Utc::now();

        for _ in 0..3 {
            tracker.record_hit(Namespace::MarketPrice, now);
        }
        tracker.record_miss(Namespace::MarketPrice, now);

        let stats = tracker.snapshot_for(Namespace::MarketPrice);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.hit_rate_pct, 75.0);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let tracker = StatisticsTracker::new();
        let now = Utc::now();

        tracker.record_hit(Namespace::Weather, now);

        assert_eq!(tracker.snapshot_for(Namespace::Weather).hits, 1);
        assert_eq!(tracker.snapshot_for(Namespace::Prediction).total, 0);
    }

    #[test]
    fn test_last_updated_follows_clock() {
        let tracker = StatisticsTracker::new();
        let now = DateTime::from_timestamp_millis(1_760_000_000_000).expect("valid millis");

        tracker.record_miss(Namespace::Prediction, now);

        assert_eq!(tracker.snapshot_for(Namespace::Prediction).last_updated, Some(now));
    }

    #[test]
    fn test_reset_all_zeroes_counters() {
        let tracker = StatisticsTracker::new();
        let now = Utc::now();
        tracker.record_hit(Namespace::Weather, now);
        tracker.record_miss(Namespace::Prediction, now);

        tracker.reset_all();

        for (_, stats) in tracker.snapshot() {
            assert_eq!(stats.total, 0);
            assert!(stats.last_updated.is_none());
        }
    }

    #[test]
    fn test_clone_shares_counters() {
        let tracker1 = StatisticsTracker::new();
        let tracker2 = tracker1.clone();

        tracker1.record_hit(Namespace::Weather, Utc::now());
        tracker2.record_hit(Namespace::Weather, Utc::now());

        assert_eq!(tracker1.snapshot_for(Namespace::Weather).hits, 2);
    }

    #[test]
    fn test_concurrent_increments_never_lose_updates() {
        let tracker = StatisticsTracker::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    tracker.record_hit(Namespace::MarketPrice, Utc::now());
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread completes");
        }

        assert_eq!(tracker.snapshot_for(Namespace::MarketPrice).hits, 1000);
    }
}
