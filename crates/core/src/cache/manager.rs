//! Cache manager façade
//!
//! Composes the namespaces, expiration policy, and statistics tracker into
//! the public API the rest of the application consumes. Constructed with an
//! explicit store handle; there are no module-level globals and no hidden
//! initialization order.
//!
//! Reads are fail-open: a storage error is logged, recorded as a miss, and
//! surfaced as `Ok(None)` so the caller falls back to a fresh external
//! fetch. Writes surface their error; the caller may log and continue,
//! because caching is best-effort and never on the critical path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kisanmandi_domain::{CacheInfo, KisanMandiError, Namespace, Result};
use tracing::{debug, warn};

use crate::cache::expiration::ExpirationPolicy;
use crate::cache::namespace::{ExactNamespace, ToleranceNamespace};
use crate::cache::stats::StatisticsTracker;
use crate::cache_ports::CacheStore;
use crate::time::{Clock, SystemClock};

/// Façade over the market-data cache.
///
/// Generic over the clock so expiry is deterministic under test; production
/// code uses the default [`SystemClock`].
pub struct CacheManager<C: Clock + Clone = SystemClock> {
    store: Arc<dyn CacheStore>,
    stats: StatisticsTracker,
    clock: C,
    weather: ExactNamespace<C>,
    market_prices: ExactNamespace<C>,
    predictions: ToleranceNamespace<C>,
}

impl CacheManager<SystemClock> {
    /// Create a manager over `store` using the system clock.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<C: Clock + Clone> CacheManager<C> {
    /// Create a manager with a custom clock (useful for testing).
    pub fn with_clock(store: Arc<dyn CacheStore>, clock: C) -> Self {
        let stats = StatisticsTracker::new();
        Self {
            weather: ExactNamespace::new(
                Namespace::Weather,
                Arc::clone(&store),
                stats.clone(),
                clock.clone(),
            ),
            market_prices: ExactNamespace::new(
                Namespace::MarketPrice,
                Arc::clone(&store),
                stats.clone(),
                clock.clone(),
            ),
            predictions: ToleranceNamespace::new(
                Namespace::Prediction,
                Arc::clone(&store),
                stats.clone(),
                clock.clone(),
            ),
            store,
            stats,
            clock,
        }
    }

    /// Look up cached weather for a location.
    pub fn get_weather(&self, location: &str) -> Result<Option<Vec<u8>>> {
        self.fail_open(Namespace::Weather, self.weather.get(&[location]))
    }

    /// Cache a weather payload for a location.
    pub fn set_weather(&self, location: &str, payload: Vec<u8>, ttl: Duration) -> Result<()> {
        self.weather.set(&[location], payload, ttl)
    }

    /// Look up a cached mandi price for a crop at a location.
    pub fn get_market_price(&self, crop: &str, location: &str) -> Result<Option<Vec<u8>>> {
        self.fail_open(Namespace::MarketPrice, self.market_prices.get(&[crop, location]))
    }

    /// Cache a mandi price payload for a crop at a location.
    pub fn set_market_price(
        &self,
        crop: &str,
        location: &str,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> Result<()> {
        self.market_prices.set(&[crop, location], payload, ttl)
    }

    /// Look up a cached AI prediction near `ref_price`.
    ///
    /// `tolerance` is the maximum acceptable absolute difference between
    /// `ref_price` and a stored entry's reference price - policy supplied by
    /// the caller, typically from
    /// [`CacheSettings`](kisanmandi_domain::CacheSettings).
    pub fn get_prediction(
        &self,
        crop: &str,
        location: &str,
        ref_price: f64,
        tolerance: f64,
    ) -> Result<Option<Vec<u8>>> {
        self.fail_open(
            Namespace::Prediction,
            self.predictions.get(&[crop, location], ref_price, tolerance),
        )
    }

    /// Cache an AI prediction payload under its exact reference price.
    pub fn set_prediction(
        &self,
        crop: &str,
        location: &str,
        ref_price: f64,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> Result<()> {
        self.predictions.set(&[crop, location], ref_price, payload, ttl)
    }

    /// Delete every expired entry in every namespace.
    ///
    /// Returns per-namespace deletion counts.
    pub fn clear_expired(&self) -> Result<BTreeMap<Namespace, usize>> {
        let removed = ExpirationPolicy::sweep(self.store.as_ref(), self.clock.now())?;
        debug!(?removed, "swept expired cache entries");
        Ok(removed)
    }

    /// Delete every entry in one namespace. Returns the number removed.
    pub fn clear_namespace(&self, namespace: Namespace) -> Result<usize> {
        let removed = match namespace {
            Namespace::Weather => self.weather.clear(None)?,
            Namespace::MarketPrice => self.market_prices.clear(None)?,
            Namespace::Prediction => self.predictions.clear(None)?,
        };
        debug!(namespace = %namespace, removed, "cleared cache namespace");
        Ok(removed)
    }

    /// Delete every entry in every namespace and reset statistics.
    ///
    /// Returns the total number of entries removed.
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for namespace in Namespace::ALL {
            removed += self.store.clear_namespace(namespace)?;
        }
        self.stats.reset_all();
        debug!(removed, "cleared entire cache");
        Ok(removed)
    }

    /// Administrative snapshot: entry counts and lookup statistics.
    pub fn info(&self) -> Result<CacheInfo> {
        let mut counts = BTreeMap::new();
        let mut total_count = 0;
        for namespace in Namespace::ALL {
            let count = self.store.count(namespace)?;
            total_count += count;
            counts.insert(namespace, count);
        }
        Ok(CacheInfo { counts, total_count, statistics: self.stats.snapshot() })
    }

    /// Degrade a failed read to a miss. Caller errors (invalid input) are
    /// not storage failures and still propagate.
    fn fail_open(
        &self,
        namespace: Namespace,
        lookup: Result<Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        match lookup {
            Err(err @ KisanMandiError::InvalidInput(_)) => Err(err),
            Err(err) => {
                warn!(namespace = %namespace, error = %err, "cache read failed, treating as miss");
                self.stats.record_miss(namespace, self.clock.now());
                Ok(None)
            }
            ok => ok,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::manager.
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use crate::time::MockClock;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Store whose every operation fails, for fail-open tests.
    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn fetch_exact(
            &self,
            _: Namespace,
            _: &[String],
        ) -> Result<Option<kisanmandi_domain::CacheEntry>> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn fetch_candidates(
            &self,
            _: Namespace,
            _: &[String],
        ) -> Result<Vec<kisanmandi_domain::CacheEntry>> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn upsert(&self, _: kisanmandi_domain::CacheEntry) -> Result<()> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn delete(&self, _: Namespace, _: &[String], _: Option<f64>) -> Result<usize> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn delete_if_expired(
            &self,
            _: Namespace,
            _: &[String],
            _: Option<f64>,
            _: DateTime<Utc>,
        ) -> Result<usize> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn delete_expired(&self, _: Namespace, _: DateTime<Utc>) -> Result<usize> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn clear_namespace(&self, _: Namespace) -> Result<usize> {
            Err(KisanMandiError::Database("store offline".into()))
        }

        fn count(&self, _: Namespace) -> Result<usize> {
            Err(KisanMandiError::Database("store offline".into()))
        }
    }

    fn manager() -> (CacheManager<MockClock>, MockClock) {
        let clock = MockClock::starting_at(Utc::now());
        (CacheManager::with_clock(Arc::new(InMemoryCacheStore::new()), clock.clone()), clock)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (cache, _clock) = manager();
        cache.set_weather("Pune", b"cloudy".to_vec(), HOUR).expect("set succeeds");

        assert_eq!(cache.get_weather("pune").expect("get succeeds"), Some(b"cloudy".to_vec()));
    }

    #[test]
    fn test_namespaces_have_independent_keyspaces() {
        let (cache, _clock) = manager();
        cache.set_weather("pune", b"weather".to_vec(), HOUR).expect("set succeeds");
        cache.set_market_price("wheat", "pune", b"price".to_vec(), HOUR).expect("set succeeds");

        assert_eq!(cache.get_weather("pune").expect("get"), Some(b"weather".to_vec()));
        assert_eq!(
            cache.get_market_price("wheat", "pune").expect("get"),
            Some(b"price".to_vec())
        );
    }

    #[test]
    fn test_get_on_broken_store_degrades_to_miss() {
        let cache = CacheManager::new(Arc::new(BrokenStore));

        assert_eq!(cache.get_weather("pune").expect("fail-open read"), None);
        assert_eq!(cache.get_prediction("wheat", "pune", 2500.0, 100.0).expect("read"), None);

        // The degraded reads are visible in statistics as misses; info()
        // itself still errors because the admin surface is not fail-open.
        assert!(cache.info().is_err());
        assert_eq!(cache.stats.snapshot_for(Namespace::Weather).misses, 1);
        assert_eq!(cache.stats.snapshot_for(Namespace::Prediction).misses, 1);
    }

    #[test]
    fn test_set_on_broken_store_surfaces_error() {
        let cache = CacheManager::new(Arc::new(BrokenStore));
        let err = cache.set_weather("pune", b"x".to_vec(), HOUR).expect_err("set fails");
        assert!(matches!(err, KisanMandiError::Database(_)));
    }

    #[test]
    fn test_invalid_input_is_not_swallowed_by_fail_open() {
        let cache = CacheManager::new(Arc::new(BrokenStore));
        let err = cache.get_weather("   ").expect_err("blank key rejected");
        assert!(matches!(err, KisanMandiError::InvalidInput(_)));
    }

    #[test]
    fn test_clear_expired_reports_counts() {
        let (cache, clock) = manager();
        cache.set_weather("pune", b"a".to_vec(), HOUR).expect("set succeeds");
        cache.set_market_price("wheat", "pune", b"b".to_vec(), 2 * HOUR).expect("set succeeds");

        clock.advance(HOUR + Duration::from_secs(1));

        let removed = cache.clear_expired().expect("sweep succeeds");
        assert_eq!(removed[&Namespace::Weather], 1);
        assert_eq!(removed[&Namespace::MarketPrice], 0);

        let again = cache.clear_expired().expect("sweep succeeds");
        assert!(again.values().all(|&n| n == 0));
    }

    #[test]
    fn test_clear_all_resets_statistics() {
        let (cache, _clock) = manager();
        cache.set_weather("pune", b"a".to_vec(), HOUR).expect("set succeeds");
        let _ = cache.get_weather("pune").expect("get succeeds");
        let _ = cache.get_weather("nashik").expect("get succeeds");

        let removed = cache.clear_all().expect("clear succeeds");
        assert_eq!(removed, 1);

        let info = cache.info().expect("info succeeds");
        assert_eq!(info.total_count, 0);
        assert_eq!(info.statistics[&Namespace::Weather].total, 0);
    }

    #[test]
    fn test_info_reflects_hit_rate() {
        let (cache, _clock) = manager();
        cache.set_weather("pune", b"a".to_vec(), HOUR).expect("set succeeds");

        let _ = cache.get_weather("pune").expect("get succeeds"); // hit
        let _ = cache.get_weather("pune").expect("get succeeds"); // hit
        let _ = cache.get_weather("nagpur").expect("get succeeds"); // miss

        let info = cache.info().expect("info succeeds");
        let stats = &info.statistics[&Namespace::Weather];
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_pct - 100.0 * 2.0 / 3.0).abs() < 1e-9);
    }
}
