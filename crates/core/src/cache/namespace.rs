//! Namespace lookup and storage
//!
//! A namespace is one independent keyspace of cached data. Exact namespaces
//! (weather, market prices) match on normalized string keys alone; the
//! tolerance namespace (predictions) additionally matches a numeric
//! reference price within a caller-supplied tolerance, because quoted
//! reference prices drift slightly call to call and an exact match would
//! defeat caching almost entirely.

use std::sync::Arc;
use std::time::Duration;

use kisanmandi_domain::{CacheEntry, KisanMandiError, Namespace, Result};

use crate::cache::expiration::ExpirationPolicy;
use crate::cache::stats::StatisticsTracker;
use crate::cache_ports::CacheStore;
use crate::time::{Clock, SystemClock};

/// Normalize key fields for case-insensitive matching: trim and lowercase.
///
/// Empty input (no fields, or a field that is blank after trimming) is a
/// caller error, never silently coerced.
fn normalize_fields(fields: &[&str]) -> Result<Vec<String>> {
    if fields.is_empty() {
        return Err(KisanMandiError::InvalidInput("key fields must not be empty".into()));
    }
    fields
        .iter()
        .map(|field| {
            let normalized = field.trim().to_lowercase();
            if normalized.is_empty() {
                Err(KisanMandiError::InvalidInput("key field must not be blank".into()))
            } else {
                Ok(normalized)
            }
        })
        .collect()
}

fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(KisanMandiError::InvalidInput("ttl must be positive".into()));
    }
    Ok(())
}

/// Exact, case-insensitive multi-field key lookup.
pub struct ExactNamespace<C: Clock + Clone = SystemClock> {
    namespace: Namespace,
    store: Arc<dyn CacheStore>,
    stats: StatisticsTracker,
    clock: C,
}

impl<C: Clock + Clone> ExactNamespace<C> {
    /// Create a namespace over the given store and statistics tracker.
    pub fn new(
        namespace: Namespace,
        store: Arc<dyn CacheStore>,
        stats: StatisticsTracker,
        clock: C,
    ) -> Self {
        Self { namespace, store, stats, clock }
    }

    /// Look up the payload stored under `key_fields`.
    ///
    /// An entry found expired is deleted as a side effect and reported as a
    /// miss. Hits and misses are recorded on the shared tracker within the
    /// same operation.
    pub fn get(&self, key_fields: &[&str]) -> Result<Option<Vec<u8>>> {
        let key = normalize_fields(key_fields)?;
        let now = self.clock.now();

        match self.store.fetch_exact(self.namespace, &key)? {
            Some(entry) if ExpirationPolicy::is_expired(&entry, now) => {
                self.store.delete_if_expired(self.namespace, &key, None, now)?;
                self.stats.record_miss(self.namespace, now);
                Ok(None)
            }
            Some(entry) => {
                self.stats.record_hit(self.namespace, now);
                Ok(Some(entry.payload))
            }
            None => {
                self.stats.record_miss(self.namespace, now);
                Ok(None)
            }
        }
    }

    /// Upsert `payload` under `key_fields` with a fresh validity window.
    pub fn set(&self, key_fields: &[&str], payload: Vec<u8>, ttl: Duration) -> Result<()> {
        let key = normalize_fields(key_fields)?;
        validate_ttl(ttl)?;
        let now = self.clock.now();

        self.store.upsert(CacheEntry {
            namespace: self.namespace,
            key_fields: key,
            numeric_key: None,
            payload,
            cached_at: now,
            expires_at: ExpirationPolicy::expiry(now, ttl),
        })
    }

    /// Delete one entry (keys given) or every entry in the namespace
    /// (`None`). Returns the number of entries removed.
    pub fn clear(&self, key_fields: Option<&[&str]>) -> Result<usize> {
        match key_fields {
            Some(fields) => {
                let key = normalize_fields(fields)?;
                self.store.delete(self.namespace, &key, None)
            }
            None => self.store.clear_namespace(self.namespace),
        }
    }
}

/// Lookup by exact string fields plus an approximate numeric match.
pub struct ToleranceNamespace<C: Clock + Clone = SystemClock> {
    namespace: Namespace,
    store: Arc<dyn CacheStore>,
    stats: StatisticsTracker,
    clock: C,
}

impl<C: Clock + Clone> ToleranceNamespace<C> {
    /// Create a namespace over the given store and statistics tracker.
    pub fn new(
        namespace: Namespace,
        store: Arc<dyn CacheStore>,
        stats: StatisticsTracker,
        clock: C,
    ) -> Self {
        Self { namespace, store, stats, clock }
    }

    /// Look up the best entry for `key_fields` near `ref_value`.
    ///
    /// Among unexpired candidates matching `key_fields`, selects the one
    /// minimizing `|numeric_key - ref_value|` subject to the difference
    /// being within `tolerance`; ties prefer the most recently cached
    /// entry. Expired candidates encountered during the scan are deleted.
    pub fn get(&self, key_fields: &[&str], ref_value: f64, tolerance: f64) -> Result<Option<Vec<u8>>> {
        if !ref_value.is_finite() {
            return Err(KisanMandiError::InvalidInput("reference value must be finite".into()));
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(KisanMandiError::InvalidInput(
                "tolerance must be finite and non-negative".into(),
            ));
        }
        let key = normalize_fields(key_fields)?;
        let now = self.clock.now();

        let mut best: Option<(f64, CacheEntry)> = None;
        for entry in self.store.fetch_candidates(self.namespace, &key)? {
            if ExpirationPolicy::is_expired(&entry, now) {
                self.store.delete_if_expired(self.namespace, &key, entry.numeric_key, now)?;
                continue;
            }
            let Some(numeric_key) = entry.numeric_key else { continue };
            let diff = (numeric_key - ref_value).abs();
            if diff > tolerance {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_diff, best_entry)) => {
                    diff < *best_diff
                        || (diff == *best_diff && entry.cached_at > best_entry.cached_at)
                }
            };
            if better {
                best = Some((diff, entry));
            }
        }

        match best {
            Some((_, entry)) => {
                self.stats.record_hit(self.namespace, now);
                Ok(Some(entry.payload))
            }
            None => {
                self.stats.record_miss(self.namespace, now);
                Ok(None)
            }
        }
    }

    /// Upsert `payload` keyed by `(key_fields, ref_value)` exactly.
    ///
    /// The same `ref_value` overwrites; a different `ref_value` creates an
    /// additional entry rather than replacing a previous tolerance match.
    pub fn set(
        &self,
        key_fields: &[&str],
        ref_value: f64,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> Result<()> {
        if !ref_value.is_finite() {
            return Err(KisanMandiError::InvalidInput("reference value must be finite".into()));
        }
        let key = normalize_fields(key_fields)?;
        validate_ttl(ttl)?;
        let now = self.clock.now();

        self.store.upsert(CacheEntry {
            namespace: self.namespace,
            key_fields: key,
            numeric_key: Some(ref_value),
            payload,
            cached_at: now,
            expires_at: ExpirationPolicy::expiry(now, ttl),
        })
    }

    /// Delete one entry (keys and reference value given) or every entry in
    /// the namespace (`None`). Returns the number of entries removed.
    pub fn clear(&self, key: Option<(&[&str], f64)>) -> Result<usize> {
        match key {
            Some((fields, ref_value)) => {
                let key = normalize_fields(fields)?;
                self.store.delete(self.namespace, &key, Some(ref_value))
            }
            None => self.store.clear_namespace(self.namespace),
        }
    }
}
