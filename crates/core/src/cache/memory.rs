//! In-memory cache store
//!
//! Reference [`CacheStore`] implementation over a mutex-protected map. Used
//! by the engine's own tests and by deployments that want caching without a
//! database file. Every operation runs inside one critical section, matching
//! the atomicity the SQLite adapter gets from transactions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kisanmandi_domain::{CacheEntry, Namespace, Result};
use parking_lot::Mutex;

use crate::cache_ports::CacheStore;

/// Map key: namespace, normalized string fields, and the numeric key's bit
/// pattern (f64 is not hashable; bit equality mirrors SQLite's REAL
/// uniqueness).
type StoreKey = (Namespace, Vec<String>, Option<u64>);

/// Thread-safe in-memory implementation of [`CacheStore`].
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<StoreKey, CacheEntry>>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(entry: &CacheEntry) -> StoreKey {
        (entry.namespace, entry.key_fields.clone(), entry.numeric_key.map(f64::to_bits))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn fetch_exact(
        &self,
        namespace: Namespace,
        key_fields: &[String],
    ) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock();
        Ok(entries.get(&(namespace, key_fields.to_vec(), None)).cloned())
    }

    fn fetch_candidates(
        &self,
        namespace: Namespace,
        key_fields: &[String],
    ) -> Result<Vec<CacheEntry>> {
        let entries = self.entries.lock();
        Ok(entries
            .values()
            .filter(|entry| entry.namespace == namespace && entry.key_fields == key_fields)
            .cloned()
            .collect())
    }

    fn upsert(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(Self::key_of(&entry), entry);
        Ok(())
    }

    fn delete(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
    ) -> Result<usize> {
        let mut entries = self.entries.lock();
        let key = (namespace, key_fields.to_vec(), numeric_key.map(f64::to_bits));
        Ok(usize::from(entries.remove(&key).is_some()))
    }

    fn delete_if_expired(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let mut entries = self.entries.lock();
        let key = (namespace, key_fields.to_vec(), numeric_key.map(f64::to_bits));
        let expired = entries.get(&key).is_some_and(|entry| entry.expires_at <= cutoff);
        if expired {
            entries.remove(&key);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn delete_expired(&self, namespace: Namespace, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.namespace != namespace || entry.expires_at > cutoff);
        Ok(before - entries.len())
    }

    fn clear_namespace(&self, namespace: Namespace) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.namespace != namespace);
        Ok(before - entries.len())
    }

    fn count(&self, namespace: Namespace) -> Result<usize> {
        let entries = self.entries.lock();
        Ok(entries.values().filter(|entry| entry.namespace == namespace).count())
    }
}
