//! Storage port for the cache engine.
//!
//! The namespaces talk to storage exclusively through [`CacheStore`], so the
//! engine runs unchanged over the SQLite adapter in `kisanmandi-infra` or the
//! in-memory store in [`crate::cache::memory`]. Stores hold rows; they never
//! interpret payloads and never decide expiry beyond the cutoff comparison in
//! [`CacheStore::delete_expired`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kisanmandi_core::{CacheManager, InMemoryCacheStore};
//!
//! let store = Arc::new(InMemoryCacheStore::new());
//! let cache = CacheManager::new(store);
//! assert_eq!(cache.get_weather("Pune").unwrap(), None);
//! ```

use chrono::{DateTime, Utc};
use kisanmandi_domain::{CacheEntry, Namespace, Result};

/// Port for cache row storage.
///
/// All operations are synchronous: every call is a short read or a small
/// upsert against local storage, executed as one atomic unit by the
/// implementation (a transaction, or a mutex-protected critical section).
pub trait CacheStore: Send + Sync {
    /// Fetch the single entry stored under an exact key, regardless of
    /// expiry state. `key_fields` are already normalized.
    fn fetch_exact(&self, namespace: Namespace, key_fields: &[String])
        -> Result<Option<CacheEntry>>;

    /// Fetch every entry stored under the string key, one per distinct
    /// numeric key, regardless of expiry state. Used by the tolerance
    /// namespace to scan candidates.
    fn fetch_candidates(
        &self,
        namespace: Namespace,
        key_fields: &[String],
    ) -> Result<Vec<CacheEntry>>;

    /// Insert or overwrite an entry. The storage key is
    /// `(namespace, key_fields)` when `entry.numeric_key` is `None`, and
    /// `(namespace, key_fields, numeric_key)` otherwise.
    fn upsert(&self, entry: CacheEntry) -> Result<()>;

    /// Delete one entry. Returns the number of rows removed (0 or 1).
    fn delete(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
    ) -> Result<usize>;

    /// Delete one entry only if it is still expired at `cutoff`.
    ///
    /// Used for lazy deletion during reads: the condition is evaluated
    /// inside the store's critical section, so a concurrent fresh upsert of
    /// the same key can never be clobbered by a stale expiry decision.
    fn delete_if_expired(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
        cutoff: DateTime<Utc>,
    ) -> Result<usize>;

    /// Delete every entry in the namespace with `expires_at <= cutoff`.
    /// Returns the number of rows removed.
    fn delete_expired(&self, namespace: Namespace, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Delete every entry in the namespace. Returns the number removed.
    fn clear_namespace(&self, namespace: Namespace) -> Result<usize>;

    /// Number of entries currently stored in the namespace, including ones
    /// that are expired but not yet swept.
    fn count(&self, namespace: Namespace) -> Result<usize>;
}
