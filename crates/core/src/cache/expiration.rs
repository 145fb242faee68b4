//! TTL expiry policy
//!
//! Expiry is decided in one place so the lazy deletion performed by reads
//! and the bulk sweep agree exactly at the boundary instant: an entry is
//! expired once `now >= expires_at`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kisanmandi_domain::{CacheEntry, Namespace, Result};

use crate::cache_ports::CacheStore;

/// Expiry computation and on-demand sweeping.
pub struct ExpirationPolicy;

impl ExpirationPolicy {
    /// Compute the expiry timestamp for an entry cached at `now`.
    ///
    /// Saturates at the maximum representable timestamp for absurdly large
    /// TTLs rather than wrapping.
    pub fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether `entry` is stale at `now`.
    pub fn is_expired(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now >= entry.expires_at
    }

    /// Delete every expired entry in every namespace.
    ///
    /// Returns per-namespace deletion counts. Idempotent: a second call
    /// immediately after reports all zeros.
    pub fn sweep(store: &dyn CacheStore, now: DateTime<Utc>) -> Result<BTreeMap<Namespace, usize>> {
        let mut removed = BTreeMap::new();
        for namespace in Namespace::ALL {
            removed.insert(namespace, store.delete_expired(namespace, now)?);
        }
        Ok(removed)
    }
}
