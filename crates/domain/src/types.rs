//! Common data types used throughout the cache engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::KisanMandiError;

/// Independent keyspace for one category of cached market data.
///
/// Each namespace owns its own keys, TTL policy, and statistics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Weather snapshots keyed by location
    Weather,
    /// Mandi prices keyed by (crop, location)
    MarketPrice,
    /// AI price predictions keyed by (crop, location) plus a reference price
    Prediction,
}

impl Namespace {
    /// All namespaces, in canonical order. Used by sweeps and admin views.
    pub const ALL: [Namespace; 3] =
        [Namespace::Weather, Namespace::MarketPrice, Namespace::Prediction];

    /// Canonical string form, matching the persisted table naming.
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Weather => "weather",
            Namespace::MarketPrice => "market_price",
            Namespace::Prediction => "prediction",
        }
    }

    /// Number of string key fields entries in this namespace carry.
    pub fn key_arity(self) -> usize {
        match self {
            Namespace::Weather => 1,
            Namespace::MarketPrice | Namespace::Prediction => 2,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = KisanMandiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weather" => Ok(Namespace::Weather),
            "market_price" => Ok(Namespace::MarketPrice),
            "prediction" => Ok(Namespace::Prediction),
            other => Err(KisanMandiError::InvalidInput(format!("unknown namespace: {other}"))),
        }
    }
}

/// One cached value plus its validity window.
///
/// `key_fields` are stored already normalized (trimmed, lowercased) by the
/// namespace layer. `payload` is an opaque serialized blob owned by the
/// caller; the engine never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub namespace: Namespace,
    pub key_fields: Vec<String>,
    /// Reference price associated with the entry. Present only for
    /// [`Namespace::Prediction`].
    pub numeric_key: Option<f64>,
    pub payload: Vec<u8>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-namespace lookup statistics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    /// `100 * hits / total`; `0.0` when no lookups have been recorded.
    pub hit_rate_pct: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Administrative snapshot of the whole cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Stored entry count per namespace.
    pub counts: BTreeMap<Namespace, usize>,
    /// Sum of all namespace counts.
    pub total_count: usize,
    /// Lookup statistics per namespace.
    pub statistics: BTreeMap<Namespace, NamespaceStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_round_trips_through_str() {
        for ns in Namespace::ALL {
            let parsed: Namespace = ns.as_str().parse().expect("canonical form parses");
            assert_eq!(parsed, ns);
        }
    }

    #[test]
    fn namespace_parse_is_case_insensitive() {
        assert_eq!("  Market_Price ".parse::<Namespace>().unwrap(), Namespace::MarketPrice);
    }

    #[test]
    fn namespace_parse_rejects_unknown() {
        assert!("schemes".parse::<Namespace>().is_err());
    }

    #[test]
    fn key_arity_matches_table_layout() {
        assert_eq!(Namespace::Weather.key_arity(), 1);
        assert_eq!(Namespace::MarketPrice.key_arity(), 2);
        assert_eq!(Namespace::Prediction.key_arity(), 2);
    }
}
