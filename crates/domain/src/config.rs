//! Configuration structures for the cache engine
//!
//! Settings are built by the composition root and passed explicitly into
//! constructors; nothing in the engine reads process-global state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DB_BUSY_TIMEOUT_MS, DEFAULT_DB_POOL_SIZE, DEFAULT_MARKET_PRICE_TTL_SECS,
    DEFAULT_PREDICTION_TTL_SECS, DEFAULT_PRICE_TOLERANCE_RUPEES, DEFAULT_WEATHER_TTL_SECS,
};
use crate::errors::{KisanMandiError, Result};

/// Settings for the market-data cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Path of the SQLite cache database.
    pub database_path: PathBuf,
    /// Connection pool size for the SQLite store.
    pub pool_size: u32,
    /// Busy timeout applied to every pooled connection, in milliseconds.
    pub busy_timeout_ms: u32,
    /// Default validity window for weather entries, in seconds.
    pub weather_ttl_secs: u64,
    /// Default validity window for market price entries, in seconds.
    pub market_price_ttl_secs: u64,
    /// Default validity window for AI prediction entries, in seconds.
    pub prediction_ttl_secs: u64,
    /// Default absolute tolerance (currency units) for prediction lookups.
    pub price_tolerance: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("kisanmandi_cache.db"),
            pool_size: DEFAULT_DB_POOL_SIZE,
            busy_timeout_ms: DEFAULT_DB_BUSY_TIMEOUT_MS,
            weather_ttl_secs: DEFAULT_WEATHER_TTL_SECS,
            market_price_ttl_secs: DEFAULT_MARKET_PRICE_TTL_SECS,
            prediction_ttl_secs: DEFAULT_PREDICTION_TTL_SECS,
            price_tolerance: DEFAULT_PRICE_TOLERANCE_RUPEES,
        }
    }
}

impl CacheSettings {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(KisanMandiError::Config("pool_size must be at least 1".into()));
        }
        if !self.price_tolerance.is_finite() || self.price_tolerance < 0.0 {
            return Err(KisanMandiError::Config(
                "price_tolerance must be finite and non-negative".into(),
            ));
        }
        for (name, secs) in [
            ("weather_ttl_secs", self.weather_ttl_secs),
            ("market_price_ttl_secs", self.market_price_ttl_secs),
            ("prediction_ttl_secs", self.prediction_ttl_secs),
        ] {
            if secs == 0 {
                return Err(KisanMandiError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Default weather TTL as a [`Duration`].
    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }

    /// Default market price TTL as a [`Duration`].
    pub fn market_price_ttl(&self) -> Duration {
        Duration::from_secs(self.market_price_ttl_secs)
    }

    /// Default prediction TTL as a [`Duration`].
    pub fn prediction_ttl(&self) -> Duration {
        Duration::from_secs(self.prediction_ttl_secs)
    }
}
