//! Market-data cache engine
//!
//! Sits in front of the dashboard's three expensive external lookups -
//! weather, mandi prices, and AI price predictions - and avoids repeated
//! calls within a validity window.
//!
//! # Components
//!
//! - [`namespace`] - exact and tolerance-matched key lookup per data domain
//! - [`expiration`] - TTL expiry computation, lazy deletion, bulk sweep
//! - [`stats`] - per-namespace hit/miss telemetry
//! - [`manager`] - the [`CacheManager`](manager::CacheManager) façade the
//!   rest of the application consumes
//! - [`memory`] - reference in-memory [`CacheStore`](crate::CacheStore)
//!   implementation
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use kisanmandi_core::{CacheManager, InMemoryCacheStore};
//!
//! let cache = CacheManager::new(Arc::new(InMemoryCacheStore::new()));
//!
//! cache
//!     .set_weather("Pune", br#"{"temp_c":31}"#.to_vec(), Duration::from_secs(6 * 3600))
//!     .unwrap();
//!
//! // Lookups are case-insensitive.
//! assert!(cache.get_weather("PUNE").unwrap().is_some());
//! ```

pub mod expiration;
pub mod manager;
pub mod memory;
pub mod namespace;
pub mod stats;
