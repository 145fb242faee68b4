//! SQLite-backed cache store.
//!
//! Implements the [`CacheStore`] port over the three namespace tables. Every
//! operation is a single SQL statement, so SQLite's implicit transaction
//! gives each read and each upsert the atomicity the engine's concurrency
//! model requires. Timestamps are stored as fixed-width RFC 3339 UTC text,
//! which makes lexicographic comparison in SQL chronological.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use kisanmandi_core::CacheStore;
use kisanmandi_domain::{CacheEntry, CacheSettings, KisanMandiError, Namespace, Result};
use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed implementation of [`CacheStore`].
pub struct SqliteCacheStore {
    db: Arc<DbManager>,
}

impl SqliteCacheStore {
    /// Create a store over an existing database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Open a store from application settings, ensuring the schema exists.
    pub fn open(settings: &CacheSettings) -> Result<Self> {
        let db = DbManager::from_settings(settings)?;
        db.run_migrations()?;
        Ok(Self::new(Arc::new(db)))
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_window(cached_raw: &str, expires_raw: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let parse = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| KisanMandiError::Serialization(format!("bad timestamp {raw:?}: {e}")))
    };
    Ok((parse(cached_raw)?, parse(expires_raw)?))
}

fn expect_arity(namespace: Namespace, key_fields: &[String]) -> Result<()> {
    if key_fields.len() == namespace.key_arity() {
        Ok(())
    } else {
        Err(KisanMandiError::InvalidInput(format!(
            "{namespace} keys have {} field(s), got {}",
            namespace.key_arity(),
            key_fields.len()
        )))
    }
}

type RawRow = (Vec<u8>, String, String);

impl CacheStore for SqliteCacheStore {
    fn fetch_exact(
        &self,
        namespace: Namespace,
        key_fields: &[String],
    ) -> Result<Option<CacheEntry>> {
        expect_arity(namespace, key_fields)?;
        let conn = self.db.get_connection()?;

        let row: Option<RawRow> = match namespace {
            Namespace::Weather => conn
                .query_row(
                    "SELECT payload, cached_at, expires_at FROM weather_cache WHERE location = ?1",
                    params![key_fields[0]],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(map_sql_error)?,
            Namespace::MarketPrice => conn
                .query_row(
                    "SELECT payload, cached_at, expires_at FROM market_price_cache
                     WHERE crop = ?1 AND location = ?2",
                    params![key_fields[0], key_fields[1]],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(map_sql_error)?,
            // Prediction rows are always keyed by a reference price.
            Namespace::Prediction => None,
        };

        let Some((payload, cached_raw, expires_raw)) = row else {
            return Ok(None);
        };
        match decode_window(&cached_raw, &expires_raw) {
            Ok((cached_at, expires_at)) => Ok(Some(CacheEntry {
                namespace,
                key_fields: key_fields.to_vec(),
                numeric_key: None,
                payload,
                cached_at,
                expires_at,
            })),
            Err(err) => {
                // Undecodable rows are treated as if they did not exist.
                // Release the connection before deleting so a pool of one
                // cannot deadlock against itself.
                warn!(namespace = %namespace, error = %err, "dropping undecodable cache row");
                drop(conn);
                self.delete(namespace, key_fields, None)?;
                Ok(None)
            }
        }
    }

    fn fetch_candidates(
        &self,
        namespace: Namespace,
        key_fields: &[String],
    ) -> Result<Vec<CacheEntry>> {
        match namespace {
            Namespace::Weather | Namespace::MarketPrice => {
                Ok(self.fetch_exact(namespace, key_fields)?.into_iter().collect())
            }
            Namespace::Prediction => {
                expect_arity(namespace, key_fields)?;
                let conn = self.db.get_connection()?;

                let mut stmt = conn
                    .prepare(
                        "SELECT ref_price, payload, cached_at, expires_at FROM prediction_cache
                         WHERE crop = ?1 AND location = ?2",
                    )
                    .map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![key_fields[0], key_fields[1]], |row| {
                        Ok((
                            row.get::<_, f64>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })
                    .map_err(map_sql_error)?;

                let mut entries = Vec::new();
                let mut undecodable = Vec::new();
                for row in rows {
                    let (ref_price, payload, cached_raw, expires_raw) =
                        row.map_err(map_sql_error)?;
                    match decode_window(&cached_raw, &expires_raw) {
                        Ok((cached_at, expires_at)) => entries.push(CacheEntry {
                            namespace,
                            key_fields: key_fields.to_vec(),
                            numeric_key: Some(ref_price),
                            payload,
                            cached_at,
                            expires_at,
                        }),
                        Err(err) => {
                            warn!(
                                namespace = %namespace,
                                ref_price,
                                error = %err,
                                "dropping undecodable cache row"
                            );
                            undecodable.push(ref_price);
                        }
                    }
                }
                drop(stmt);
                drop(conn);
                for ref_price in undecodable {
                    self.delete(namespace, key_fields, Some(ref_price))?;
                }
                Ok(entries)
            }
        }
    }

    fn upsert(&self, entry: CacheEntry) -> Result<()> {
        expect_arity(entry.namespace, &entry.key_fields)?;
        let conn = self.db.get_connection()?;
        let cached_at = fmt_ts(entry.cached_at);
        let expires_at = fmt_ts(entry.expires_at);

        match entry.namespace {
            Namespace::Weather => {
                if entry.numeric_key.is_some() {
                    return Err(KisanMandiError::InvalidInput(
                        "weather entries do not carry a numeric key".into(),
                    ));
                }
                conn.execute(
                    "INSERT INTO weather_cache (location, payload, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(location) DO UPDATE SET
                        payload = excluded.payload,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![entry.key_fields[0], entry.payload, cached_at, expires_at],
                )
            }
            Namespace::MarketPrice => {
                if entry.numeric_key.is_some() {
                    return Err(KisanMandiError::InvalidInput(
                        "market price entries do not carry a numeric key".into(),
                    ));
                }
                conn.execute(
                    "INSERT INTO market_price_cache (crop, location, payload, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(crop, location) DO UPDATE SET
                        payload = excluded.payload,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![
                        entry.key_fields[0],
                        entry.key_fields[1],
                        entry.payload,
                        cached_at,
                        expires_at
                    ],
                )
            }
            Namespace::Prediction => {
                let Some(ref_price) = entry.numeric_key else {
                    return Err(KisanMandiError::InvalidInput(
                        "prediction entries require a numeric key".into(),
                    ));
                };
                conn.execute(
                    "INSERT INTO prediction_cache
                        (crop, location, ref_price, payload, cached_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(crop, location, ref_price) DO UPDATE SET
                        payload = excluded.payload,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![
                        entry.key_fields[0],
                        entry.key_fields[1],
                        ref_price,
                        entry.payload,
                        cached_at,
                        expires_at
                    ],
                )
            }
        }
        .map_err(map_sql_error)?;
        Ok(())
    }

    fn delete(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
    ) -> Result<usize> {
        expect_arity(namespace, key_fields)?;
        let conn = self.db.get_connection()?;

        let removed = match namespace {
            Namespace::Weather => conn
                .execute("DELETE FROM weather_cache WHERE location = ?1", params![key_fields[0]])
                .map_err(map_sql_error)?,
            Namespace::MarketPrice => conn
                .execute(
                    "DELETE FROM market_price_cache WHERE crop = ?1 AND location = ?2",
                    params![key_fields[0], key_fields[1]],
                )
                .map_err(map_sql_error)?,
            Namespace::Prediction => match numeric_key {
                Some(ref_price) => conn
                    .execute(
                        "DELETE FROM prediction_cache
                         WHERE crop = ?1 AND location = ?2 AND ref_price = ?3",
                        params![key_fields[0], key_fields[1], ref_price],
                    )
                    .map_err(map_sql_error)?,
                // Prediction rows are always keyed by a reference price.
                None => 0,
            },
        };
        Ok(removed)
    }

    fn delete_if_expired(
        &self,
        namespace: Namespace,
        key_fields: &[String],
        numeric_key: Option<f64>,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        expect_arity(namespace, key_fields)?;
        let conn = self.db.get_connection()?;
        let cutoff = fmt_ts(cutoff);

        let removed = match namespace {
            Namespace::Weather => conn
                .execute(
                    "DELETE FROM weather_cache WHERE location = ?1 AND expires_at <= ?2",
                    params![key_fields[0], cutoff],
                )
                .map_err(map_sql_error)?,
            Namespace::MarketPrice => conn
                .execute(
                    "DELETE FROM market_price_cache
                     WHERE crop = ?1 AND location = ?2 AND expires_at <= ?3",
                    params![key_fields[0], key_fields[1], cutoff],
                )
                .map_err(map_sql_error)?,
            Namespace::Prediction => match numeric_key {
                Some(ref_price) => conn
                    .execute(
                        "DELETE FROM prediction_cache
                         WHERE crop = ?1 AND location = ?2 AND ref_price = ?3
                           AND expires_at <= ?4",
                        params![key_fields[0], key_fields[1], ref_price, cutoff],
                    )
                    .map_err(map_sql_error)?,
                None => 0,
            },
        };
        Ok(removed)
    }

    fn delete_expired(&self, namespace: Namespace, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.get_connection()?;
        let sql = match namespace {
            Namespace::Weather => "DELETE FROM weather_cache WHERE expires_at <= ?1",
            Namespace::MarketPrice => "DELETE FROM market_price_cache WHERE expires_at <= ?1",
            Namespace::Prediction => "DELETE FROM prediction_cache WHERE expires_at <= ?1",
        };
        conn.execute(sql, params![fmt_ts(cutoff)]).map_err(map_sql_error)
    }

    fn clear_namespace(&self, namespace: Namespace) -> Result<usize> {
        let conn = self.db.get_connection()?;
        let sql = match namespace {
            Namespace::Weather => "DELETE FROM weather_cache",
            Namespace::MarketPrice => "DELETE FROM market_price_cache",
            Namespace::Prediction => "DELETE FROM prediction_cache",
        };
        conn.execute(sql, []).map_err(map_sql_error)
    }

    fn count(&self, namespace: Namespace) -> Result<usize> {
        let conn = self.db.get_connection()?;
        let sql = match namespace {
            Namespace::Weather => "SELECT COUNT(*) FROM weather_cache",
            Namespace::MarketPrice => "SELECT COUNT(*) FROM market_price_cache",
            Namespace::Prediction => "SELECT COUNT(*) FROM prediction_cache",
        };
        let count: i64 = conn.query_row(sql, [], |row| row.get(0)).map_err(map_sql_error)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (SqliteCacheStore, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("cache.db");

        let mgr = Arc::new(DbManager::new(&db_path, 4, 5_000).expect("db manager created"));
        mgr.run_migrations().expect("migrations run");

        (SqliteCacheStore::new(Arc::clone(&mgr)), mgr, temp_dir)
    }

    fn entry(namespace: Namespace, key_fields: &[&str], numeric_key: Option<f64>) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            namespace,
            key_fields: key_fields.iter().map(|s| s.to_string()).collect(),
            numeric_key,
            payload: b"payload".to_vec(),
            cached_at: now,
            expires_at: now + TimeDelta::hours(1),
        }
    }

    #[test]
    fn test_upsert_round_trips_through_sql() {
        let (store, _mgr, _dir) = setup();
        store.upsert(entry(Namespace::Weather, &["pune"], None)).expect("upsert succeeds");

        let fetched = store
            .fetch_exact(Namespace::Weather, &["pune".to_string()])
            .expect("fetch succeeds")
            .expect("entry present");
        assert_eq!(fetched.payload, b"payload");
        assert!(fetched.expires_at > fetched.cached_at);
    }

    #[test]
    fn test_upsert_overwrites_on_unique_key() {
        let (store, _mgr, _dir) = setup();
        let mut first = entry(Namespace::MarketPrice, &["wheat", "pune"], None);
        first.payload = b"a".to_vec();
        let mut second = entry(Namespace::MarketPrice, &["wheat", "pune"], None);
        second.payload = b"b".to_vec();

        store.upsert(first).expect("upsert succeeds");
        store.upsert(second).expect("upsert succeeds");

        assert_eq!(store.count(Namespace::MarketPrice).expect("count succeeds"), 1);
        let fetched = store
            .fetch_exact(Namespace::MarketPrice, &["wheat".to_string(), "pune".to_string()])
            .expect("fetch succeeds")
            .expect("entry present");
        assert_eq!(fetched.payload, b"b");
    }

    #[test]
    fn test_prediction_candidates_keep_distinct_ref_prices() {
        let (store, _mgr, _dir) = setup();
        for price in [2400.0, 2500.0] {
            store
                .upsert(entry(Namespace::Prediction, &["wheat", "pune"], Some(price)))
                .expect("upsert succeeds");
        }
        store
            .upsert(entry(Namespace::Prediction, &["wheat", "pune"], Some(2500.0)))
            .expect("same ref price overwrites");

        let key = vec!["wheat".to_string(), "pune".to_string()];
        let candidates =
            store.fetch_candidates(Namespace::Prediction, &key).expect("fetch succeeds");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_upsert_rejects_mismatched_numeric_key() {
        let (store, _mgr, _dir) = setup();

        let err = store
            .upsert(entry(Namespace::Weather, &["pune"], Some(1.0)))
            .expect_err("weather has no numeric key");
        assert!(matches!(err, KisanMandiError::InvalidInput(_)));

        let err = store
            .upsert(entry(Namespace::Prediction, &["wheat", "pune"], None))
            .expect_err("prediction requires a numeric key");
        assert!(matches!(err, KisanMandiError::InvalidInput(_)));
    }

    #[test]
    fn test_delete_if_expired_spares_live_entry() {
        let (store, _mgr, _dir) = setup();
        let live = entry(Namespace::Weather, &["pune"], None);
        let cutoff_before_expiry = live.cached_at;
        store.upsert(live).expect("upsert succeeds");

        let key = vec!["pune".to_string()];
        let removed = store
            .delete_if_expired(Namespace::Weather, &key, None, cutoff_before_expiry)
            .expect("conditional delete succeeds");
        assert_eq!(removed, 0);
        assert_eq!(store.count(Namespace::Weather).expect("count succeeds"), 1);
    }

    #[test]
    fn test_undecodable_row_is_dropped_and_reported_absent() {
        let (store, mgr, _dir) = setup();

        let conn = mgr.get_connection().expect("connection acquired");
        conn.execute(
            "INSERT INTO weather_cache (location, payload, cached_at, expires_at)
             VALUES ('pune', X'7B7D', 'not-a-timestamp', 'also-not')",
            [],
        )
        .expect("raw insert succeeds");
        drop(conn);

        let fetched =
            store.fetch_exact(Namespace::Weather, &["pune".to_string()]).expect("fetch succeeds");
        assert!(fetched.is_none());
        assert_eq!(store.count(Namespace::Weather).expect("count succeeds"), 0);
    }

    #[test]
    fn test_arity_is_enforced() {
        let (store, _mgr, _dir) = setup();
        let err = store
            .fetch_exact(Namespace::MarketPrice, &["wheat".to_string()])
            .expect_err("one field for a two-field namespace");
        assert!(matches!(err, KisanMandiError::InvalidInput(_)));
    }
}
