//! Database connection manager backed by a pooled SQLite handle.

use std::path::{Path, PathBuf};

use kisanmandi_domain::{CacheSettings, KisanMandiError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that wraps an r2d2 SQLite pool.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    /// Create a new manager with the given pool size.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32, busy_timeout_ms: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        // WAL keeps readers from blocking readers; the busy timeout absorbs
        // short writer lock waits instead of surfacing SQLITE_BUSY.
        let pragmas = format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;\n\
             PRAGMA busy_timeout={busy_timeout_ms};"
        );
        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| conn.execute_batch(&pragmas));

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| KisanMandiError::Database(format!("failed to open pool: {e}")))?;

        info!(
            db_path = %path.display(),
            max_connections = pool.max_size(),
            "sqlite pool initialised"
        );

        Ok(Self { pool, path })
    }

    /// Create a manager from application settings.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        Self::new(&settings.database_path, settings.pool_size, settings.busy_timeout_ms)
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| KisanMandiError::Database(format!("pool exhausted: {e}")))
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        info!(version = SCHEMA_VERSION, "cache schema ensured");
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Perform a health check to verify database connectivity.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> KisanMandiError {
    KisanMandiError::Database(err.to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn migrations_create_schema_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("cache.db");

        let manager = DbManager::new(&db_path, 4, 5_000).expect("manager created");
        manager.run_migrations().expect("migrations run");

        let conn = manager.get_connection().expect("connection acquired");
        let version: i32 =
            conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("cache.db");

        let manager = DbManager::new(&db_path, 4, 5_000).expect("manager created");
        manager.run_migrations().expect("migrations run");
        manager.run_migrations().expect("migrations run again");

        let conn = manager.get_connection().expect("connection acquired");
        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("query succeeded");
        assert_eq!(rows, 1);
    }

    #[test]
    fn health_check_succeeds_for_valid_database() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("cache.db");

        let manager = DbManager::new(&db_path, 4, 5_000).expect("manager created");
        manager.run_migrations().expect("migrations run");

        manager.health_check().expect("health check passed");
    }

    #[test]
    fn from_settings_uses_configured_path() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let settings = CacheSettings {
            database_path: temp_dir.path().join("configured.db"),
            ..CacheSettings::default()
        };

        let manager = DbManager::from_settings(&settings).expect("manager created");
        assert_eq!(manager.path(), settings.database_path.as_path());
        manager.run_migrations().expect("migrations run");
    }
}
