//! SQLite pool behind the key-value cache
//!
//! The cache is one small table written by a single session at a time.
//! The daemon and the CLI may still have the same file open together
//! (`nomsync status` while `nomsyncd` runs), so file databases use WAL and a
//! busy timeout rather than failing on a locked file.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

const SCHEMA: &str = include_str!("migrations/20260203_initial.sql");

/// Writers are serialized by the session; one spare connection serves reads
const FILE_CONNECTIONS: u32 = 2;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the connection pool of the `kv_store` database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the cache database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = Self::open(options, FILE_CONNECTIONS).await?;
        tracing::info!(path = %db_path.display(), "Opened candidate cache");
        Ok(pool)
    }

    /// A private database that lives as long as the pool
    ///
    /// Every SQLite memory connection is its own database, hence the single
    /// connection.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Self::open(options, 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Creates `kv_store` if it is missing; safe to run on every open
    async fn ensure_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(e.to_string()))?;
        tracing::debug!("Cache schema ready");
        Ok(())
    }
}
