//! nomsync Cache - Local candidate cache persistence
//!
//! SQLite-based key-value store for:
//! - The candidate set mirrored from the remote planner
//! - The time of the last full reload
//! - The planner endpoint URL
//! - The resolved uploader nickname
//!
//! ## Architecture
//!
//! This crate implements the `ICandidateStore` port from `nomsync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteCandidateStore`] - Full `ICandidateStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use nomsync_cache::{DatabasePool, SqliteCandidateStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/nomsync/nomsync.db")).await?;
//! let store = SqliteCandidateStore::new(pool.pool().clone());
//! // Use store as ICandidateStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteCandidateStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be encoded or decoded
    #[error("Serialization error for '{key}': {message}")]
    SerializationError { key: String, message: String },
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
