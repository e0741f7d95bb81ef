//! Candidate store port (driven/secondary port)
//!
//! This module defines the interface of the persistent key-value store
//! that holds the candidate cache between sessions.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, filesystem, etc.) and don't need domain-level classification.
//! - Each logical entry is read and written independently; the core never
//!   needs a multi-entry transaction.
//! - `snapshot` is a convenience over the two cache entries so the
//!   staleness check sees a consistent pair.

use chrono::{DateTime, Utc};

use crate::domain::{CacheSnapshot, CandidateSet};

/// Port trait for the local candidate cache
///
/// Logical entries:
/// - `candidates`: the serialized [`CandidateSet`]
/// - `last_update`: when the set was last rebuilt from the remote planner
/// - `endpoint_url`: the planner endpoint entered by the user
/// - `nickname`: the last resolved display name
#[async_trait::async_trait]
pub trait ICandidateStore: Send + Sync {
    /// Loads the cached candidate set, `None` when never saved
    async fn load_candidates(&self) -> anyhow::Result<Option<CandidateSet>>;

    /// Replaces the cached candidate set
    async fn save_candidates(&self, candidates: &CandidateSet) -> anyhow::Result<()>;

    /// When the cache was last rebuilt from the planner
    async fn last_update(&self) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Records a rebuild time
    async fn set_last_update(&self, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// The configured planner endpoint, if any
    async fn endpoint_url(&self) -> anyhow::Result<Option<String>>;

    /// Stores a new planner endpoint
    async fn set_endpoint_url(&self, url: &str) -> anyhow::Result<()>;

    /// Display name cached by a previous session
    async fn cached_nickname(&self) -> anyhow::Result<Option<String>>;

    /// Caches a resolved display name
    async fn set_cached_nickname(&self, nickname: &str) -> anyhow::Result<()>;

    /// Drops the candidate set and its timestamp, forcing the next load to
    /// rebuild from the planner. The endpoint URL is kept.
    async fn clear(&self) -> anyhow::Result<()>;

    /// Reads both cache entries for a staleness decision
    async fn snapshot(&self) -> anyhow::Result<CacheSnapshot> {
        Ok(CacheSnapshot {
            candidates: self.load_candidates().await?,
            last_update: self.last_update().await?,
        })
    }
}
