//! SQLite implementation of ICandidateStore
//!
//! Every logical entry is one row of the `kv_store` table. Values are
//! stored as text:
//!
//! | Key            | Value                                   |
//! |----------------|-----------------------------------------|
//! | `candidates`   | JSON object, id → candidate record      |
//! | `last_update`  | epoch milliseconds                      |
//! | `endpoint_url` | URL string                              |
//! | `nickname`     | display name                            |

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use nomsync_core::domain::CandidateSet;
use nomsync_core::ports::ICandidateStore;

use crate::CacheError;

const KEY_CANDIDATES: &str = "candidates";
const KEY_LAST_UPDATE: &str = "last_update";
const KEY_ENDPOINT_URL: &str = "endpoint_url";
const KEY_NICKNAME: &str = "nickname";

/// SQLite-backed candidate cache
pub struct SqliteCandidateStore {
    pool: SqlitePool,
}

impl SqliteCandidateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(key, bytes = value.len(), "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    let millis: i64 = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| CacheError::SerializationError {
            key: KEY_LAST_UPDATE.to_string(),
            message: e.to_string(),
        })?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| CacheError::SerializationError {
            key: KEY_LAST_UPDATE.to_string(),
            message: format!("timestamp out of range: {millis}"),
        })
}

// ============================================================================
// ICandidateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ICandidateStore for SqliteCandidateStore {
    async fn load_candidates(&self) -> anyhow::Result<Option<CandidateSet>> {
        let Some(raw) = self.get(KEY_CANDIDATES).await? else {
            return Ok(None);
        };

        let set: CandidateSet =
            serde_json::from_str(&raw).map_err(|e| CacheError::SerializationError {
                key: KEY_CANDIDATES.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(count = set.len(), "Loaded cached candidates");
        Ok(Some(set))
    }

    async fn save_candidates(&self, candidates: &CandidateSet) -> anyhow::Result<()> {
        let raw = serde_json::to_string(candidates).map_err(|e| CacheError::SerializationError {
            key: KEY_CANDIDATES.to_string(),
            message: e.to_string(),
        })?;
        self.put(KEY_CANDIDATES, &raw).await?;

        tracing::debug!(count = candidates.len(), "Saved candidates");
        Ok(())
    }

    async fn last_update(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        match self.get(KEY_LAST_UPDATE).await? {
            Some(raw) => Ok(Some(decode_timestamp(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_last_update(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.put(KEY_LAST_UPDATE, &at.timestamp_millis().to_string())
            .await?;
        Ok(())
    }

    async fn endpoint_url(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .get(KEY_ENDPOINT_URL)
            .await?
            .filter(|url| !url.trim().is_empty()))
    }

    async fn set_endpoint_url(&self, url: &str) -> anyhow::Result<()> {
        self.put(KEY_ENDPOINT_URL, url.trim()).await?;
        tracing::info!(url = url.trim(), "Planner endpoint updated");
        Ok(())
    }

    async fn cached_nickname(&self) -> anyhow::Result<Option<String>> {
        Ok(self.get(KEY_NICKNAME).await?)
    }

    async fn set_cached_nickname(&self, nickname: &str) -> anyhow::Result<()> {
        self.put(KEY_NICKNAME, nickname).await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.delete(KEY_CANDIDATES).await?;
        self.delete(KEY_LAST_UPDATE).await?;
        tracing::info!("Candidate cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_timestamp() {
        let at = decode_timestamp("1700000000000").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);

        assert!(matches!(
            decode_timestamp("yesterday"),
            Err(CacheError::SerializationError { .. })
        ));
    }
}
