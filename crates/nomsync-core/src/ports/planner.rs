//! Remote planner ports (driven/secondary ports)
//!
//! Three narrow traits cover the remote collaborators. A single HTTP
//! client usually implements both [`IPlannerFeed`] and [`ISyncEndpoint`]
//! because the planner serves reads and writes on the same URL, while the
//! profile API lives elsewhere.

use crate::domain::{ChangeEvent, PlannerRecord};

/// Port trait for reading the full planner listing
#[async_trait::async_trait]
pub trait IPlannerFeed: Send + Sync {
    /// Fetches every row currently in the planner
    ///
    /// Rows are returned undecoded beyond their basic shape; filtering by
    /// status and validation happen in the core.
    async fn fetch_planner(&self) -> anyhow::Result<Vec<PlannerRecord>>;
}

/// Port trait for applying one change to the planner
///
/// ## Implementation Notes
///
/// - Any transport failure or non-success response must be returned as an
///   error; the caller decides whether to retry.
/// - The response body carries nothing the core needs.
#[async_trait::async_trait]
pub trait ISyncEndpoint: Send + Sync {
    async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

/// Port trait for resolving the uploader's display name
#[async_trait::async_trait]
pub trait IProfileResolver: Send + Sync {
    async fn resolve_nickname(&self) -> anyhow::Result<String>;
}
