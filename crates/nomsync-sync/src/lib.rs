//! nomsync Sync - Reconciliation and delivery engine
//!
//! Provides:
//! - Diffing of submission batches against the cached planner candidates
//! - Duplicate-placeholder detection by cell and distance
//! - Bounded-concurrency delivery of change events with retry
//! - Inbox watching for submission batch files
//!
//! ## Modules
//!
//! - [`reconciler`] - Turns a batch into change events and cache mutations
//! - [`queue`] - FIFO delivery queue with a concurrency limit
//! - [`session`] - Ties the cache, planner, profile and queue together
//! - [`watcher`] - Filesystem watching, debouncing and one-shot waits
//! - [`scheduler`] - Turns debounced inbox events into batch file lists

pub mod queue;
pub mod reconciler;
pub mod scheduler;
pub mod session;
pub mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use queue::{QueueOptions, QueueStats, SyncQueue};
pub use reconciler::{MatchThresholds, ReconcileReport, Reconciler};
pub use scheduler::InboxScheduler;
pub use session::{
    resolve_endpoint_url, BatchOutcome, PlannerSession, ReloadSummary, SessionSettings,
};
pub use watcher::{is_batch_file, pending_batch_files, watch_once, FileWatcher, FsEvent};

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The batch could not be decoded at all
    #[error("Batch parse error: {0}")]
    BatchParse(#[from] nomsync_core::domain::DomainError),

    /// No planner endpoint is stored or configured
    #[error("Planner endpoint is not configured")]
    EndpointNotConfigured,

    /// The candidate store failed
    #[error("Cache store error: {0:#}")]
    Store(anyhow::Error),

    /// The remote planner could not be read
    #[error("Planner error: {0:#}")]
    Remote(anyhow::Error),

    /// A batch file could not be read
    #[error("Cannot read batch file {path}: {source}")]
    BatchFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
