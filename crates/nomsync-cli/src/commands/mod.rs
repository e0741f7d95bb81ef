//! Subcommands and the wiring they share

pub mod completions;
pub mod config;
pub mod reload;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nomsync_cache::{DatabasePool, SqliteCandidateStore};
use nomsync_core::config::Config;
use nomsync_core::ports::IProgressSink;
use nomsync_remote::{http_client, PlannerClient, ProfileClient};
use nomsync_sync::{
    resolve_endpoint_url, PlannerSession, QueueOptions, Reconciler, SessionSettings, SyncQueue,
};
use tracing::info;

/// Configuration resolved once per invocation
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: Config,
}

impl AppContext {
    /// Loads `path`, or the default location, falling back to defaults
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map_or_else(Config::default_path, Path::to_path_buf);
        let config = Config::load_or_default(&config_path);
        Self {
            config_path,
            config,
        }
    }

    /// Opens the cache database, creating it on first use
    pub async fn open_store(&self) -> Result<(DatabasePool, Arc<SqliteCandidateStore>)> {
        let db_path = &self.config.storage.database;
        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        let store = Arc::new(SqliteCandidateStore::new(pool.pool().clone()));
        Ok((pool, store))
    }

    /// Wires a session against the resolved planner endpoint
    pub async fn build_session(
        &self,
        store: Arc<SqliteCandidateStore>,
        progress: Arc<dyn IProgressSink>,
    ) -> Result<PlannerSession> {
        let endpoint = resolve_endpoint_url(store.as_ref(), &self.config).await?;
        info!(endpoint = %endpoint, "Using planner endpoint");

        let http = http_client(Duration::from_secs(self.config.remote.request_timeout_secs))?;
        let planner = Arc::new(PlannerClient::with_client(http.clone(), &endpoint)?);
        let profile = Arc::new(ProfileClient::with_client(
            http,
            &self.config.remote.profile_url,
        )?);

        let queue = SyncQueue::new(
            planner.clone(),
            progress,
            QueueOptions::from(&self.config.sync),
        );

        Ok(PlannerSession::new(
            store,
            planner,
            profile,
            Reconciler::from_config(&self.config.matching),
            queue,
            SessionSettings::from(&self.config),
        ))
    }
}

/// `"s"` when `count` is not one
pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
