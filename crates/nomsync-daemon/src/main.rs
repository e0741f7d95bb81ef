//! nomsync Daemon - Background inbox synchronization service
//!
//! This binary runs as a user service and handles:
//! - Watching the inbox directory for submission batch files
//! - Reconciling each settled batch against the planner
//! - Delivering change events in the background
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! Batch files that landed while the daemon was down are processed first.
//! The main loop then waits on the [`InboxScheduler`] and processes files
//! one at a time, so reconciliation passes never overlap. The loop is
//! controlled by a `CancellationToken` that is triggered on receipt of
//! SIGTERM or SIGINT.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use nomsync_cache::{DatabasePool, SqliteCandidateStore};
use nomsync_core::{config::Config, domain::ChangeEvent, ports::IProgressSink};
use nomsync_remote::{http_client, PlannerClient, ProfileClient};
use nomsync_sync::{
    pending_batch_files, resolve_endpoint_url, BatchOutcome, FileWatcher, InboxScheduler,
    PlannerSession, QueueOptions, Reconciler, SessionSettings, SyncError, SyncQueue,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the scheduler checks for settled inbox events
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Logs queue progress; the daemon has no interactive surface
struct LogProgress;

impl IProgressSink for LogProgress {
    fn report_depth(&self, remaining: usize) {
        debug!(remaining, "Delivery queue depth");
    }

    fn report_failure(&self, event: &ChangeEvent, error: &str) {
        error!(%event, error, "Planner update dropped after retries");
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service: owns the session and the inbox loop
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    session: PlannerSession,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Loads configuration, opens the database and builds the session
    async fn new(shutdown: CancellationToken) -> Result<Self> {
        let config_path = std::env::var_os("NOMSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_path);
        let config = Config::load_or_default(&config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        let problems = config.validate();
        if !problems.is_empty() {
            for problem in &problems {
                error!(field = %problem.field, message = %problem.message, "Invalid configuration");
            }
            anyhow::bail!("configuration has {} error(s)", problems.len());
        }

        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteCandidateStore::new(db_pool.pool().clone()));

        let endpoint = match resolve_endpoint_url(store.as_ref(), &config).await {
            Ok(url) => url,
            Err(SyncError::EndpointNotConfigured) => {
                anyhow::bail!(
                    "No planner endpoint configured. Run 'nomsync config set-endpoint <URL>' first."
                )
            }
            Err(e) => return Err(e.into()),
        };
        info!(endpoint = %endpoint, "Using planner endpoint");

        let http = http_client(Duration::from_secs(config.remote.request_timeout_secs))?;
        let planner = Arc::new(PlannerClient::with_client(http.clone(), &endpoint)?);
        let profile = Arc::new(ProfileClient::with_client(http, &config.remote.profile_url)?);
        let queue = SyncQueue::new(
            planner.clone(),
            Arc::new(LogProgress),
            QueueOptions::from(&config.sync),
        );

        let session = PlannerSession::new(
            store,
            planner,
            profile,
            Reconciler::from_config(&config.matching),
            queue,
            SessionSettings::from(&config),
        );

        Ok(Self {
            config,
            db_pool,
            session,
            shutdown,
        })
    }

    /// Runs until shutdown is requested
    async fn run(&self) -> Result<()> {
        let inbox = self.config.inbox.directory.clone();
        tokio::fs::create_dir_all(&inbox)
            .await
            .with_context(|| format!("Failed to create inbox {}", inbox.display()))?;

        // Subscribe before scanning so nothing slips between the two
        let (mut watcher, change_rx) = FileWatcher::new()?;
        watcher.watch(&inbox)?;
        let mut scheduler = InboxScheduler::new(
            change_rx,
            Duration::from_millis(self.config.inbox.debounce_ms),
            POLL_INTERVAL,
        );

        match self.session.ensure_loaded().await {
            Ok(count) => info!(count, "Candidate cache ready"),
            Err(e) => warn!(error = %e, "Candidate cache unavailable, will retry on first batch"),
        }

        let backlog = pending_batch_files(&inbox).await?;
        if !backlog.is_empty() {
            info!(count = backlog.len(), "Processing batch files left in the inbox");
            self.process_all(backlog).await;
        }

        info!(inbox = %inbox.display(), "Watching inbox");
        loop {
            tokio::select! {
                batch = scheduler.next_batch() => match batch {
                    Some(files) => self.process_all(files).await,
                    None => {
                        warn!("Inbox watcher stopped");
                        break;
                    }
                },
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(watcher);
        let remaining = self.session.queue().depth();
        if remaining > 0 {
            warn!(remaining, "Abandoning undelivered planner updates");
        }
        self.db_pool.close().await;
        Ok(())
    }

    async fn process_all(&self, files: Vec<PathBuf>) {
        for path in files {
            if self.shutdown.is_cancelled() {
                return;
            }
            if !path.exists() {
                debug!(path = %path.display(), "Batch file already gone");
                continue;
            }
            let remove = self.config.inbox.remove_processed;
            match self.session.process_file(&path, remove).await {
                Ok(outcome) => log_outcome(&path, &outcome),
                Err(e) => error!(path = %path.display(), error = %e, "Batch failed"),
            }
        }
    }
}

fn log_outcome(path: &std::path::Path, outcome: &BatchOutcome) {
    let report = &outcome.report;
    info!(
        path = %path.display(),
        events = report.events.len(),
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        placeholders_removed = report.placeholders_removed,
        skipped = report.skipped,
        ignored = report.ignored,
        undecodable = outcome.undecodable,
        "Batch reconciled"
    );
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("nomsync daemon starting (nomsyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("nomsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "nomsync daemon exiting with error"),
    }

    result
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use nomsync_core::domain::PlannerRecord;
    use nomsync_core::ports::{IPlannerFeed, IProfileResolver, ISyncEndpoint, NullProgressSink};

    use super::*;

    struct EmptyPlanner;

    #[async_trait::async_trait]
    impl IPlannerFeed for EmptyPlanner {
        async fn fetch_planner(&self) -> anyhow::Result<Vec<PlannerRecord>> {
            Ok(Vec::new())
        }
    }

    struct FixedProfile;

    #[async_trait::async_trait]
    impl IProfileResolver for FixedProfile {
        async fn resolve_nickname(&self) -> anyhow::Result<String> {
            Ok("agent".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingEndpoint {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ISyncEndpoint for RecordingEndpoint {
        async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
            self.delivered.lock().unwrap().push(event.target_id.clone());
            Ok(())
        }
    }

    async fn service(
        inbox: &Path,
        remove_processed: bool,
        shutdown: CancellationToken,
    ) -> (DaemonService, Arc<RecordingEndpoint>) {
        let mut config = Config::default();
        config.inbox.directory = inbox.to_path_buf();
        config.inbox.remove_processed = remove_processed;
        config.inbox.debounce_ms = 50;

        let db_pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteCandidateStore::new(db_pool.pool().clone()));
        let endpoint = Arc::new(RecordingEndpoint::default());
        let queue = SyncQueue::new(
            endpoint.clone(),
            Arc::new(NullProgressSink),
            QueueOptions::default(),
        );
        let session = PlannerSession::new(
            store,
            Arc::new(EmptyPlanner),
            Arc::new(FixedProfile),
            Reconciler::from_config(&config.matching),
            queue,
            SessionSettings::from(&config),
        );

        let service = DaemonService {
            config,
            db_pool,
            session,
            shutdown,
        };
        (service, endpoint)
    }

    fn write_batch(path: &Path, id: &str) {
        let body = format!(
            r#"[{{"id": "{id}", "status": "NOMINATED", "title": "Bench", "description": "Oak", "lat": 1.0, "lng": 2.0}}]"#
        );
        std::fs::write(path, body).unwrap();
    }

    async fn wait_until_gone(path: &Path) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("batch file was not processed");
    }

    #[tokio::test]
    async fn test_process_all_skips_missing_and_removes_processed() {
        let dir = tempfile::tempdir().unwrap();
        let batch = dir.path().join("a.json");
        write_batch(&batch, "n1");
        let (service, endpoint) = service(dir.path(), true, CancellationToken::new()).await;

        service
            .process_all(vec![dir.path().join("gone.json"), batch.clone()])
            .await;
        service.session.queue().wait_idle().await;

        assert!(!batch.exists());
        assert_eq!(*endpoint.delivered.lock().unwrap(), vec!["n1".to_string()]);
    }

    #[tokio::test]
    async fn test_process_all_keeps_files_when_removal_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let batch = dir.path().join("a.json");
        write_batch(&batch, "n1");
        let (service, endpoint) = service(dir.path(), false, CancellationToken::new()).await;

        service.process_all(vec![batch.clone()]).await;
        service.session.queue().wait_idle().await;

        assert!(batch.exists());
        assert_eq!(endpoint.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_process_all_stops_once_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let batch = dir.path().join("a.json");
        write_batch(&batch, "n1");
        let token = CancellationToken::new();
        token.cancel();
        let (service, endpoint) = service(dir.path(), true, token).await;

        service.process_all(vec![batch.clone()]).await;

        assert!(batch.exists());
        assert!(endpoint.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_backlog_and_watches_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        let backlog = inbox.join("backlog.json");
        write_batch(&backlog, "n1");
        std::fs::write(inbox.join("notes.txt"), "not a batch").unwrap();

        let token = CancellationToken::new();
        let (service, endpoint) = service(&inbox, true, token.clone()).await;

        let driver = async {
            wait_until_gone(&backlog).await;

            let live = inbox.join("live.json");
            write_batch(&live, "n2");
            wait_until_gone(&live).await;

            service.session.queue().wait_idle().await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(service.run(), driver);

        result.unwrap();
        assert!(inbox.join("notes.txt").exists());
        let mut delivered = endpoint.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec!["n1".to_string(), "n2".to_string()]);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn test_log_progress_does_not_panic() {
        LogProgress.report_depth(3);
        LogProgress.report_failure(&ChangeEvent::delete("x"), "timeout");
    }
}
