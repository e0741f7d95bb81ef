//! Planner session
//!
//! A [`PlannerSession`] is built once per process from its collaborators
//! and owns the in-memory candidate set. Batches are processed one at a
//! time: the set is locked for the whole pass, reconciled, persisted if
//! anything changed, and the resulting events are handed to the
//! [`SyncQueue`].
//!
//! ## Cache lifecycle
//!
//! The candidate set is loaded on first use and checked for age on every
//! later access, so a long-running session picks up planner rows added
//! since the last rebuild. A missing, unreadable or stale cache is rebuilt
//! from the planner feed, and only that full rebuild moves the
//! `last_update` timestamp.
//!
//! A pass reconciles a copy of the set. The copy replaces the in-memory
//! set only once it has been persisted, so a failed write leaves the
//! changes detectable by the next pass.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nomsync_core::config::Config;
use nomsync_core::domain::{CacheSnapshot, CandidateSet, SubmissionBatch};
use nomsync_core::ports::{ICandidateStore, IPlannerFeed, IProfileResolver};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::queue::SyncQueue;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::SyncError;

// ============================================================================
// Settings and results
// ============================================================================

/// Session tuning taken from the configuration file
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cache_max_age: chrono::Duration,
    pub nickname_fallback: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cache_max_age: chrono::Duration::hours(12),
            nickname_fallback: "wayfarer".to_string(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            cache_max_age: config.cache_max_age(),
            nickname_fallback: config.remote.nickname_fallback.clone(),
        }
    }
}

/// Outcome of one full rebuild from the planner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Candidates now cached
    pub loaded: usize,
    /// Rows with a status outside the planner taxonomy
    pub unrecognized: usize,
    /// Rows missing required fields
    pub malformed: usize,
}

/// Outcome of processing one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub report: ReconcileReport,
    /// Entries that were not even submission objects
    pub undecodable: usize,
    /// Whether the candidate set was written back to the store
    pub persisted: bool,
}

/// Resolves the planner endpoint: the stored value wins over the config file
pub async fn resolve_endpoint_url(
    store: &dyn ICandidateStore,
    config: &Config,
) -> Result<String, SyncError> {
    if let Some(url) = store.endpoint_url().await.map_err(SyncError::Store)? {
        return Ok(url);
    }
    config
        .remote
        .endpoint_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(SyncError::EndpointNotConfigured)
}

// ============================================================================
// PlannerSession
// ============================================================================

/// The in-memory candidate set and the planner rebuild it descends from
struct LoadedSet {
    set: CandidateSet,
    /// `None` when the set never came from a successful planner fetch
    as_of: Option<DateTime<Utc>>,
}

impl LoadedSet {
    fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.as_of
            .map_or(true, |at| now.signed_duration_since(at) > max_age)
    }
}

/// Serializes reconciliation passes over one candidate set
pub struct PlannerSession {
    store: Arc<dyn ICandidateStore>,
    planner: Arc<dyn IPlannerFeed>,
    profile: Arc<dyn IProfileResolver>,
    reconciler: Reconciler,
    queue: SyncQueue,
    settings: SessionSettings,
    candidates: Mutex<Option<LoadedSet>>,
    nickname: OnceCell<String>,
}

impl PlannerSession {
    pub fn new(
        store: Arc<dyn ICandidateStore>,
        planner: Arc<dyn IPlannerFeed>,
        profile: Arc<dyn IProfileResolver>,
        reconciler: Reconciler,
        queue: SyncQueue,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            planner,
            profile,
            reconciler,
            queue,
            settings,
            candidates: Mutex::new(None),
            nickname: OnceCell::new(),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Loads the candidate set if absent or stale, returning its size
    pub async fn ensure_loaded(&self) -> Result<usize, SyncError> {
        let mut slot = self.candidates.lock().await;
        Ok(self.loaded(&mut slot).await?.set.len())
    }

    /// Rebuilds the cache from the planner regardless of its age
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self) -> Result<ReloadSummary, SyncError> {
        let mut slot = self.candidates.lock().await;
        let (loaded, summary) = self.rebuild().await?;
        *slot = Some(loaded);
        Ok(summary)
    }

    /// Display name attached to events, resolved at most once per session
    ///
    /// Order: cached store value, then the profile API (cached on success),
    /// then the configured fallback.
    pub async fn nickname(&self) -> &str {
        self.nickname
            .get_or_init(|| async {
                match self.store.cached_nickname().await {
                    Ok(Some(name)) if !name.trim().is_empty() => return name,
                    Ok(_) => {}
                    Err(e) => warn!(error = %format!("{e:#}"), "Cannot read cached nickname"),
                }

                match self.profile.resolve_nickname().await {
                    Ok(name) => {
                        if let Err(e) = self.store.set_cached_nickname(&name).await {
                            warn!(error = %format!("{e:#}"), "Cannot cache nickname");
                        }
                        info!(nickname = %name, "Resolved nickname");
                        name
                    }
                    Err(e) => {
                        warn!(
                            error = %format!("{e:#}"),
                            fallback = %self.settings.nickname_fallback,
                            "Profile lookup failed, using fallback nickname"
                        );
                        self.settings.nickname_fallback.clone()
                    }
                }
            })
            .await
    }

    /// Decodes and processes one batch body
    pub async fn process_json(&self, text: &str) -> Result<BatchOutcome, SyncError> {
        let batch = SubmissionBatch::from_json(text)?;
        self.process_batch(batch).await
    }

    /// Reads, processes and optionally deletes one batch file
    ///
    /// A file that cannot be decoded is still removed when `remove` is set,
    /// so it is not retried forever.
    pub async fn process_file(&self, path: &Path, remove: bool) -> Result<BatchOutcome, SyncError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SyncError::BatchFile {
                path: path.to_path_buf(),
                source,
            })?;

        let result = self.process_json(&text).await;
        let consumed = matches!(result, Ok(_) | Err(SyncError::BatchParse(_)));
        if remove && consumed {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Cannot remove processed batch file");
            }
        }
        result
    }

    /// Reconciles one batch and queues the resulting events
    #[tracing::instrument(skip_all, fields(records = batch.len()))]
    pub async fn process_batch(&self, batch: SubmissionBatch) -> Result<BatchOutcome, SyncError> {
        if batch.undecodable > 0 {
            warn!(count = batch.undecodable, "Batch contained undecodable entries");
        }

        let mut slot = self.candidates.lock().await;
        let nickname = self.nickname().await.to_string();
        let current = self.loaded(&mut slot).await?;

        let mut working = current.set.clone();
        let report = self
            .reconciler
            .reconcile(&batch.records, &mut working, &nickname);

        let persisted = report.has_changes();
        if persisted {
            self.store
                .save_candidates(&working)
                .await
                .map_err(SyncError::Store)?;
            current.set = working;
        }
        drop(slot);

        self.queue.enqueue_all(report.events.iter().cloned());

        Ok(BatchOutcome {
            report,
            undecodable: batch.undecodable,
            persisted,
        })
    }

    /// The candidate set, (re)loading it into `slot` when absent or stale
    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<LoadedSet>,
    ) -> Result<&'a mut LoadedSet, SyncError> {
        let max_age = self.settings.cache_max_age;
        match slot.take() {
            Some(current) if !current.is_stale(Utc::now(), max_age) => Ok(slot.insert(current)),
            previous => match self.load().await {
                Ok(loaded) => Ok(slot.insert(loaded)),
                Err(e) => match previous {
                    Some(current) => {
                        warn!(error = %e, "Cannot refresh candidates, keeping the in-memory set");
                        Ok(slot.insert(current))
                    }
                    None => Err(e),
                },
            },
        }
    }

    async fn load(&self) -> Result<LoadedSet, SyncError> {
        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Candidate cache unreadable, treating as absent");
                CacheSnapshot::default()
            }
        };
        if !snapshot.is_stale(Utc::now(), self.settings.cache_max_age) {
            if let Some(set) = snapshot.candidates {
                debug!(count = set.len(), "Using cached candidates");
                return Ok(LoadedSet {
                    set,
                    as_of: snapshot.last_update,
                });
            }
        }

        info!(last_update = ?snapshot.last_update, "Candidate cache missing or stale, reloading");
        match self.rebuild().await {
            Ok((loaded, _)) => Ok(loaded),
            Err(SyncError::Remote(e)) => match snapshot.candidates {
                Some(stale) => {
                    warn!(
                        error = %format!("{e:#}"),
                        count = stale.len(),
                        "Planner unreachable, continuing with stale cache"
                    );
                    // Keeps the old timestamp so the next access retries the planner
                    Ok(LoadedSet {
                        set: stale,
                        as_of: snapshot.last_update,
                    })
                }
                None => Err(SyncError::Remote(e)),
            },
            Err(e) => Err(e),
        }
    }

    async fn rebuild(&self) -> Result<(LoadedSet, ReloadSummary), SyncError> {
        let rows = self
            .planner
            .fetch_planner()
            .await
            .map_err(SyncError::Remote)?;

        let import = CandidateSet::from_planner_records(rows, self.reconciler.cell_level());
        for err in &import.malformed {
            warn!(error = %err, "Skipping malformed planner row");
        }

        self.store
            .save_candidates(&import.set)
            .await
            .map_err(SyncError::Store)?;
        let now = Utc::now();
        self.store
            .set_last_update(now)
            .await
            .map_err(SyncError::Store)?;

        let summary = ReloadSummary {
            loaded: import.set.len(),
            unrecognized: import.unrecognized,
            malformed: import.malformed.len(),
        };
        info!(
            loaded = summary.loaded,
            unrecognized = summary.unrecognized,
            malformed = summary.malformed,
            "Candidate cache rebuilt from planner"
        );
        Ok((
            LoadedSet {
                set: import.set,
                as_of: Some(now),
            },
            summary,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use chrono::{DateTime, Duration};
    use nomsync_core::domain::{
        CandidateRecord, CandidateStatus, ChangeEvent, GeoPoint, PlannerRecord,
    };
    use nomsync_core::ports::{ISyncEndpoint, NullProgressSink};

    use super::*;
    use crate::queue::QueueOptions;

    // ------------------------------------------------------------------
    // In-memory collaborators
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MemoryStore {
        candidates: StdMutex<Option<CandidateSet>>,
        last_update: StdMutex<Option<DateTime<Utc>>>,
        endpoint: StdMutex<Option<String>>,
        nickname: StdMutex<Option<String>>,
        saves: AtomicUsize,
        /// Number of upcoming `save_candidates` calls that fail
        failing_saves: AtomicUsize,
        /// Makes `load_candidates` fail as if the stored value were corrupt
        unreadable: AtomicBool,
    }

    impl MemoryStore {
        fn with_cache(set: CandidateSet, age: Duration) -> Self {
            let store = Self::default();
            *store.candidates.lock().unwrap() = Some(set);
            *store.last_update.lock().unwrap() = Some(Utc::now() - age);
            store
        }
    }

    #[async_trait::async_trait]
    impl ICandidateStore for MemoryStore {
        async fn load_candidates(&self) -> anyhow::Result<Option<CandidateSet>> {
            if self.unreadable.load(Ordering::SeqCst) {
                anyhow::bail!("candidates: expected value at line 1 column 1");
            }
            Ok(self.candidates.lock().unwrap().clone())
        }
        async fn save_candidates(&self, candidates: &CandidateSet) -> anyhow::Result<()> {
            let failing = self
                .failing_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                anyhow::bail!("disk full");
            }
            self.unreadable.store(false, Ordering::SeqCst);
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.candidates.lock().unwrap() = Some(candidates.clone());
            Ok(())
        }
        async fn last_update(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
            Ok(*self.last_update.lock().unwrap())
        }
        async fn set_last_update(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
            *self.last_update.lock().unwrap() = Some(at);
            Ok(())
        }
        async fn endpoint_url(&self) -> anyhow::Result<Option<String>> {
            Ok(self.endpoint.lock().unwrap().clone())
        }
        async fn set_endpoint_url(&self, url: &str) -> anyhow::Result<()> {
            *self.endpoint.lock().unwrap() = Some(url.to_string());
            Ok(())
        }
        async fn cached_nickname(&self) -> anyhow::Result<Option<String>> {
            Ok(self.nickname.lock().unwrap().clone())
        }
        async fn set_cached_nickname(&self, nickname: &str) -> anyhow::Result<()> {
            *self.nickname.lock().unwrap() = Some(nickname.to_string());
            Ok(())
        }
        async fn clear(&self) -> anyhow::Result<()> {
            *self.candidates.lock().unwrap() = None;
            *self.last_update.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePlanner {
        rows: Vec<PlannerRecord>,
        fail: bool,
        fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IPlannerFeed for FakePlanner {
        async fn fetch_planner(&self) -> anyhow::Result<Vec<PlannerRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("planner unreachable");
            }
            Ok(self.rows.clone())
        }
    }

    struct FakeProfile {
        nickname: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeProfile {
        fn returning(nickname: Option<&'static str>) -> Self {
            Self {
                nickname,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl IProfileResolver for FakeProfile {
        async fn resolve_nickname(&self) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.nickname
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("profile unavailable"))
        }
    }

    #[derive(Default)]
    struct RecordingEndpoint {
        delivered: StdMutex<Vec<ChangeEvent>>,
    }

    #[async_trait::async_trait]
    impl ISyncEndpoint for RecordingEndpoint {
        async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
            self.delivered.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        planner: Arc<FakePlanner>,
        profile: Arc<FakeProfile>,
        endpoint: Arc<RecordingEndpoint>,
        session: PlannerSession,
    }

    fn harness(store: MemoryStore, planner: FakePlanner, profile: FakeProfile) -> Harness {
        harness_with(store, planner, profile, SessionSettings::default())
    }

    fn harness_with(
        store: MemoryStore,
        planner: FakePlanner,
        profile: FakeProfile,
        settings: SessionSettings,
    ) -> Harness {
        let store = Arc::new(store);
        let planner = Arc::new(planner);
        let profile = Arc::new(profile);
        let endpoint = Arc::new(RecordingEndpoint::default());
        let queue = SyncQueue::new(
            endpoint.clone(),
            Arc::new(NullProgressSink),
            QueueOptions::default(),
        );
        let session = PlannerSession::new(
            store.clone(),
            planner.clone(),
            profile.clone(),
            Reconciler::default(),
            queue,
            settings,
        );
        Harness {
            store,
            planner,
            profile,
            endpoint,
            session,
        }
    }

    fn cached_set() -> CandidateSet {
        let mut set = CandidateSet::new();
        set.insert(
            "a",
            CandidateRecord::new(
                GeoPoint::new(1.0, 2.0),
                "Fountain",
                "Stone",
                CandidateStatus::Voting,
                17,
            ),
        );
        set
    }

    fn planner_row(id: &str, status: &str) -> PlannerRecord {
        PlannerRecord {
            id: Some(id.to_string()),
            status: Some(status.to_string()),
            title: Some("Row".to_string()),
            description: Some(String::new()),
            lat: Some(3.0),
            lng: Some(4.0),
        }
    }

    const UNCHANGED: &str =
        r#"[{"id": "a", "status": "VOTING", "title": "Fountain", "description": "Stone", "lat": 1.0, "lng": 2.0, "type": "NOMINATION"}]"#;

    // ------------------------------------------------------------------
    // Cache loading
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_fresh_cache_skips_planner() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
        assert_eq!(h.planner.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_is_rebuilt_from_planner() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(13)),
            FakePlanner {
                rows: vec![planner_row("p1", "potential"), planner_row("x", "live")],
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
        );

        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
        assert_eq!(h.planner.fetches.load(Ordering::SeqCst), 1);

        let stored = h.store.candidates.lock().unwrap().clone().unwrap();
        assert!(stored.contains("p1"));
        assert!(!stored.contains("a"));
        let updated = h.store.last_update.lock().unwrap().unwrap();
        assert!(Utc::now() - updated < Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_stale_cache_survives_unreachable_planner() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(13)),
            FakePlanner {
                fail: true,
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
        );

        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_cache_and_unreachable_planner_fails() {
        let h = harness(
            MemoryStore::default(),
            FakePlanner {
                fail: true,
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
        );

        assert!(matches!(
            h.session.ensure_loaded().await,
            Err(SyncError::Remote(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_reports_summary() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner {
                rows: vec![
                    planner_row("p1", "potential"),
                    planner_row("s1", "submitted"),
                    planner_row("x", "live"),
                    PlannerRecord {
                        lat: None,
                        ..planner_row("broken", "held")
                    },
                ],
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
        );

        let summary = h.session.reload().await.unwrap();
        assert_eq!(
            summary,
            ReloadSummary {
                loaded: 2,
                unrecognized: 1,
                malformed: 1
            }
        );
        assert_eq!(h.session.ensure_loaded().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_cache_is_rebuilt_from_planner() {
        let store = MemoryStore::with_cache(cached_set(), Duration::hours(1));
        store.unreadable.store(true, Ordering::SeqCst);
        let h = harness(
            store,
            FakePlanner {
                rows: vec![planner_row("p1", "potential")],
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
        );

        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
        assert_eq!(h.planner.fetches.load(Ordering::SeqCst), 1);
        let stored = h.store.candidates.lock().unwrap().clone().unwrap();
        assert!(stored.contains("p1"));
    }

    #[tokio::test]
    async fn test_in_memory_set_is_refreshed_once_stale() {
        let h = harness_with(
            MemoryStore::with_cache(cached_set(), Duration::zero()),
            FakePlanner {
                rows: vec![planner_row("p1", "potential")],
                ..Default::default()
            },
            FakeProfile::returning(Some("agent")),
            SessionSettings {
                cache_max_age: Duration::milliseconds(200),
                ..Default::default()
            },
        );

        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
        assert_eq!(h.session.ensure_loaded().await.unwrap(), 1);
        assert_eq!(h.planner.fetches.load(Ordering::SeqCst), 0);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        h.session.process_json(UNCHANGED).await.unwrap();
        assert_eq!(h.planner.fetches.load(Ordering::SeqCst), 1);
        let stored = h.store.candidates.lock().unwrap().clone().unwrap();
        assert!(stored.contains("p1"));
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_unchanged_batch_does_not_write_store() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        let outcome = h.session.process_json(UNCHANGED).await.unwrap();
        assert!(!outcome.persisted);
        assert!(outcome.report.events.is_empty());
        assert_eq!(h.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_changed_batch_is_persisted_and_delivered() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        let body = r#"{"result": {"submissions": [
            {"id": "a", "status": "ACCEPTED", "title": "Fountain", "description": "Stone", "lat": 1.0, "lng": 2.0},
            {"id": "n", "status": "NOMINATED", "title": "Bench", "description": "Oak", "lat": "5.5", "lng": "6.5", "day": "2024-01-02"}
        ]}}"#;
        let outcome = h.session.process_json(body).await.unwrap();
        assert!(outcome.persisted);
        assert_eq!(outcome.report.deleted, 1);
        assert_eq!(outcome.report.created, 1);
        assert_eq!(h.store.saves.load(Ordering::SeqCst), 1);

        h.session.queue().wait_idle().await;
        let delivered = h.endpoint.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        let created = delivered.iter().find(|e| e.target_id == "n").unwrap();
        let fields = created.form_fields();
        assert!(fields.contains(&("nickname", "agent".to_string())));
        assert!(fields.contains(&("submitteddate", "2024-01-02".to_string())));

        let stored = h.store.candidates.lock().unwrap().clone().unwrap();
        assert!(!stored.contains("a"));
        assert!(stored.contains("n"));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_change_for_next_pass() {
        let store = MemoryStore::with_cache(cached_set(), Duration::hours(1));
        store.failing_saves.store(1, Ordering::SeqCst);
        let h = harness(store, FakePlanner::default(), FakeProfile::returning(Some("agent")));

        let accepted = r#"[{"id": "a", "status": "ACCEPTED", "title": "Fountain", "description": "Stone", "lat": 1.0, "lng": 2.0}]"#;
        assert!(matches!(
            h.session.process_json(accepted).await,
            Err(SyncError::Store(_))
        ));
        h.session.queue().wait_idle().await;
        assert!(h.endpoint.delivered.lock().unwrap().is_empty());

        let outcome = h.session.process_json(accepted).await.unwrap();
        assert_eq!(outcome.report.deleted, 1);
        assert!(outcome.persisted);

        h.session.queue().wait_idle().await;
        let delivered = h.endpoint.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].is_delete());
        assert_eq!(delivered[0].target_id, "a");
    }

    #[tokio::test]
    async fn test_batch_parse_error() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        assert!(matches!(
            h.session.process_json("{\"unexpected\": true}").await,
            Err(SyncError::BatchParse(_))
        ));
        assert!(matches!(
            h.session.process_json("not json").await,
            Err(SyncError::BatchParse(_))
        ));
    }

    #[tokio::test]
    async fn test_process_file_removes_consumed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, UNCHANGED).unwrap();
        std::fs::write(&bad, "garbage").unwrap();

        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        h.session.process_file(&good, true).await.unwrap();
        assert!(!good.exists());

        assert!(h.session.process_file(&bad, true).await.is_err());
        assert!(!bad.exists());

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            h.session.process_file(&missing, true).await,
            Err(SyncError::BatchFile { .. })
        ));
    }

    // ------------------------------------------------------------------
    // Nickname
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_nickname_resolved_once_and_cached() {
        let h = harness(
            MemoryStore::with_cache(cached_set(), Duration::hours(1)),
            FakePlanner::default(),
            FakeProfile::returning(Some("agent")),
        );

        assert_eq!(h.session.nickname().await, "agent");
        assert_eq!(h.session.nickname().await, "agent");
        h.session.process_json(UNCHANGED).await.unwrap();

        assert_eq!(h.profile.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.nickname.lock().unwrap().as_deref(), Some("agent"));
    }

    #[tokio::test]
    async fn test_cached_nickname_short_circuits_profile() {
        let store = MemoryStore::default();
        *store.nickname.lock().unwrap() = Some("stored".to_string());
        let h = harness(store, FakePlanner::default(), FakeProfile::returning(Some("agent")));

        assert_eq!(h.session.nickname().await, "stored");
        assert_eq!(h.profile.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_profile_failure_uses_fallback() {
        let h = harness(
            MemoryStore::default(),
            FakePlanner::default(),
            FakeProfile::returning(None),
        );

        assert_eq!(h.session.nickname().await, "wayfarer");
        assert!(h.store.nickname.lock().unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Endpoint resolution
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_resolve_endpoint_prefers_store() {
        let store = MemoryStore::default();
        let mut config = Config::default();

        assert!(matches!(
            resolve_endpoint_url(&store, &config).await,
            Err(SyncError::EndpointNotConfigured)
        ));

        config.remote.endpoint_url = Some("https://config.example/exec".to_string());
        assert_eq!(
            resolve_endpoint_url(&store, &config).await.unwrap(),
            "https://config.example/exec"
        );

        store
            .set_endpoint_url("https://stored.example/exec")
            .await
            .unwrap();
        assert_eq!(
            resolve_endpoint_url(&store, &config).await.unwrap(),
            "https://stored.example/exec"
        );
    }
}
