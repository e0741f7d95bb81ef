//! Inbox watching and debounced change queue
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the
//! inbox directory, converting raw OS events into [`FsEvent`] values.
//!
//! The [`DebouncedChangeQueue`] collects rapid-fire events and coalesces them
//! so that a batch file is only picked up once its writer has gone quiet for
//! the configured debounce window.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  DebouncedChangeQueue  ──→  InboxScheduler
//! ```
//!
//! [`watch_once`] is the short-lived variant: it resolves on the first
//! matching event and unsubscribes immediately.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Extension of submission batch files dropped into the inbox
pub const BATCH_EXTENSION: &str = "json";

// ============================================================================
// FsEvent
// ============================================================================

/// A filesystem change seen in a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    /// A rename within the watched directory
    Renamed { old: PathBuf, new: PathBuf },
}

impl FsEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Created(p) => p,
            FsEvent::Modified(p) => p,
            FsEvent::Deleted(p) => p,
            FsEvent::Renamed { new, .. } => new,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, FsEvent::Deleted(_))
    }
}

/// Whether `path` names a submission batch file (`*.json`, not hidden)
pub fn is_batch_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(true, |name| name.starts_with('.'));
    !hidden
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(BATCH_EXTENSION))
}

/// Batch files already sitting in `dir`, oldest first
///
/// Used at startup to pick up files that arrived while nothing was watching.
pub async fn pending_batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read inbox: {}", dir.display()))?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_batch_file(&path) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            found.push((metadata.modified().ok(), path));
        }
    }

    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a directory using the OS-native mechanism
///
/// On Linux this uses inotify. The watcher stops when dropped.
///
/// ## Usage
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// watcher.watch(&inbox)?;
/// // rx.recv().await to get events
/// drop(watcher); // stops watching
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a watcher and the receiver its events are delivered to
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<FsEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<FsEvent>(1024);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            debug!(error = %e, "Dropping change event (receiver closed)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher }, event_rx))
    }

    /// Starts watching the top level of `path`
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing directory,
    /// insufficient permissions, or inotify watch limit reached)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Watching directory");

        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))
    }
}

/// Waits for the first event in `dir` whose path satisfies `predicate`
///
/// The OS watcher is dropped as soon as a match arrives. Deletions never
/// match.
///
/// # Errors
/// Fails when `dir` cannot be watched or the watcher shuts down first.
pub async fn watch_once<F>(dir: &Path, mut predicate: F) -> Result<PathBuf>
where
    F: FnMut(&Path) -> bool,
{
    let (mut watcher, mut rx) = FileWatcher::new()?;
    watcher.watch(dir)?;

    while let Some(event) = rx.recv().await {
        if event.is_deletion() {
            continue;
        }
        if predicate(event.path()) {
            debug!(path = %event.path().display(), "One-shot watch matched");
            return Ok(event.path().to_path_buf());
        }
    }

    anyhow::bail!("Watcher for {} closed before a match", dir.display())
}

// ============================================================================
// Event mapping - notify::Event → FsEvent
// ============================================================================

/// Converts a `notify::Event` into an [`FsEvent`]
///
/// Maps the notify event kinds as follows:
/// - `Create(*)` -> `FsEvent::Created`
/// - `Modify(Name(Both))` with 2 paths -> `FsEvent::Renamed`
/// - `Remove(*)` -> `FsEvent::Deleted`
/// - Any other `Modify(*)` -> `FsEvent::Modified`
///
/// Access events and events without paths are ignored.
fn map_notify_event(event: &notify::Event) -> Option<FsEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => Some(FsEvent::Created(paths.first()?.clone())),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                Some(FsEvent::Renamed {
                    old: paths[0].clone(),
                    new: paths[1].clone(),
                })
            } else {
                Some(FsEvent::Modified(paths.first()?.clone()))
            }
        }

        EventKind::Remove(_) => Some(FsEvent::Deleted(paths.first()?.clone())),

        EventKind::Modify(_) => Some(FsEvent::Modified(paths.first()?.clone())),

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

// ============================================================================
// File stability check
// ============================================================================

/// Checks if a file is stable (not currently being written to)
///
/// Reads the file size twice, separated by `check_interval`. A file that
/// cannot be read is reported as unstable.
pub async fn is_file_stable(path: &Path, check_interval: Duration) -> bool {
    let size_first = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cannot read batch file metadata");
            return false;
        }
    };

    tokio::time::sleep(check_interval).await;

    let size_second = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Batch file vanished during stability check");
            return false;
        }
    };

    size_first == size_second
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Queue that coalesces rapid filesystem changes into debounced events
///
/// When multiple events arrive for the same path in quick succession,
/// only the latest one is kept and its timestamp is reset. Events are only
/// emitted by [`poll`](DebouncedChangeQueue::poll) once they have been
/// quiet for longer than the debounce delay.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (FsEvent, Instant)>,
    debounce_delay: Duration,
}

impl DebouncedChangeQueue {
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Inserts or replaces the pending event for the event's path
    pub fn push(&mut self, event: FsEvent) {
        let path = event.path().to_path_buf();
        self.pending.insert(path, (event, Instant::now()));
    }

    /// Removes and returns every event quiet for at least the debounce delay
    ///
    /// Settled events come back in the order they were last touched.
    pub fn poll(&mut self) -> Vec<FsEvent> {
        let now = Instant::now();
        let delay = self.debounce_delay;

        let mut settled: Vec<(Instant, FsEvent)> = Vec::new();
        self.pending.retain(|_, (event, timestamp)| {
            if now.duration_since(*timestamp) >= delay {
                settled.push((*timestamp, event.clone()));
                false
            } else {
                true
            }
        });

        settled.sort_by_key(|(timestamp, _)| *timestamp);
        if !settled.is_empty() {
            debug!(count = settled.len(), "Polled settled change events");
        }
        settled.into_iter().map(|(_, event)| event).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
