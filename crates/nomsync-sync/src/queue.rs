//! Bounded-concurrency delivery queue
//!
//! [`SyncQueue`] owns every undelivered [`ChangeEvent`]. Events are
//! admitted in FIFO order while fewer than `concurrency` deliveries are in
//! flight; each admitted event runs as its own tokio task.
//!
//! ## Retry
//!
//! Every event gets `retry_limit` attempts. A failed attempt puts the event
//! back at the tail, so other work proceeds before it is retried. When the
//! last attempt fails the event is dropped and reported to the
//! [`IProgressSink`].
//!
//! ## Locking
//!
//! The pending list and the in-flight count sit behind one mutex, and the
//! depth reported after each completion is computed while holding it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use nomsync_core::config::SyncConfig;
use nomsync_core::domain::ChangeEvent;
use nomsync_core::ports::{IProgressSink, ISyncEndpoint};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

// ============================================================================
// Options and stats
// ============================================================================

/// Queue tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum deliveries in flight
    pub concurrency: usize,
    /// Attempts per event
    pub retry_limit: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_limit: 3,
        }
    }
}

impl QueueOptions {
    /// At least one delivery in flight and one attempt per event
    fn clamped(self) -> Self {
        Self {
            concurrency: self.concurrency.max(1),
            retry_limit: self.retry_limit.max(1),
        }
    }
}

impl From<&SyncConfig> for QueueOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            retry_limit: config.retry_limit,
        }
        .clamped()
    }
}

/// Counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub delivered: u64,
    pub failed: u64,
    /// Pending plus in flight
    pub depth: usize,
}

// ============================================================================
// SyncTask
// ============================================================================

/// A change event waiting for delivery
#[derive(Debug, Clone)]
struct SyncTask {
    event: ChangeEvent,
    retries_left: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<SyncTask>,
    active: usize,
}

impl QueueState {
    fn depth(&self) -> usize {
        self.pending.len() + self.active
    }
}

struct Inner {
    state: Mutex<QueueState>,
    endpoint: Arc<dyn ISyncEndpoint>,
    progress: Arc<dyn IProgressSink>,
    options: QueueOptions,
    delivered: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a sink panicked; the state itself is intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// SyncQueue
// ============================================================================

/// FIFO delivery queue with a concurrency limit
///
/// Cloning yields another handle to the same queue. Enqueueing spawns
/// tokio tasks, so it must happen inside a runtime.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

impl SyncQueue {
    pub fn new(
        endpoint: Arc<dyn ISyncEndpoint>,
        progress: Arc<dyn IProgressSink>,
        options: QueueOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                endpoint,
                progress,
                options: options.clamped(),
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn options(&self) -> QueueOptions {
        self.inner.options
    }

    /// Appends one event and starts delivering if a slot is free
    pub fn enqueue(&self, event: ChangeEvent) {
        self.enqueue_all(std::iter::once(event));
    }

    /// Appends events in order, then admits as many as the limit allows
    pub fn enqueue_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        let retries_left = self.inner.options.retry_limit;
        {
            let mut state = self.inner.lock();
            for event in events {
                debug!(%event, "Queued change event");
                state.pending.push_back(SyncTask {
                    event,
                    retries_left,
                });
            }
        }
        Self::admit(&self.inner);
    }

    /// Pending plus in-flight events
    pub fn depth(&self) -> usize {
        self.inner.lock().depth()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            depth: self.depth(),
        }
    }

    /// Resolves once nothing is pending or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.depth() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn admit(inner: &Arc<Inner>) {
        let admitted: Vec<SyncTask> = {
            let mut state = inner.lock();
            let mut admitted = Vec::new();
            while state.active < inner.options.concurrency {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                state.active += 1;
                admitted.push(task);
            }
            admitted
        };

        for task in admitted {
            tokio::spawn(Self::deliver(Arc::clone(inner), task));
        }
    }

    async fn deliver(inner: Arc<Inner>, mut task: SyncTask) {
        let result = inner.endpoint.deliver(&task.event).await;

        let mut dropped = None;
        let depth = {
            let mut state = inner.lock();
            state.active -= 1;
            match result {
                Ok(()) => {
                    inner.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(event = %task.event, "Delivered");
                }
                Err(e) => {
                    task.retries_left = task.retries_left.saturating_sub(1);
                    if task.retries_left > 0 {
                        warn!(
                            event = %task.event,
                            retries_left = task.retries_left,
                            error = %format!("{e:#}"),
                            "Delivery failed, requeueing"
                        );
                        state.pending.push_back(task);
                    } else {
                        inner.failed.fetch_add(1, Ordering::Relaxed);
                        dropped = Some((task.event, format!("{e:#}")));
                    }
                }
            }
            state.depth()
        };

        if let Some((event, message)) = dropped {
            error!(%event, error = %message, "Delivery failed permanently, dropping");
            inner.progress.report_failure(&event, &message);
        }
        inner.progress.report_depth(depth);

        Self::admit(&inner);
        if depth == 0 {
            inner.idle.notify_waiters();
        }
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("options", &self.inner.options)
            .field("depth", &self.depth())
            .finish()
    }
}
