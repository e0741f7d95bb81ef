//! Inbox scheduler - turns debounced filesystem events into batch file lists
//!
//! The [`InboxScheduler`] sits between the [`FileWatcher`](super::watcher::FileWatcher)
//! and the [`PlannerSession`](super::session::PlannerSession). It receives raw
//! change events, feeds them through a
//! [`DebouncedChangeQueue`](super::watcher::DebouncedChangeQueue), and yields the
//! batch files that have settled.
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ mpsc::Receiver ──→ InboxScheduler ──→ next_batch()
//!                                        │
//!                                  DebouncedChangeQueue
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::watcher::{is_batch_file, DebouncedChangeQueue, FsEvent};

/// Yields settled batch files from a stream of inbox events
pub struct InboxScheduler {
    change_rx: mpsc::Receiver<FsEvent>,
    queue: DebouncedChangeQueue,
    poll_interval: Duration,
    closed: bool,
}

impl InboxScheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    /// * `change_rx` - Channel receiver for inbox change events
    /// * `debounce_delay` - How long a file must be quiet before it is yielded
    /// * `poll_interval` - How often the debounce queue is checked
    pub fn new(
        change_rx: mpsc::Receiver<FsEvent>,
        debounce_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        info!(
            debounce_ms = debounce_delay.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            "Creating inbox scheduler"
        );

        Self {
            change_rx,
            queue: DebouncedChangeQueue::new(debounce_delay),
            poll_interval,
            closed: false,
        }
    }

    /// Adds an event directly, bypassing the channel
    pub fn enqueue(&mut self, event: FsEvent) {
        self.queue.push(event);
    }

    /// Waits for the next group of settled batch files
    ///
    /// Deletions and files that are not batches are dropped. Returns `None`
    /// once the channel has closed and nothing is left to settle.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        let mut poll_timer = tokio::time::interval(self.poll_interval);

        loop {
            if self.closed && self.queue.is_empty() {
                info!("Change channel closed, inbox scheduler stopped");
                return None;
            }

            tokio::select! {
                event = self.change_rx.recv(), if !self.closed => {
                    match event {
                        Some(change) => self.queue.push(change),
                        None => self.closed = true,
                    }
                }

                _ = poll_timer.tick() => {
                    let files = settled_batch_files(self.queue.poll());
                    if !files.is_empty() {
                        debug!(count = files.len(), "Batch files settled");
                        return Some(files);
                    }
                }
            }
        }
    }
}

fn settled_batch_files(events: Vec<FsEvent>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for event in events {
        if event.is_deletion() || !is_batch_file(event.path()) {
            continue;
        }
        let path = event.path().to_path_buf();
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(debounce_ms: u64) -> (mpsc::Sender<FsEvent>, InboxScheduler) {
        let (tx, rx) = mpsc::channel(16);
        let scheduler = InboxScheduler::new(
            rx,
            Duration::from_millis(debounce_ms),
            Duration::from_millis(10),
        );
        (tx, scheduler)
    }

    #[test]
    fn test_settled_batch_files_filters() {
        let files = settled_batch_files(vec![
            FsEvent::Created(PathBuf::from("/inbox/a.json")),
            FsEvent::Deleted(PathBuf::from("/inbox/b.json")),
            FsEvent::Modified(PathBuf::from("/inbox/c.txt")),
            FsEvent::Renamed {
                old: PathBuf::from("/inbox/d.part"),
                new: PathBuf::from("/inbox/d.json"),
            },
        ]);
        assert_eq!(
            files,
            vec![PathBuf::from("/inbox/a.json"), PathBuf::from("/inbox/d.json")]
        );
    }

    #[tokio::test]
    async fn test_next_batch_coalesces_writes() {
        let (tx, mut scheduler) = scheduler(0);

        tx.send(FsEvent::Created(PathBuf::from("/inbox/a.json")))
            .await
            .unwrap();
        tx.send(FsEvent::Modified(PathBuf::from("/inbox/a.json")))
            .await
            .unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(files) = scheduler.next_batch().await {
            seen.extend(files);
        }
        assert_eq!(seen, vec![PathBuf::from("/inbox/a.json")]);
    }

    #[tokio::test]
    async fn test_next_batch_flushes_after_close() {
        let (tx, mut scheduler) = scheduler(30);

        tx.send(FsEvent::Created(PathBuf::from("/inbox/late.json")))
            .await
            .unwrap();
        drop(tx);

        let files = tokio::time::timeout(Duration::from_secs(2), scheduler.next_batch())
            .await
            .expect("scheduler should flush pending events");
        assert_eq!(files, Some(vec![PathBuf::from("/inbox/late.json")]));
        assert_eq!(scheduler.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_next_batch_ignores_non_batches() {
        let (tx, mut scheduler) = scheduler(0);
        scheduler.enqueue(FsEvent::Created(PathBuf::from("/inbox/notes.txt")));
        scheduler.enqueue(FsEvent::Deleted(PathBuf::from("/inbox/old.json")));
        drop(tx);

        let result = tokio::time::timeout(Duration::from_secs(2), scheduler.next_batch())
            .await
            .expect("scheduler should exit when channel closes");
        assert_eq!(result, None);
    }
}
