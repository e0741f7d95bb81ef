//! Progress sink port (driven/secondary port)
//!
//! The delivery queue reports to an [`IProgressSink`] after every
//! completed attempt. A UI may show the remaining depth as a counter and
//! surface terminal failures to the user.
//!
//! ## Design Notes
//!
//! - Methods are synchronous and must not block: they are called from
//!   queue workers while the queue is draining.
//! - Reporting is fire-and-forget; a sink cannot fail the queue.

use serde::{Deserialize, Serialize};

use crate::domain::ChangeEvent;

/// A progress notification, for sinks that forward updates elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// Pending plus in-flight events remaining
    Depth { remaining: usize },
    /// An event exhausted its retries and was dropped
    Failed { event: ChangeEvent, error: String },
}

/// Port trait for observing delivery progress
pub trait IProgressSink: Send + Sync {
    /// Called after each attempt with `pending + in_flight`
    fn report_depth(&self, remaining: usize);

    /// Called once when an event is dropped after its last attempt
    fn report_failure(&self, event: &ChangeEvent, error: &str);
}

/// Sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl IProgressSink for NullProgressSink {
    fn report_depth(&self, _remaining: usize) {}

    fn report_failure(&self, _event: &ChangeEvent, _error: &str) {}
}
