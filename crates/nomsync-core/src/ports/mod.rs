//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICandidateStore`] - Persistent key-value store for the candidate cache
//! - [`IPlannerFeed`] - Full candidate listing from the remote planner
//! - [`ISyncEndpoint`] - Delivery of a single change event to the planner
//! - [`IProfileResolver`] - Display name used to attribute change events
//! - [`IProgressSink`] - Queue depth and terminal failure reporting

pub mod candidate_store;
pub mod planner;
pub mod progress;

pub use candidate_store::ICandidateStore;
pub use planner::{IPlannerFeed, IProfileResolver, ISyncEndpoint};
pub use progress::{IProgressSink, NullProgressSink, ProgressUpdate};
