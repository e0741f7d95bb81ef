//! Domain entities and business logic
//!
//! This module contains the core domain types for nomsync:
//! - Geospatial cell identifiers and great-circle distance
//! - Platform and planner status taxonomies, plus the normalization table
//! - Submissions as reported by the review platform
//! - Candidate records tracked in the planner cache
//! - Change events emitted by reconciliation
//! - Domain-specific error types

pub mod candidate;
pub mod change;
pub mod errors;
pub mod geo;
pub mod status;
pub mod submission;

// Re-export commonly used types
pub use candidate::{CacheSnapshot, CandidateRecord, CandidateSet, PlannerImport, PlannerRecord};
pub use change::{ChangeAction, ChangeEvent, EventPayload, DELETE_ACTION};
pub use errors::DomainError;
pub use geo::{cell_id, distance_meters, CellId, GeoPoint, DEFAULT_CELL_LEVEL, EARTH_RADIUS_METERS};
pub use status::{CandidateStatus, StatusTable, StatusTableVersion, SubmissionStatus};
pub use submission::{RawSubmission, Submission, SubmissionBatch, NOMINATION_TYPE};
