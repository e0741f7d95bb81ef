//! nomsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Submission`, `CandidateRecord`, `CandidateSet`, `ChangeEvent`
//! - **Geospatial identity** - cube-sphere `CellId` and haversine distance
//! - **Status normalization** - the versioned `StatusTable`
//! - **Port definitions** - Traits for adapters: `ICandidateStore`, `IPlannerFeed`,
//!   `ISyncEndpoint`, `IProfileResolver`, `IProgressSink`
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
