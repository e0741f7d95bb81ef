//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures when turning wire records into domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A record lacks a field the domain requires
    #[error("Missing field '{field}' in record {record}")]
    MissingField {
        /// Name of the absent field
        field: &'static str,
        /// Identifier of the record, or `<unknown>` when the id itself is missing
        record: String,
    },

    /// Coordinates are present but not a usable latitude/longitude pair
    #[error("Invalid coordinates for record {record}: {detail}")]
    InvalidCoordinates {
        /// Identifier of the offending record
        record: String,
        /// What was wrong with the values
        detail: String,
    },

    /// A status string is not part of the expected taxonomy
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A feed batch could not be interpreted at all
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Invalid cell identifier text
    #[error("Invalid cell id: {0}")]
    InvalidCellId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DomainError {
    /// Shorthand for a [`DomainError::MissingField`] on a record whose id is known
    pub fn missing(field: &'static str, record: impl Into<String>) -> Self {
        DomainError::MissingField {
            field,
            record: record.into(),
        }
    }
}
