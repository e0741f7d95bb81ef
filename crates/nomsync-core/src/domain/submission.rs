//! Submissions reported by the review platform
//!
//! A feed batch arrives as JSON. Individual records are decoded leniently
//! into [`RawSubmission`] (every field optional) and then validated into a
//! [`Submission`]; a record that fails validation is skipped by the caller
//! without discarding the rest of the batch.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::errors::DomainError;
use super::geo::GeoPoint;
use super::status::SubmissionStatus;

/// Record type that takes part in reconciliation
pub const NOMINATION_TYPE: &str = "NOMINATION";

// ============================================================================
// Coordinate decoding
// ============================================================================

/// Accepts a number, a numeric string, or nothing
///
/// Anything else decodes to `None`, which validation later reports as a
/// missing coordinate.
pub(crate) fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Accepts a string or a number for identifier fields
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// RawSubmission
// ============================================================================

/// A submission exactly as decoded from the feed, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub lng: Option<f64>,
    #[serde(default, alias = "day")]
    pub submitted_date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,
}

impl RawSubmission {
    /// Whether this record takes part in reconciliation
    ///
    /// Records without a type predate typed feeds and are treated as
    /// nominations.
    pub fn is_nomination(&self) -> bool {
        self.record_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(NOMINATION_TYPE))
    }

    /// Identifier used in diagnostics
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unknown>")
    }
}

// ============================================================================
// Submission
// ============================================================================

/// A validated nomination from the review platform
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub status: SubmissionStatus,
    pub title: String,
    pub description: String,
    pub location: GeoPoint,
    pub submitted_date: Option<String>,
    pub image_url: Option<String>,
}

impl TryFrom<RawSubmission> for Submission {
    type Error = DomainError;

    fn try_from(raw: RawSubmission) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .ok_or_else(|| DomainError::missing("id", "<unknown>"))?;
        let status = raw
            .status
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DomainError::missing("status", id.clone()))?;
        let lat = raw.lat.ok_or_else(|| DomainError::missing("lat", id.clone()))?;
        let lng = raw.lng.ok_or_else(|| DomainError::missing("lng", id.clone()))?;

        let location = GeoPoint::new(lat, lng);
        if !location.is_valid() {
            return Err(DomainError::InvalidCoordinates {
                record: id,
                detail: format!("({lat}, {lng}) is not a valid position"),
            });
        }

        Ok(Self {
            id,
            status: SubmissionStatus::from(status.as_str()),
            title: raw.title.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            location,
            submitted_date: raw.submitted_date.filter(|d| !d.is_empty()),
            image_url: raw.image_url.filter(|u| !u.is_empty()),
        })
    }
}

// ============================================================================
// SubmissionBatch
// ============================================================================

/// One feed fetch worth of submissions
#[derive(Debug, Clone, Default)]
pub struct SubmissionBatch {
    /// Entries that decoded into the record shape
    pub records: Vec<RawSubmission>,
    /// Entries that were not even shaped like a record (e.g. `null`, a number)
    pub undecodable: usize,
}

impl SubmissionBatch {
    /// Decodes a batch from feed JSON
    ///
    /// Accepted layouts:
    /// - a bare array of records
    /// - `{"submissions": [...]}` or `{"nominations": [...]}`
    /// - either of the above wrapped in `{"result": ...}`
    ///
    /// # Errors
    /// [`DomainError::MalformedBatch`] when the text is not JSON or no record
    /// list can be located in it.
    pub fn from_json(text: &str) -> Result<Self, DomainError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DomainError::MalformedBatch(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Decodes a batch from an already parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        let entries = locate_records(value)
            .ok_or_else(|| DomainError::MalformedBatch("no submission list found".into()))?;

        let mut batch = SubmissionBatch::default();
        for entry in entries {
            match serde_json::from_value::<RawSubmission>(entry) {
                Ok(record) => batch.records.push(record),
                Err(_) => batch.undecodable += 1,
            }
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<RawSubmission>> for SubmissionBatch {
    fn from(records: Vec<RawSubmission>) -> Self {
        Self {
            records,
            undecodable: 0,
        }
    }
}

fn locate_records(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(entries) => Some(entries),
        Value::Object(mut map) => {
            if let Some(inner) = map.remove("result") {
                return locate_records(inner);
            }
            ["submissions", "nominations"]
                .into_iter()
                .find_map(|key| match map.remove(key) {
                    Some(Value::Array(entries)) => Some(entries),
                    _ => None,
                })
        }
        _ => None,
    }
}
