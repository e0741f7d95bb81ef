//! Candidate records tracked in the planner cache
//!
//! A [`CandidateRecord`] is the normalized, locally cached form of either a
//! submission that has been seen on the platform or a placeholder row typed
//! directly into the planner (`potential`). The full cache is a
//! [`CandidateSet`] keyed by id.

use std::collections::hash_map::Iter;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::geo::{cell_id, CellId, GeoPoint};
use super::status::CandidateStatus;
use super::submission::{lenient_coordinate, lenient_id};

// ============================================================================
// CandidateRecord
// ============================================================================

/// A tracked candidate, keyed externally by its submission or planner id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub cell_id: CellId,
    pub title: String,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    pub status: CandidateStatus,
}

impl CandidateRecord {
    /// Creates a record, deriving its cell from the coordinates
    pub fn new(
        location: GeoPoint,
        title: impl Into<String>,
        description: impl Into<String>,
        status: CandidateStatus,
        cell_level: u8,
    ) -> Self {
        Self {
            cell_id: cell_id(location, cell_level),
            title: title.into(),
            description: description.into(),
            lat: location.lat,
            lng: location.lng,
            status,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn is_placeholder(&self) -> bool {
        self.status == CandidateStatus::Potential
    }
}

// ============================================================================
// CandidateSet
// ============================================================================

/// The whole local cache: id → record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet {
    records: HashMap<String, CandidateRecord>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&CandidateRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CandidateRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Inserts or replaces the record stored under `id`
    pub fn insert(&mut self, id: impl Into<String>, record: CandidateRecord) -> Option<CandidateRecord> {
        self.records.insert(id.into(), record)
    }

    pub fn remove(&mut self, id: &str) -> Option<CandidateRecord> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, CandidateRecord> {
        self.records.iter()
    }

    /// Number of records per status, sorted by status name
    pub fn count_by_status(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Builds a set from planner rows
    ///
    /// Rows whose status is outside the planner taxonomy are dropped and
    /// counted; rows missing required fields are dropped and reported.
    pub fn from_planner_records(
        rows: impl IntoIterator<Item = PlannerRecord>,
        cell_level: u8,
    ) -> PlannerImport {
        let mut import = PlannerImport::default();
        for row in rows {
            match row.into_candidate(cell_level) {
                Ok((id, record)) => {
                    import.set.insert(id, record);
                }
                Err(DomainError::UnknownStatus(_)) => import.unrecognized += 1,
                Err(err) => import.malformed.push(err),
            }
        }
        import
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = (&'a String, &'a CandidateRecord);
    type IntoIter = Iter<'a, String, CandidateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<(String, CandidateRecord)> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = (String, CandidateRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// PlannerRecord
// ============================================================================

/// A row of the remote planner feed, decoded leniently
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerRecord {
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
}

impl PlannerRecord {
    /// Validates the row and converts it into a keyed candidate
    ///
    /// # Errors
    /// - [`DomainError::UnknownStatus`] for statuses outside the planner taxonomy
    /// - [`DomainError::MissingField`] / [`DomainError::InvalidCoordinates`] for broken rows
    pub fn into_candidate(self, cell_level: u8) -> Result<(String, CandidateRecord), DomainError> {
        let id = self
            .id
            .ok_or_else(|| DomainError::missing("id", "<unknown>"))?;
        let status: CandidateStatus = self
            .status
            .ok_or_else(|| DomainError::missing("status", id.clone()))?
            .parse()?;
        let lat = self.lat.ok_or_else(|| DomainError::missing("lat", id.clone()))?;
        let lng = self.lng.ok_or_else(|| DomainError::missing("lng", id.clone()))?;

        let location = GeoPoint::new(lat, lng);
        if !location.is_valid() {
            return Err(DomainError::InvalidCoordinates {
                record: id,
                detail: format!("({lat}, {lng}) is not a valid position"),
            });
        }

        let record = CandidateRecord::new(
            location,
            self.title.unwrap_or_default(),
            self.description.unwrap_or_default(),
            status,
            cell_level,
        );
        Ok((id, record))
    }
}

/// Outcome of building a [`CandidateSet`] from planner rows
#[derive(Debug, Default)]
pub struct PlannerImport {
    pub set: CandidateSet,
    /// Rows dropped because their status is not tracked
    pub unrecognized: usize,
    /// Rows dropped because they were incomplete
    pub malformed: Vec<DomainError>,
}

// ============================================================================
// CacheSnapshot
// ============================================================================

/// What the store currently holds for the candidate cache
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub candidates: Option<CandidateSet>,
    pub last_update: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// A cache is stale when either entry is absent or it is older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (&self.candidates, self.last_update) {
            (Some(_), Some(updated)) => now.signed_duration_since(updated) > max_age,
            _ => true,
        }
    }
}
