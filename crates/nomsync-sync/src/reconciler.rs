//! Reconciliation of submission batches against the candidate cache
//!
//! For every nomination in a batch the [`Reconciler`] decides whether the
//! planner needs to hear about it, mutates the in-memory [`CandidateSet`]
//! accordingly and emits the matching [`ChangeEvent`]s.
//!
//! ## Decision table
//!
//! | cached? | submission                         | outcome                          |
//! |---------|------------------------------------|----------------------------------|
//! | yes     | ACCEPTED                           | delete row                       |
//! | yes     | status changed after normalization | status event, record updated     |
//! | yes     | title or description changed       | update event, record updated     |
//! | yes     | unchanged                          | nothing                          |
//! | no      | NOMINATED..NIANTIC_REVIEW          | placeholder cleanup, then create |
//! | no      | anything else                      | ignored                          |
//!
//! A pass never fails: malformed records are skipped and counted.

use std::collections::HashSet;

use nomsync_core::config::MatchingConfig;
use nomsync_core::domain::{
    cell_id, distance_meters, CandidateRecord, CandidateSet, CellId, ChangeEvent, EventPayload,
    GeoPoint, RawSubmission, StatusTable, Submission, DEFAULT_CELL_LEVEL,
};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Distances under which a `potential` placeholder is considered the same
/// place as a new submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    /// Inclusive limit when the titles are identical
    pub same_title_meters: f64,
    /// Exclusive limit when the titles differ
    pub cross_title_meters: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            same_title_meters: 10.0,
            cross_title_meters: 3.0,
        }
    }
}

impl MatchThresholds {
    fn matches(&self, same_title: bool, distance: f64) -> bool {
        if same_title {
            distance <= self.same_title_meters
        } else {
            distance < self.cross_title_meters
        }
    }
}

// ============================================================================
// ReconcileReport
// ============================================================================

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Events to deliver, in emission order
    pub events: Vec<ChangeEvent>,
    /// New candidates inserted
    pub created: usize,
    /// Known candidates whose status or text changed
    pub updated: usize,
    /// Known candidates removed because they were accepted
    pub deleted: usize,
    /// Placeholders removed as duplicates of a new submission
    pub placeholders_removed: usize,
    /// Records that could not be validated
    pub skipped: usize,
    /// Non-nominations and untracked statuses
    pub ignored: usize,
}

impl ReconcileReport {
    /// Whether the candidate set was mutated
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Computes change events for submission batches
#[derive(Debug, Clone)]
pub struct Reconciler {
    table: StatusTable,
    thresholds: MatchThresholds,
    cell_level: u8,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(StatusTable::default(), MatchThresholds::default(), DEFAULT_CELL_LEVEL)
    }
}

impl Reconciler {
    pub fn new(table: StatusTable, thresholds: MatchThresholds, cell_level: u8) -> Self {
        Self {
            table,
            thresholds,
            cell_level,
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(
            StatusTable::for_version(config.status_table),
            MatchThresholds {
                same_title_meters: config.same_title_meters,
                cross_title_meters: config.cross_title_meters,
            },
            config.cell_level,
        )
    }

    pub fn cell_level(&self) -> u8 {
        self.cell_level
    }

    /// Runs one pass over `batch`, mutating `candidates` in place
    ///
    /// `nickname` is attached to every non-delete event.
    #[tracing::instrument(skip_all, fields(batch = batch.len()))]
    pub fn reconcile(
        &self,
        batch: &[RawSubmission],
        candidates: &mut CandidateSet,
        nickname: &str,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        // Anything the platform still reports is never a stale placeholder
        let current_ids: HashSet<&str> = batch.iter().filter_map(|raw| raw.id.as_deref()).collect();

        for raw in batch {
            if !raw.is_nomination() {
                debug!(id = raw.display_id(), kind = ?raw.record_type, "Ignoring non-nomination");
                report.ignored += 1;
                continue;
            }

            let submission = match Submission::try_from(raw.clone()) {
                Ok(submission) => submission,
                Err(e) => {
                    warn!(id = raw.display_id(), error = %e, "Skipping malformed submission");
                    report.skipped += 1;
                    continue;
                }
            };

            if candidates.contains(&submission.id) {
                self.reconcile_known(&submission, candidates, nickname, &mut report);
            } else if submission.status.is_trackable() {
                self.remove_placeholders(&submission, &current_ids, candidates, &mut report);
                self.create(&submission, candidates, nickname, &mut report);
            } else {
                debug!(id = %submission.id, status = %submission.status, "Ignoring untracked submission");
                report.ignored += 1;
            }
        }

        info!(
            events = report.events.len(),
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            placeholders_removed = report.placeholders_removed,
            skipped = report.skipped,
            "Reconciliation pass complete"
        );
        report
    }

    fn reconcile_known(
        &self,
        submission: &Submission,
        candidates: &mut CandidateSet,
        nickname: &str,
        report: &mut ReconcileReport,
    ) {
        if submission.status.is_accepted() {
            candidates.remove(&submission.id);
            debug!(id = %submission.id, "Accepted, removing from planner");
            report.events.push(ChangeEvent::delete(submission.id.clone()));
            report.deleted += 1;
            return;
        }

        let status = self.table.normalize(&submission.status);
        let Some(record) = candidates.get_mut(&submission.id) else {
            return;
        };

        let status_changed = record.status != status;
        let text_changed =
            record.title != submission.title || record.description != submission.description;
        if !status_changed && !text_changed {
            return;
        }

        debug!(
            id = %submission.id,
            from = %record.status,
            to = %status,
            text_changed,
            "Updating candidate"
        );
        record.status = status;
        record.title = submission.title.clone();
        record.description = submission.description.clone();

        report.events.push(ChangeEvent::status(
            submission.id.clone(),
            status,
            payload(submission, nickname),
        ));
        report.updated += 1;
    }

    fn create(
        &self,
        submission: &Submission,
        candidates: &mut CandidateSet,
        nickname: &str,
        report: &mut ReconcileReport,
    ) {
        let status = self.table.normalize(&submission.status);
        let record = CandidateRecord::new(
            submission.location,
            submission.title.clone(),
            submission.description.clone(),
            status,
            self.cell_level,
        );
        debug!(id = %submission.id, %status, cell = %record.cell_id, "New candidate");
        candidates.insert(submission.id.clone(), record);

        report.events.push(ChangeEvent::status(
            submission.id.clone(),
            status,
            payload(submission, nickname),
        ));
        report.created += 1;
    }

    /// Deletes `potential` rows that a new submission supersedes
    fn remove_placeholders(
        &self,
        submission: &Submission,
        current_ids: &HashSet<&str>,
        candidates: &mut CandidateSet,
        report: &mut ReconcileReport,
    ) {
        let cell = cell_id(submission.location, self.cell_level);
        let mut matches = self.placeholder_matches(submission, cell, current_ids, candidates);
        matches.sort();

        for id in matches {
            candidates.remove(&id);
            info!(placeholder = %id, submission = %submission.id, "Removing duplicate placeholder");
            report.events.push(ChangeEvent::delete(id));
            report.placeholders_removed += 1;
        }
    }

    fn placeholder_matches(
        &self,
        submission: &Submission,
        cell: CellId,
        current_ids: &HashSet<&str>,
        candidates: &CandidateSet,
    ) -> Vec<String> {
        candidates
            .iter()
            .filter(|(id, record)| {
                !current_ids.contains(id.as_str())
                    && record.is_placeholder()
                    && self.cell_of(record) == cell
            })
            .filter(|(_, record)| {
                let distance = distance_meters(submission.location, record.location());
                self.thresholds
                    .matches(record.title == submission.title, distance)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The record's cell at this reconciler's level
    ///
    /// Records cached before `cell_level` changed carry a cell of another
    /// level, which never equals a freshly computed one.
    fn cell_of(&self, record: &CandidateRecord) -> CellId {
        if record.cell_id.level() == self.cell_level {
            record.cell_id
        } else {
            cell_id(record.location(), self.cell_level)
        }
    }
}

fn payload(submission: &Submission, nickname: &str) -> EventPayload {
    let GeoPoint { lat, lng } = submission.location;
    EventPayload {
        lat,
        lng,
        title: submission.title.clone(),
        description: submission.description.clone(),
        submitted_date: submission.submitted_date.clone(),
        image_url: submission.image_url.clone(),
        author_nickname: nickname.to_string(),
    }
}
