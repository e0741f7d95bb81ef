//! Status taxonomies and the normalization table between them
//!
//! The review platform reports upper-case statuses ([`SubmissionStatus`]),
//! the planner stores lower-case ones ([`CandidateStatus`]). The mapping is
//! a many-to-one lookup kept in a [`StatusTable`] so it can be swapped as a
//! unit when the platform vocabulary changes.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// SubmissionStatus
// ============================================================================

/// Status of a submission as reported by the review platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    Nominated,
    Voting,
    Held,
    Appealed,
    NianticReview,
    Accepted,
    Rejected,
    Duplicate,
    Withdrawn,
    /// A value the platform sent that this build does not know
    Other(String),
}

impl SubmissionStatus {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::Nominated => "NOMINATED",
            SubmissionStatus::Voting => "VOTING",
            SubmissionStatus::Held => "HELD",
            SubmissionStatus::Appealed => "APPEALED",
            SubmissionStatus::NianticReview => "NIANTIC_REVIEW",
            SubmissionStatus::Accepted => "ACCEPTED",
            SubmissionStatus::Rejected => "REJECTED",
            SubmissionStatus::Duplicate => "DUPLICATE",
            SubmissionStatus::Withdrawn => "WITHDRAWN",
            SubmissionStatus::Other(raw) => raw,
        }
    }

    /// Statuses for which a previously unseen submission starts being tracked
    pub fn is_trackable(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Nominated
                | SubmissionStatus::Voting
                | SubmissionStatus::Held
                | SubmissionStatus::Appealed
                | SubmissionStatus::NianticReview
        )
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionStatus::Accepted)
    }
}

impl From<&str> for SubmissionStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NOMINATED" => SubmissionStatus::Nominated,
            "VOTING" => SubmissionStatus::Voting,
            "HELD" => SubmissionStatus::Held,
            "APPEALED" => SubmissionStatus::Appealed,
            "NIANTIC_REVIEW" => SubmissionStatus::NianticReview,
            "ACCEPTED" => SubmissionStatus::Accepted,
            "REJECTED" => SubmissionStatus::Rejected,
            "DUPLICATE" => SubmissionStatus::Duplicate,
            "WITHDRAWN" => SubmissionStatus::Withdrawn,
            _ => SubmissionStatus::Other(raw.to_string()),
        }
    }
}

impl Display for SubmissionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CandidateStatus
// ============================================================================

/// Normalized status stored in the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Submitted,
    Voting,
    Held,
    Appealed,
    NianticReview,
    Rejected,
    /// Placeholder typed into the planner with no matching submission yet
    Potential,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 7] = [
        CandidateStatus::Submitted,
        CandidateStatus::Voting,
        CandidateStatus::Held,
        CandidateStatus::Appealed,
        CandidateStatus::NianticReview,
        CandidateStatus::Rejected,
        CandidateStatus::Potential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Submitted => "submitted",
            CandidateStatus::Voting => "voting",
            CandidateStatus::Held => "held",
            CandidateStatus::Appealed => "appealed",
            CandidateStatus::NianticReview => "niantic_review",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Potential => "potential",
        }
    }
}

impl Display for CandidateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        CandidateStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// StatusTable
// ============================================================================

/// Selects which revision of the normalization table is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTableVersion {
    /// VOTING folds into `submitted`
    V1,
    /// VOTING has its own `voting` bucket
    #[default]
    V2,
}

/// Many-to-one lookup from platform status to planner status
///
/// Values missing from the table normalize to the table's default,
/// `submitted` for both shipped revisions.
#[derive(Debug, Clone)]
pub struct StatusTable {
    entries: HashMap<SubmissionStatus, CandidateStatus>,
    default: CandidateStatus,
}

impl StatusTable {
    /// Builds a table from explicit entries and a fallback
    pub fn new(
        entries: impl IntoIterator<Item = (SubmissionStatus, CandidateStatus)>,
        default: CandidateStatus,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            default,
        }
    }

    pub fn v1() -> Self {
        let mut table = Self::v2();
        table
            .entries
            .insert(SubmissionStatus::Voting, CandidateStatus::Submitted);
        table
    }

    pub fn v2() -> Self {
        Self::new(
            [
                (SubmissionStatus::Nominated, CandidateStatus::Submitted),
                (SubmissionStatus::Voting, CandidateStatus::Voting),
                (SubmissionStatus::Held, CandidateStatus::Held),
                (SubmissionStatus::Appealed, CandidateStatus::Appealed),
                (SubmissionStatus::NianticReview, CandidateStatus::NianticReview),
                (SubmissionStatus::Rejected, CandidateStatus::Rejected),
                (SubmissionStatus::Duplicate, CandidateStatus::Rejected),
                (SubmissionStatus::Withdrawn, CandidateStatus::Rejected),
            ],
            CandidateStatus::Submitted,
        )
    }

    pub fn for_version(version: StatusTableVersion) -> Self {
        match version {
            StatusTableVersion::V1 => Self::v1(),
            StatusTableVersion::V2 => Self::v2(),
        }
    }

    /// Planner status for a platform status
    pub fn normalize(&self, status: &SubmissionStatus) -> CandidateStatus {
        self.entries.get(status).copied().unwrap_or(self.default)
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::v2()
    }
}
