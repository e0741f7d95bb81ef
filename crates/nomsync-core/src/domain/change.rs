//! Change events emitted by reconciliation
//!
//! A [`ChangeEvent`] is one remote mutation against the planner. Applying
//! the same event twice leaves the planner in the same state, so the
//! delivery queue is free to retry it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::status::CandidateStatus;

/// Wire value of the `status` field for deletions
pub const DELETE_ACTION: &str = "delete";

/// Submission data carried by every non-delete event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub description: String,
    pub submitted_date: Option<String>,
    pub image_url: Option<String>,
    pub author_nickname: String,
}

/// What to do with the target row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeAction {
    /// Remove the row
    Delete,
    /// Create the row or set it to `status` with fresh data
    Status {
        status: CandidateStatus,
        payload: EventPayload,
    },
}

/// One remote mutation to apply against the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub target_id: String,
    #[serde(flatten)]
    pub action: ChangeAction,
}

impl ChangeEvent {
    pub fn delete(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            action: ChangeAction::Delete,
        }
    }

    pub fn status(target_id: impl Into<String>, status: CandidateStatus, payload: EventPayload) -> Self {
        Self {
            target_id: target_id.into(),
            action: ChangeAction::Status { status, payload },
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.action, ChangeAction::Delete)
    }

    /// `delete` or the normalized status name
    pub fn action_name(&self) -> &'static str {
        match &self.action {
            ChangeAction::Delete => DELETE_ACTION,
            ChangeAction::Status { status, .. } => status.as_str(),
        }
    }

    /// Fields of the sync endpoint request body, in wire order
    ///
    /// Deletions carry only `status` and `id`. Absent optional values are
    /// sent as empty strings.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("status", self.action_name().to_string()),
            ("id", self.target_id.clone()),
        ];

        if let ChangeAction::Status { payload, .. } = &self.action {
            fields.extend([
                ("lat", payload.lat.to_string()),
                ("lng", payload.lng.to_string()),
                ("title", payload.title.clone()),
                ("description", payload.description.clone()),
                (
                    "submitteddate",
                    payload.submitted_date.clone().unwrap_or_default(),
                ),
                (
                    "candidateimageurl",
                    payload.image_url.clone().unwrap_or_default(),
                ),
                ("nickname", payload.author_nickname.clone()),
            ]);
        }

        fields
    }
}

impl Display for ChangeEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action_name(), self.target_id)
    }
}
