//! Bookkeeping carried by a live resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{HistoryId, VersionId};

/// Checkout status of a version-controlled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    CheckedIn,
    CheckedOut,
}

/// Pinned selection mode consulted by a bare update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Sticky {
    Version(VersionId),
    Label(String),
    Branch(String),
    Date(DateTime<Utc>),
}

impl Sticky {
    /// Branch name if this is a branch sticky
    pub fn branch(&self) -> Option<&str> {
        match self {
            Sticky::Branch(name) => Some(name),
            _ => None,
        }
    }
}

/// Version bookkeeping attached to a live resource.
///
/// Never mutated in place by the engine: every operation clones the current
/// record, edits the clone and swaps it onto the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub history_id: HistoryId,
    pub version_id: VersionId,
    pub status: ResourceStatus,
    pub sticky: Option<Sticky>,
    /// Actor whose operation produced this record
    pub actor_id: String,
    /// When this record was produced
    pub recorded_at: DateTime<Utc>,
}

impl VersionInfo {
    /// Fresh checked-in bookkeeping
    pub fn new(history_id: HistoryId, version_id: VersionId, actor_id: impl Into<String>) -> Self {
        Self {
            history_id,
            version_id,
            status: ResourceStatus::CheckedIn,
            sticky: None,
            actor_id: actor_id.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Clone for replacement, stamped with the acting identity
    pub fn successor(&self, actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            recorded_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_checked_in(&self) -> bool {
        self.status == ResourceStatus::CheckedIn
    }

    pub fn is_checked_out(&self) -> bool {
        self.status == ResourceStatus::CheckedOut
    }

    /// Branch whose tip this resource tracks
    pub fn active_branch(&self) -> &str {
        self.sticky
            .as_ref()
            .and_then(Sticky::branch)
            .unwrap_or(crate::MAINLINE)
    }
}
