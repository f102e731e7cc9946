//! Audit log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::VersionId;

/// Lifecycle action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    Checkin,
    Checkout,
    Uncheckout,
    Update,
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogAction::Checkin => "checkin",
            LogAction::Checkout => "checkout",
            LogAction::Uncheckout => "uncheckout",
            LogAction::Update => "update",
        };
        f.write_str(s)
    }
}

/// Immutable audit record of one lifecycle action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub version_id: VersionId,
    pub actor_id: String,
    pub action: LogAction,
    /// Resource location at the time of the action
    pub path: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        version_id: VersionId,
        actor_id: impl Into<String>,
        action: LogAction,
        path: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            version_id,
            actor_id: actor_id.into(),
            action,
            path: path.into(),
            message: message.filter(|m| !m.is_empty()),
            timestamp: Utc::now(),
        }
    }

    /// One-line description
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => format!("{} {} by {}: {}", self.action, self.version_id, self.actor_id, message),
            None => format!("{} {} by {}", self.action, self.version_id, self.actor_id),
        }
    }
}
