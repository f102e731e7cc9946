//! Version control error types

use thiserror::Error;

use crate::ids::{HistoryId, VersionId};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VersionControlError>;

/// Errors that can occur in version control operations
#[derive(Debug, Error)]
pub enum VersionControlError {
    /// The resource already carries valid bookkeeping
    #[error("The resource is already under version control")]
    AlreadyUnderVersionControl,

    /// The resource cannot be placed under version control
    #[error("This resource cannot be put under version control: {0}")]
    NotVersionable(String),

    /// The resource carries no bookkeeping
    #[error("The specified resource is not under version control: {0}")]
    NotUnderVersionControl(String),

    /// Operation requires a checked-in resource
    #[error("The selected resource must be checked in: {0}")]
    NotCheckedIn(String),

    /// Operation requires a checked-out resource
    #[error("The selected resource is not checked out: {0}")]
    NotCheckedOut(String),

    /// Resource is pinned to a version, label or date
    #[error(
        "The selected resource has been updated to a particular version, label or date. \
         It must be updated to the mainline or a branch first: {0}"
    )]
    StickyConflict(String),

    /// Resource is not the latest version on its branch
    #[error("The selected resource is not up to date: {0}")]
    NotUpToDate(String),

    /// Selector matched nothing, or resolved to nothing
    #[error("Invalid version selector: {0}")]
    InvalidSelector(String),

    /// Label or branch name clashes with the other namespace or "mainline"
    #[error("Name already in use: {0}")]
    NamespaceCollision(String),

    /// This history already has a branch of that id
    #[error("The resource is already associated with branch: {0}")]
    BranchAlreadyExists(String),

    /// Label points at another version and force was not given
    #[error("Label {label} is already applied to version {version_id}")]
    LabelInUse { label: String, version_id: VersionId },

    /// Structural type changed between snapshot and live resource
    #[error("The type of the versioned resource has changed: {live} != {snapshot}")]
    ClassMismatch { live: String, snapshot: String },

    /// Label or branch name is empty
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// History id not present in the repository
    #[error("Version history not found: {0}")]
    HistoryNotFound(HistoryId),

    /// Version id not present in the history
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    /// Every id below the configured ceiling is in use
    #[error("Id space exhausted: {0}")]
    IdSpaceExhausted(String),

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VersionControlError {
    /// Stable sub-reason code for host-side mapping
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AlreadyUnderVersionControl => "already_under_version_control",
            Self::NotVersionable(_) => "not_versionable",
            Self::NotUnderVersionControl(_) => "not_under_version_control",
            Self::NotCheckedIn(_) => "not_checked_in",
            Self::NotCheckedOut(_) => "not_checked_out",
            Self::StickyConflict(_) => "sticky_conflict",
            Self::NotUpToDate(_) => "not_up_to_date",
            Self::InvalidSelector(_) => "invalid_selector",
            Self::NamespaceCollision(_) => "namespace_collision",
            Self::BranchAlreadyExists(_) => "branch_already_exists",
            Self::LabelInUse { .. } => "label_in_use",
            Self::ClassMismatch { .. } => "class_mismatch",
            Self::InvalidName(_) => "invalid_name",
            Self::HistoryNotFound(_) => "history_not_found",
            Self::VersionNotFound(_) => "version_not_found",
            Self::IdSpaceExhausted(_) => "id_space_exhausted",
            Self::StorageError(_) => "storage_error",
            Self::IoError(_) => "io_error",
        }
    }
}
