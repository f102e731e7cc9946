//! Repository - coordinates histories, names and the checkout state machine

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VersionControlError};
use crate::extractor::{ExtractorRegistry, StateExtractor};
use crate::history::VersionHistory;
use crate::ids::{self, HistoryId, VersionId};
use crate::info::{ResourceStatus, Sticky, VersionInfo};
use crate::log::{LogAction, LogEntry};
use crate::names::NameRegistry;
use crate::resource::{CallContext, Resource};
use crate::selector::{self, Position};
use crate::MAINLINE;

/// Configuration for a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Log message for the first checkin when none is given
    pub initial_checkin_message: String,
    /// History ids are drawn from `1..=history_id_ceiling`
    pub history_id_ceiling: u64,
    /// Version ids are drawn from `1..=version_id_ceiling`
    pub version_id_ceiling: u64,
    /// Directory used by `RepositoryStore`
    pub storage_dir: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            initial_checkin_message: "Initial checkin.".to_string(),
            history_id_ceiling: 9_999_999_999,
            version_id_ceiling: 9_999_999_999,
            storage_dir: PathBuf::from(".lineage/repository"),
        }
    }
}

/// Registry of version histories and the public version control API
pub struct Repository {
    config: RepositoryConfig,
    histories: BTreeMap<HistoryId, VersionHistory>,
    names: NameRegistry,
    extractors: ExtractorRegistry,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("histories", &self.histories.keys().collect::<Vec<_>>())
            .field("names", &self.names)
            .field("extractors", &self.extractors)
            .finish()
    }
}

impl Repository {
    /// Create an empty repository
    pub fn new(config: RepositoryConfig) -> Self {
        Self::from_parts(config, NameRegistry::new(), Vec::new())
    }

    /// Rebuild a repository from stored parts
    pub fn from_parts(
        config: RepositoryConfig,
        names: NameRegistry,
        histories: impl IntoIterator<Item = VersionHistory>,
    ) -> Self {
        Self {
            config,
            histories: histories.into_iter().map(|h| (h.id().clone(), h)).collect(),
            names,
            extractors: ExtractorRegistry::new(),
        }
    }

    /// Register a custom state extractor for a resource type
    pub fn register_extractor(&mut self, type_name: impl Into<String>, extractor: Arc<dyn StateExtractor>) {
        self.extractors.register(type_name, extractor);
    }

    /// Get the repository configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Get the repository-wide name reservations
    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    /// Get a version history by id
    pub fn history(&self, history_id: &HistoryId) -> Result<&VersionHistory> {
        self.histories
            .get(history_id)
            .ok_or_else(|| VersionControlError::HistoryNotFound(history_id.clone()))
    }

    fn history_mut(&mut self, history_id: &HistoryId) -> Result<&mut VersionHistory> {
        self.histories
            .get_mut(history_id)
            .ok_or_else(|| VersionControlError::HistoryNotFound(history_id.clone()))
    }

    /// Iterate over all histories
    pub fn histories(&self) -> impl Iterator<Item = &VersionHistory> {
        self.histories.values()
    }

    /// Number of histories in the repository
    pub fn history_count(&self) -> usize {
        self.histories.len()
    }

    // === Queries ===

    /// Whether the resource may be placed under version control
    pub fn is_versionable(&self, resource: &Resource) -> bool {
        resource.versionable
    }

    /// Whether the resource carries bookkeeping that refers to this repository
    pub fn is_under_version_control(&self, resource: &Resource) -> bool {
        resource.vc_info.as_ref().is_some_and(|info| {
            self.histories
                .get(&info.history_id)
                .is_some_and(|h| h.has_version_id(info.version_id.as_str()))
        })
    }

    /// Bookkeeping attached to the resource
    pub fn version_info<'r>(&self, resource: &'r Resource) -> Result<&'r VersionInfo> {
        bookkeeping(resource)
    }

    /// Whether the resource is the latest version on its active branch.
    ///
    /// With `require_branch`, a resource pinned to a version, label or date
    /// is never up to date.
    pub fn is_resource_up_to_date(&self, resource: &Resource, require_branch: bool) -> Result<bool> {
        let info = bookkeeping(resource)?;
        let history = self.history(&info.history_id)?;
        let branch = match &info.sticky {
            Some(Sticky::Branch(branch)) => branch.as_str(),
            Some(_) if require_branch => return Ok(false),
            _ => MAINLINE,
        };
        Ok(history.is_latest_version(&info.version_id, branch))
    }

    /// Whether the live versionable state differs from the recorded version
    pub fn is_resource_changed(&self, resource: &Resource) -> Result<bool> {
        let info = bookkeeping(resource)?;
        let version = self.history(&info.history_id)?.version(&info.version_id)?;
        let live = self.extractors.resolve(resource).capture(resource);
        Ok(live != version.snapshot)
    }

    // === Lifecycle ===

    /// Place a resource under version control, creating its history
    pub fn apply_version_control(
        &mut self,
        ctx: &CallContext,
        resource: &mut Resource,
        message: Option<&str>,
    ) -> Result<VersionId> {
        if self.is_under_version_control(resource) {
            return Err(VersionControlError::AlreadyUnderVersionControl);
        }
        if !self.is_versionable(resource) {
            return Err(VersionControlError::NotVersionable(resource.path.clone()));
        }
        if let Some(stale) = &resource.vc_info {
            warn!(
                history_id = %stale.history_id,
                path = %resource.path,
                "Replacing bookkeeping that refers to a missing history"
            );
        }

        // Follow the parent onto its branch
        let branch = ctx
            .parent_info
            .as_ref()
            .and_then(|p| p.sticky.as_ref())
            .and_then(Sticky::branch)
            .unwrap_or(MAINLINE)
            .to_string();

        let snapshot = self.extractors.resolve(resource).capture(resource);

        let histories = &self.histories;
        let history_id: HistoryId =
            ids::allocate("history", self.config.history_id_ceiling, |c| histories.contains_key(c))?;
        debug!(history_id = %history_id, "Allocated history id");

        let mut history = VersionHistory::new(history_id.clone(), self.config.version_id_ceiling);
        if branch != MAINLINE {
            history.create_root_branch(&branch)?;
        }
        let version_id = history.create_version(snapshot, &branch)?.id.clone();

        let message = message.unwrap_or(self.config.initial_checkin_message.as_str());
        history.add_log_entry(LogEntry::new(
            version_id.clone(),
            &ctx.actor_id,
            LogAction::Checkin,
            &resource.path,
            Some(message.to_string()),
        ));
        self.histories.insert(history_id.clone(), history);

        let mut info = VersionInfo::new(history_id.clone(), version_id.clone(), &ctx.actor_id);
        if branch != MAINLINE {
            info.sticky = Some(Sticky::Branch(branch.clone()));
        }
        resource.vc_info = Some(info);

        info!(
            history_id = %history_id,
            version_id = %version_id,
            branch = %branch,
            path = %resource.path,
            actor = %ctx.actor_id,
            "Applied version control"
        );

        Ok(version_id)
    }

    /// Check out a checked-in resource for editing
    pub fn checkout_resource(&mut self, ctx: &CallContext, resource: &mut Resource) -> Result<()> {
        let info = bookkeeping(resource)?;
        if info.status != ResourceStatus::CheckedIn {
            return Err(VersionControlError::NotCheckedIn(
                "the selected resource is already checked out".to_string(),
            ));
        }
        self.require_branch_and_up_to_date(resource, "checked out")?;

        let info = info.clone();
        self.history_mut(&info.history_id)?.add_log_entry(LogEntry::new(
            info.version_id.clone(),
            &ctx.actor_id,
            LogAction::Checkout,
            &resource.path,
            None,
        ));

        let mut next = info.successor(&ctx.actor_id);
        next.status = ResourceStatus::CheckedOut;
        resource.vc_info = Some(next);

        info!(
            history_id = %info.history_id,
            version_id = %info.version_id,
            path = %resource.path,
            actor = %ctx.actor_id,
            "Checked out resource"
        );
        Ok(())
    }

    /// Record the live state of a checked-out resource as a new version
    pub fn checkin_resource(
        &mut self,
        ctx: &CallContext,
        resource: &mut Resource,
        message: &str,
    ) -> Result<VersionId> {
        let info = bookkeeping(resource)?;
        if info.status != ResourceStatus::CheckedOut {
            return Err(VersionControlError::NotCheckedOut(resource.path.clone()));
        }
        self.require_branch_and_up_to_date(resource, "checked in")?;

        let info = info.clone();
        let branch = info.active_branch().to_string();
        let snapshot = self.extractors.resolve(resource).capture(resource);
        let size = snapshot.estimated_size();

        let history = self.history_mut(&info.history_id)?;
        let version_id = history.create_version(snapshot, &branch)?.id.clone();
        history.add_log_entry(LogEntry::new(
            version_id.clone(),
            &ctx.actor_id,
            LogAction::Checkin,
            &resource.path,
            Some(message.to_string()),
        ));

        let mut next = info.successor(&ctx.actor_id);
        next.version_id = version_id.clone();
        next.status = ResourceStatus::CheckedIn;
        resource.vc_info = Some(next);

        info!(
            history_id = %info.history_id,
            version_id = %version_id,
            prev = %info.version_id,
            branch = %branch,
            path = %resource.path,
            actor = %ctx.actor_id,
            size = size,
            "Checked in resource"
        );
        Ok(version_id)
    }

    /// Discard live edits, restoring the last checked-in version
    pub fn uncheckout_resource(&mut self, ctx: &CallContext, resource: &mut Resource) -> Result<()> {
        let info = bookkeeping(resource)?.clone();
        if info.status != ResourceStatus::CheckedOut {
            return Err(VersionControlError::NotCheckedOut(resource.path.clone()));
        }

        let version = self.history(&info.history_id)?.version(&info.version_id)?;
        self.extractors
            .resolve(resource)
            .replace_state(resource, &version.snapshot)?;

        self.history_mut(&info.history_id)?.add_log_entry(LogEntry::new(
            info.version_id.clone(),
            &ctx.actor_id,
            LogAction::Uncheckout,
            &resource.path,
            None,
        ));

        let mut next = info.successor(&ctx.actor_id);
        next.status = ResourceStatus::CheckedIn;
        resource.vc_info = Some(next);

        info!(
            history_id = %info.history_id,
            version_id = %info.version_id,
            path = %resource.path,
            actor = %ctx.actor_id,
            "Reverted checked-out resource"
        );
        Ok(())
    }

    /// Move a checked-in resource to the version named by `selector`
    pub fn update_resource(
        &mut self,
        ctx: &CallContext,
        resource: &mut Resource,
        selector: Option<&str>,
    ) -> Result<VersionId> {
        let info = bookkeeping(resource)?.clone();
        if info.status != ResourceStatus::CheckedIn {
            return Err(VersionControlError::NotCheckedIn(
                "the selected resource must be checked in to be updated".to_string(),
            ));
        }

        let history = self.history(&info.history_id)?;
        let position = Position {
            version_id: &info.version_id,
            sticky: info.sticky.as_ref(),
        };
        let resolution = selector::resolve(history, &self.names, Some(position), selector)?;
        let target_id = resolution.version.id.clone();
        let sticky = resolution.sticky;

        if target_id != info.version_id {
            self.extractors
                .resolve(resource)
                .replace_state(resource, &resolution.version.snapshot)?;

            self.history_mut(&info.history_id)?.add_log_entry(LogEntry::new(
                target_id.clone(),
                &ctx.actor_id,
                LogAction::Update,
                &resource.path,
                None,
            ));

            info!(
                history_id = %info.history_id,
                version_id = %target_id,
                prev = %info.version_id,
                path = %resource.path,
                actor = %ctx.actor_id,
                "Updated resource"
            );
        } else {
            debug!(
                history_id = %info.history_id,
                version_id = %target_id,
                "Resource already at selected version"
            );
        }

        let mut next = info.successor(&ctx.actor_id);
        next.version_id = target_id.clone();
        next.status = ResourceStatus::CheckedIn;
        next.sticky = sticky;
        resource.vc_info = Some(next);

        Ok(target_id)
    }

    /// Apply `label` to the resource's current version
    pub fn label_resource(
        &mut self,
        ctx: &CallContext,
        resource: &Resource,
        label: &str,
        force: bool,
    ) -> Result<()> {
        let info = bookkeeping(resource)?;
        if info.status != ResourceStatus::CheckedIn {
            return Err(VersionControlError::NotCheckedIn(
                "the selected resource must be checked in to be labeled".to_string(),
            ));
        }
        self.names.check_label(label)?;

        self.history_mut(&info.history_id)?
            .label_version(&info.version_id, label, force)?;
        if self.names.reserve_label(label)? {
            debug!(label = label, "Reserved label name");
        }

        info!(
            history_id = %info.history_id,
            version_id = %info.version_id,
            label = label,
            path = %resource.path,
            actor = %ctx.actor_id,
            "Labeled version"
        );
        Ok(())
    }

    /// Fork a branch off the resource's current version
    pub fn make_activity(&mut self, ctx: &CallContext, resource: &Resource, branch_id: &str) -> Result<()> {
        let info = bookkeeping(resource)?;
        if info.status != ResourceStatus::CheckedIn {
            return Err(VersionControlError::NotCheckedIn(
                "the selected resource must be checked in".to_string(),
            ));
        }
        self.names.check_branch(branch_id)?;

        self.history_mut(&info.history_id)?
            .create_branch(branch_id, &info.version_id)?;
        if self.names.reserve_branch(branch_id)? {
            debug!(branch = branch_id, "Reserved branch name");
        }

        info!(
            history_id = %info.history_id,
            version_id = %info.version_id,
            branch = branch_id,
            path = %resource.path,
            actor = %ctx.actor_id,
            "Created branch"
        );
        Ok(())
    }

    // === Read-only passthroughs ===

    /// Detached copy of the version `selector` names in a history
    pub fn version_of_resource(&self, history_id: &HistoryId, selector: Option<&str>) -> Result<Resource> {
        let history = self.history(history_id)?;
        let resolution = selector::resolve(history, &self.names, None, selector)?;

        let mut copy = resolution.version.snapshot.to_resource(history_id.as_str(), "");
        let mut info = VersionInfo::new(history_id.clone(), resolution.version.id.clone(), "");
        info.sticky = resolution.sticky;
        copy.vc_info = Some(info);
        Ok(copy)
    }

    pub fn version_ids(&self, resource: &Resource) -> Result<Vec<VersionId>> {
        Ok(self.history(&bookkeeping(resource)?.history_id)?.version_ids())
    }

    pub fn labels_for_resource(&self, resource: &Resource) -> Result<Vec<String>> {
        Ok(self.history(&bookkeeping(resource)?.history_id)?.labels())
    }

    /// Labels pointing at the resource's current version
    pub fn labels_for_version(&self, resource: &Resource) -> Result<Vec<String>> {
        let info = bookkeeping(resource)?;
        Ok(self.history(&info.history_id)?.labels_for_version(&info.version_id))
    }

    /// Audit records for the resource's history, most recent first
    pub fn log_entries(&self, resource: &Resource) -> Result<Vec<LogEntry>> {
        Ok(self.history(&bookkeeping(resource)?.history_id)?.log_entries())
    }

    // === Private Methods ===

    fn require_branch_and_up_to_date(&self, resource: &Resource, action: &str) -> Result<()> {
        let info = bookkeeping(resource)?;
        if info.sticky.as_ref().is_some_and(|s| s.branch().is_none()) {
            return Err(VersionControlError::StickyConflict(format!(
                "resource must be on the mainline or a branch to be {}",
                action
            )));
        }
        if !self.is_resource_up_to_date(resource, false)? {
            return Err(VersionControlError::NotUpToDate(resource.path.clone()));
        }
        Ok(())
    }
}

fn bookkeeping(resource: &Resource) -> Result<&VersionInfo> {
    resource
        .vc_info
        .as_ref()
        .ok_or_else(|| VersionControlError::NotUnderVersionControl(resource.path.clone()))
}

/// Repository shared between threads.
///
/// Every operation holds the write lock for its whole duration, so id
/// allocation and name reservation never interleave.
#[derive(Clone)]
pub struct SharedRepository {
    inner: Arc<RwLock<Repository>>,
}

impl SharedRepository {
    pub fn new(repository: Repository) -> Self {
        Self {
            inner: Arc::new(RwLock::new(repository)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Repository> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Repository> {
        self.inner.write()
    }
}
