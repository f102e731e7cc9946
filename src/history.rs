//! Version history: the branch-structured lineage of one resource
//!
//! Versions live in an arena keyed by id; `prev`/`next` and branch origins
//! are plain id references into it. Each branch keeps its own timeline:
//! creation order plus a coarse time-bucket index used for date selection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VersionControlError};
use crate::ids::{self, HistoryId, VersionId};
use crate::log::LogEntry;
use crate::version::{Snapshot, Version};
use crate::MAINLINE;

/// Width of a date-index bucket. A later version in the same bucket
/// replaces an earlier one in the index.
pub const DATE_BUCKET_SECS: i64 = 60;

fn bucket(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(DATE_BUCKET_SECS)
}

/// Per-branch timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchTimeline {
    /// Version the branch forked from; `None` for mainline
    pub origin: Option<VersionId>,
    /// Versions created on this branch, oldest first
    pub order: Vec<VersionId>,
    /// Time bucket to the last version created in it
    pub by_time: BTreeMap<i64, VersionId>,
}

impl BranchTimeline {
    fn forked_from(origin: Option<VersionId>) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Latest own version, falling back to the origin
    pub fn tip(&self) -> Option<&VersionId> {
        self.order.last().or(self.origin.as_ref())
    }
}

/// All versions of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistory {
    id: HistoryId,
    versions: BTreeMap<VersionId, Version>,
    branches: BTreeMap<String, BranchTimeline>,
    labels: BTreeMap<String, VersionId>,
    /// Append order, oldest first
    log: Vec<LogEntry>,
    version_id_ceiling: u64,
}

impl VersionHistory {
    /// Create an empty history with a mainline branch
    pub fn new(id: HistoryId, version_id_ceiling: u64) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(MAINLINE.to_string(), BranchTimeline::forked_from(None));
        Self {
            id,
            versions: BTreeMap::new(),
            branches,
            labels: BTreeMap::new(),
            log: Vec::new(),
            version_id_ceiling,
        }
    }

    /// Get the history id
    pub fn id(&self) -> &HistoryId {
        &self.id
    }

    /// Record a new version at the tip of `branch`
    pub fn create_version(&mut self, snapshot: Snapshot, branch: &str) -> Result<&Version> {
        self.create_version_at(snapshot, branch, Utc::now())
    }

    /// Record a new version at the tip of `branch` with an explicit creation time
    pub fn create_version_at(
        &mut self,
        snapshot: Snapshot,
        branch: &str,
        created_at: DateTime<Utc>,
    ) -> Result<&Version> {
        self.timeline(branch)?;

        let versions = &self.versions;
        let id: VersionId = ids::allocate("version", self.version_id_ceiling, |c| versions.contains_key(c))?;

        let timeline = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| VersionControlError::InvalidSelector(format!("branch {} does not exist", branch)))?;
        let prev = timeline.tip().cloned();
        timeline.order.push(id.clone());
        timeline.by_time.insert(bucket(created_at), id.clone());

        if let Some(prev_id) = &prev {
            if let Some(prev_version) = self.versions.get_mut(prev_id) {
                prev_version.next.push(id.clone());
            }
        }

        debug!(
            history_id = %self.id,
            version_id = %id,
            branch = branch,
            prev = ?prev,
            "Created version"
        );

        let version = Version {
            id: id.clone(),
            branch: branch.to_string(),
            prev,
            next: Vec::new(),
            created_at,
            snapshot,
        };
        Ok(&*self.versions.entry(id).or_insert(version))
    }

    /// Start a branch with no origin, for a history created directly on
    /// a non-mainline branch
    pub(crate) fn create_root_branch(&mut self, branch_id: &str) -> Result<()> {
        if branch_id.is_empty() {
            return Err(VersionControlError::InvalidName(branch_id.to_string()));
        }
        if self.branches.contains_key(branch_id) {
            return Err(VersionControlError::BranchAlreadyExists(branch_id.to_string()));
        }
        self.branches
            .insert(branch_id.to_string(), BranchTimeline::forked_from(None));
        debug!(history_id = %self.id, branch = branch_id, "Created root branch");
        Ok(())
    }

    /// Fork a new branch off an existing version
    pub fn create_branch(&mut self, branch_id: &str, origin: &VersionId) -> Result<()> {
        if self.branches.contains_key(branch_id) {
            return Err(VersionControlError::BranchAlreadyExists(branch_id.to_string()));
        }
        if !self.versions.contains_key(origin) {
            return Err(VersionControlError::VersionNotFound(origin.clone()));
        }
        self.branches.insert(
            branch_id.to_string(),
            BranchTimeline::forked_from(Some(origin.clone())),
        );
        Ok(())
    }

    /// Whether this history has a branch named `branch_id`
    pub fn has_branch(&self, branch_id: &str) -> bool {
        self.branches.contains_key(branch_id)
    }

    /// Get all branch names, mainline included
    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.keys().map(String::as_str).collect()
    }

    /// Get the timeline of a branch
    pub fn branch(&self, branch_id: &str) -> Option<&BranchTimeline> {
        self.branches.get(branch_id)
    }

    fn timeline(&self, branch: &str) -> Result<&BranchTimeline> {
        self.branches.get(branch).ok_or_else(|| {
            VersionControlError::InvalidSelector(format!(
                "branch {} does not exist in history {}",
                branch, self.id
            ))
        })
    }

    /// Latest version on `branch`, or its origin if it has none of its own
    pub fn latest_version(&self, branch: &str) -> Result<&Version> {
        let timeline = self.timeline(branch)?;
        let id = timeline.tip().ok_or_else(|| {
            VersionControlError::InvalidSelector(format!("branch {} has no versions", branch))
        })?;
        self.version(id)
    }

    /// Whether `version_id` is the latest version on `branch`
    pub fn is_latest_version(&self, version_id: &VersionId, branch: &str) -> bool {
        self.latest_version(branch)
            .map(|v| &v.id == version_id)
            .unwrap_or(false)
    }

    /// Version current on `branch` at `timestamp`.
    ///
    /// Takes the newest bucket at or before `timestamp` on the branch. A
    /// branch with nothing that early defers to the branch it forked from,
    /// with the cutoff clamped to the fork point.
    pub fn version_by_date(&self, branch: &str, timestamp: DateTime<Utc>) -> Result<&Version> {
        let mut branch = branch.to_string();
        let mut cutoff = timestamp;

        loop {
            let timeline = self.timeline(&branch)?;
            if let Some((_, id)) = timeline.by_time.range(..=bucket(cutoff)).next_back() {
                return self.version(id);
            }

            let Some(origin_id) = &timeline.origin else {
                return Err(VersionControlError::InvalidSelector(format!(
                    "no version exists at or before {}",
                    timestamp.to_rfc3339()
                )));
            };
            let origin = self.version(origin_id)?;

            debug!(
                history_id = %self.id,
                from = %branch,
                to = %origin.branch,
                "Date lookup crossing branch point"
            );
            cutoff = cutoff.min(origin.created_at);
            branch = origin.branch.clone();
        }
    }

    /// Point `label` at `version_id`, moving it only when `force` is set
    pub fn label_version(&mut self, version_id: &VersionId, label: &str, force: bool) -> Result<()> {
        if !self.versions.contains_key(version_id) {
            return Err(VersionControlError::VersionNotFound(version_id.clone()));
        }
        if let Some(current) = self.labels.get(label) {
            if current == version_id {
                return Ok(());
            }
            if !force {
                return Err(VersionControlError::LabelInUse {
                    label: label.to_string(),
                    version_id: current.clone(),
                });
            }
        }
        self.labels.insert(label.to_string(), version_id.clone());
        Ok(())
    }

    /// Get the version `label` points at
    pub fn version_by_label(&self, label: &str) -> Result<&Version> {
        let id = self.labels.get(label).ok_or_else(|| {
            VersionControlError::InvalidSelector(format!(
                "label {} is not applied in history {}",
                label, self.id
            ))
        })?;
        self.version(id)
    }

    /// Whether a version with this id exists
    pub fn has_version_id(&self, version_id: &str) -> bool {
        self.versions.contains_key(version_id)
    }

    /// Get a version by id
    pub fn version(&self, version_id: &VersionId) -> Result<&Version> {
        self.versions
            .get(version_id)
            .ok_or_else(|| VersionControlError::VersionNotFound(version_id.clone()))
    }

    /// All version ids, oldest first
    pub fn version_ids(&self) -> Vec<VersionId> {
        let mut versions: Vec<&Version> = self.versions.values().collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        versions.into_iter().map(|v| v.id.clone()).collect()
    }

    /// Number of versions in the history
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Label names applied in this history
    pub fn labels(&self) -> Vec<String> {
        self.labels.keys().cloned().collect()
    }

    /// Labels currently pointing at `version_id`
    pub fn labels_for_version(&self, version_id: &VersionId) -> Vec<String> {
        self.labels
            .iter()
            .filter(|(_, target)| *target == version_id)
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Branch that owns `version_id`
    pub fn find_branch_id(&self, version_id: &VersionId) -> Result<&str> {
        Ok(self.version(version_id)?.branch.as_str())
    }

    /// Append an audit record
    pub fn add_log_entry(&mut self, entry: LogEntry) {
        debug!(history_id = %self.id, entry = %entry.summary(), "Recorded log entry");
        self.log.push(entry);
    }

    /// Audit records, most recent first
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.iter().rev().cloned().collect()
    }

    /// Check internal references after loading from storage
    pub fn validate(&self) -> Result<()> {
        let broken = |what: String| {
            Err(VersionControlError::StorageError(format!(
                "history {} is inconsistent: {}",
                self.id, what
            )))
        };

        match self.branches.get(MAINLINE) {
            Some(timeline) if timeline.origin.is_none() => {}
            Some(_) => return broken("mainline has an origin".to_string()),
            None => return broken("mainline is missing".to_string()),
        }
        for version in self.versions.values() {
            if !self.branches.contains_key(&version.branch) {
                return broken(format!("version {} on unknown branch {}", version.id, version.branch));
            }
        }
        for (name, timeline) in &self.branches {
            if let Some(origin) = &timeline.origin {
                if !self.versions.contains_key(origin) {
                    return broken(format!("branch {} forks from missing version {}", name, origin));
                }
            }
        }
        for (label, target) in &self.labels {
            if !self.versions.contains_key(target) {
                return broken(format!("label {} targets missing version {}", label, target));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_created_at(&mut self, version_id: &VersionId, created_at: DateTime<Utc>) {
        let old = self.versions[version_id].created_at;
        let branch = self.versions[version_id].branch.clone();
        if let Some(timeline) = self.branches.get_mut(&branch) {
            if timeline.by_time.get(&bucket(old)) == Some(version_id) {
                timeline.by_time.remove(&bucket(old));
            }
            timeline.by_time.insert(bucket(created_at), version_id.clone());
        }
        if let Some(version) = self.versions.get_mut(version_id) {
            version.created_at = created_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn snap(n: i64) -> Snapshot {
        let mut attributes = BTreeMap::new();
        attributes.insert("n".to_string(), serde_json::Value::from(n));
        Snapshot {
            type_name: "Document".to_string(),
            attributes,
            children: Vec::new(),
            container: false,
        }
    }

    fn history() -> VersionHistory {
        VersionHistory::new(HistoryId::from("1"), 9_999_999_999)
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn add(h: &mut VersionHistory, branch: &str, minutes: i64) -> VersionId {
        h.create_version_at(snap(minutes), branch, t(minutes)).unwrap().id.clone()
    }

    // === Lineage Tests ===

    #[test]
    fn test_new_history_has_mainline() {
        let h = history();
        assert_eq!(h.branch_names(), vec!["mainline"]);
        assert!(h.latest_version(MAINLINE).is_err());
        assert_eq!(h.version_count(), 0);
    }

    #[test]
    fn test_create_version_links_lineage() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        let v2 = add(&mut h, MAINLINE, 5);

        assert_eq!(h.version(&v1).unwrap().prev, None);
        assert_eq!(h.version(&v1).unwrap().next, vec![v2.clone()]);
        assert_eq!(h.version(&v2).unwrap().prev, Some(v1.clone()));
        assert_eq!(h.latest_version(MAINLINE).unwrap().id, v2);
        assert!(h.is_latest_version(&v2, MAINLINE));
        assert!(!h.is_latest_version(&v1, MAINLINE));
        assert_eq!(h.version_ids(), vec![v1, v2]);
    }

    #[test]
    fn test_branch_falls_back_to_origin() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.create_branch("bugfix", &v1).unwrap();

        assert_eq!(h.latest_version("bugfix").unwrap().id, v1);

        let b1 = add(&mut h, "bugfix", 1);
        let version = h.version(&b1).unwrap();
        assert_eq!(version.prev, Some(v1.clone()));
        assert_eq!(version.branch, "bugfix");
        assert_eq!(h.latest_version("bugfix").unwrap().id, b1);
        // Mainline tip untouched
        assert_eq!(h.latest_version(MAINLINE).unwrap().id, v1);
        assert_eq!(h.find_branch_id(&b1).unwrap(), "bugfix");
    }

    #[test]
    fn test_fork_point_has_successors_on_both_branches() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.create_branch("bugfix", &v1).unwrap();
        let b1 = add(&mut h, "bugfix", 1);
        let v2 = add(&mut h, MAINLINE, 2);

        assert_eq!(h.version(&v1).unwrap().next, vec![b1, v2]);
    }

    #[test]
    fn test_create_branch_twice() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.create_branch("bugfix", &v1).unwrap();

        let err = h.create_branch("bugfix", &v1).unwrap_err();
        assert!(matches!(err, VersionControlError::BranchAlreadyExists(_)));
    }

    #[test]
    fn test_create_branch_missing_origin() {
        let mut h = history();
        let err = h.create_branch("bugfix", &VersionId::from("404")).unwrap_err();
        assert!(matches!(err, VersionControlError::VersionNotFound(_)));
        assert!(!h.has_branch("bugfix"));
    }

    #[test]
    fn test_unknown_branch_is_invalid_selector() {
        let h = history();
        let err = h.latest_version("nope").unwrap_err();
        assert!(matches!(err, VersionControlError::InvalidSelector(_)));
    }

    #[test]
    fn test_create_version_on_unknown_branch() {
        let mut h = history();
        add(&mut h, MAINLINE, 0);

        let err = h.create_version_at(snap(1), "bugfx", t(1)).unwrap_err();
        assert!(matches!(err, VersionControlError::InvalidSelector(_)));
        assert!(!h.has_branch("bugfx"));
        assert_eq!(h.version_count(), 1);
    }

    #[test]
    fn test_root_branch_has_no_origin() {
        let mut h = history();
        h.create_root_branch("bugfix").unwrap();
        assert!(h.latest_version("bugfix").is_err());

        let b1 = add(&mut h, "bugfix", 0);
        assert_eq!(h.version(&b1).unwrap().prev, None);
        assert_eq!(h.branch("bugfix").unwrap().origin, None);
        assert!(h.validate().is_ok());

        let err = h.create_root_branch("bugfix").unwrap_err();
        assert!(matches!(err, VersionControlError::BranchAlreadyExists(_)));
    }

    // === Label Tests ===

    #[test]
    fn test_label_version_and_move() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        let v2 = add(&mut h, MAINLINE, 1);

        h.label_version(&v1, "v1", false).unwrap();
        assert_eq!(h.version_by_label("v1").unwrap().id, v1);
        // Relabeling the same version is fine without force
        h.label_version(&v1, "v1", false).unwrap();

        let err = h.label_version(&v2, "v1", false).unwrap_err();
        assert!(matches!(err, VersionControlError::LabelInUse { .. }));
        assert_eq!(h.version_by_label("v1").unwrap().id, v1);

        h.label_version(&v2, "v1", true).unwrap();
        assert_eq!(h.version_by_label("v1").unwrap().id, v2);
        assert_eq!(h.labels_for_version(&v2), vec!["v1".to_string()]);
        assert!(h.labels_for_version(&v1).is_empty());
        assert_eq!(h.labels(), vec!["v1".to_string()]);
    }

    // === Date Lookup Tests ===

    #[test]
    fn test_version_by_date_on_mainline() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        let v2 = add(&mut h, MAINLINE, 10);
        let v3 = add(&mut h, MAINLINE, 20);

        assert_eq!(h.version_by_date(MAINLINE, t(0)).unwrap().id, v1);
        assert_eq!(h.version_by_date(MAINLINE, t(9)).unwrap().id, v1);
        assert_eq!(h.version_by_date(MAINLINE, t(10)).unwrap().id, v2);
        assert_eq!(h.version_by_date(MAINLINE, t(19)).unwrap().id, v2);
        assert_eq!(h.version_by_date(MAINLINE, t(500)).unwrap().id, v3);
    }

    #[test]
    fn test_version_by_date_before_first() {
        let mut h = history();
        add(&mut h, MAINLINE, 10);

        let err = h.version_by_date(MAINLINE, t(5)).unwrap_err();
        assert!(matches!(err, VersionControlError::InvalidSelector(_)));
    }

    #[test]
    fn test_same_bucket_last_wins() {
        let mut h = history();
        let base = t(0);
        h.create_version_at(snap(1), MAINLINE, base).unwrap();
        let later = h
            .create_version_at(snap(2), MAINLINE, base + Duration::seconds(30))
            .unwrap()
            .id
            .clone();

        // Asking for the earlier instant still yields the later version
        assert_eq!(h.version_by_date(MAINLINE, base).unwrap().id, later);
    }

    #[test]
    fn test_version_by_date_crosses_branch_point() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        let v2 = add(&mut h, MAINLINE, 10);
        h.create_branch("bugfix", &v2).unwrap();
        let _m3 = add(&mut h, MAINLINE, 15);
        let b1 = add(&mut h, "bugfix", 20);

        assert_eq!(h.version_by_date("bugfix", t(30)).unwrap().id, b1);
        // Before the branch's first version: fall back to the fork point
        assert_eq!(h.version_by_date("bugfix", t(17)).unwrap().id, v2);
        // Mainline versions after the fork are never visible from the branch
        assert_eq!(h.version_by_date("bugfix", t(19)).unwrap().id, v2);
        assert_eq!(h.version_by_date("bugfix", t(5)).unwrap().id, v1);
    }

    #[test]
    fn test_version_by_date_nested_branches() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.create_branch("a", &v1).unwrap();
        let a1 = add(&mut h, "a", 10);
        h.create_branch("b", &a1).unwrap();
        let b1 = add(&mut h, "b", 20);

        assert_eq!(h.version_by_date("b", t(25)).unwrap().id, b1);
        assert_eq!(h.version_by_date("b", t(15)).unwrap().id, a1);
        assert_eq!(h.version_by_date("b", t(5)).unwrap().id, v1);
        assert!(h.version_by_date("b", t(-5)).is_err());
    }

    #[test]
    fn test_set_created_at_reindexes() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.set_created_at(&v1, t(-1440));

        assert_eq!(h.version_by_date(MAINLINE, t(-1000)).unwrap().id, v1);
        assert_eq!(h.branch(MAINLINE).unwrap().by_time.len(), 1);
    }

    // === Log Tests ===

    #[test]
    fn test_log_entries_most_recent_first() {
        use crate::log::LogAction;

        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.add_log_entry(LogEntry::new(v1.clone(), "a", LogAction::Checkin, "/d", None));
        h.add_log_entry(LogEntry::new(v1.clone(), "a", LogAction::Checkout, "/d", None));

        let actions: Vec<_> = h.log_entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![LogAction::Checkout, LogAction::Checkin]);
    }

    // === Validation Tests ===

    #[test]
    fn test_validate_roundtrip_through_json() {
        let mut h = history();
        let v1 = add(&mut h, MAINLINE, 0);
        h.create_branch("bugfix", &v1).unwrap();
        add(&mut h, "bugfix", 1);
        h.label_version(&v1, "v1", false).unwrap();

        let json = serde_json::to_string(&h).unwrap();
        let parsed: VersionHistory = serde_json::from_str(&json).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.version_count(), 2);
        assert_eq!(parsed.latest_version("bugfix").unwrap().prev, Some(v1));
    }

    #[test]
    fn test_validate_detects_dangling_label() {
        let mut h = history();
        add(&mut h, MAINLINE, 0);
        h.labels.insert("ghost".to_string(), VersionId::from("404"));

        assert!(matches!(h.validate(), Err(VersionControlError::StorageError(_))));
    }
}
