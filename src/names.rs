//! Repository-wide label and branch name reservation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionControlError};
use crate::MAINLINE;

/// Disjoint sets of reserved label and branch names.
///
/// `mainline` is implicitly a branch name and can never be reserved as
/// either. Reservation says nothing about which histories use a name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameRegistry {
    branch_names: BTreeSet<String>,
    label_names: BTreeSet<String>,
}

impl NameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is a branch id, mainline included
    pub fn is_branch(&self, name: &str) -> bool {
        name == MAINLINE || self.branch_names.contains(name)
    }

    /// Whether `name` is a reserved label
    pub fn is_label(&self, name: &str) -> bool {
        self.label_names.contains(name)
    }

    /// Fail if `label` cannot be used as a label
    pub fn check_label(&self, label: &str) -> Result<()> {
        if label.is_empty() {
            return Err(VersionControlError::InvalidName(label.to_string()));
        }
        if self.is_branch(label) {
            return Err(VersionControlError::NamespaceCollision(format!(
                "{} is already in use as a branch id",
                label
            )));
        }
        Ok(())
    }

    /// Fail if `branch` cannot be used as a branch id
    pub fn check_branch(&self, branch: &str) -> Result<()> {
        if branch.is_empty() {
            return Err(VersionControlError::InvalidName(branch.to_string()));
        }
        if branch == MAINLINE || self.is_label(branch) {
            return Err(VersionControlError::NamespaceCollision(format!(
                "{} is already in use as a version label",
                branch
            )));
        }
        Ok(())
    }

    /// Check and reserve a label name; returns whether it was new
    pub fn reserve_label(&mut self, label: &str) -> Result<bool> {
        self.check_label(label)?;
        Ok(self.label_names.insert(label.to_string()))
    }

    /// Check and reserve a branch id; returns whether it was new
    pub fn reserve_branch(&mut self, branch: &str) -> Result<bool> {
        self.check_branch(branch)?;
        Ok(self.branch_names.insert(branch.to_string()))
    }

    /// Iterate over reserved branch ids
    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branch_names.iter().map(String::as_str)
    }

    /// Iterate over reserved labels
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.label_names.iter().map(String::as_str)
    }
}
