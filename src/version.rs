//! Version and snapshot data structures

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::VersionId;
use crate::resource::Resource;

/// Type name of the stub standing in for a placeholder child
pub const PLACEHOLDER_TYPE: &str = "placeholder";

/// Captured versionable state of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Structural type at capture time
    pub type_name: String,
    /// Versioned attributes
    pub attributes: BTreeMap<String, Value>,
    /// Children in their original order
    pub children: Vec<SnapshotChild>,
    /// Whether the captured resource was a container
    #[serde(default)]
    pub container: bool,
}

/// A child slot in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotChild {
    /// Child state captured inline
    Captured { resource: Box<Resource> },
    /// Child managed outside this snapshot
    Placeholder { name: String },
}

impl SnapshotChild {
    pub fn name(&self) -> &str {
        match self {
            SnapshotChild::Captured { resource } => &resource.name,
            SnapshotChild::Placeholder { name } => name,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SnapshotChild::Placeholder { .. })
    }
}

impl Snapshot {
    /// Children captured inline, in order
    pub fn captured_children(&self) -> impl Iterator<Item = &Resource> {
        self.children.iter().filter_map(|c| match c {
            SnapshotChild::Captured { resource } => Some(resource.as_ref()),
            SnapshotChild::Placeholder { .. } => None,
        })
    }

    /// Materialize a detached resource from this snapshot.
    ///
    /// Placeholder slots come back as empty versionable stubs of type
    /// [`PLACEHOLDER_TYPE`], so capturing the copy again yields the same
    /// snapshot.
    pub fn to_resource(&self, name: impl Into<String>, path: impl Into<String>) -> Resource {
        let mut resource = Resource::new(name, self.type_name.clone(), path);
        resource.attributes = self.attributes.clone();
        resource.container = self.container;
        resource.children = self
            .children
            .iter()
            .map(|child| match child {
                SnapshotChild::Captured { resource } => resource.as_ref().clone(),
                SnapshotChild::Placeholder { name } => Resource::new(name.clone(), PLACEHOLDER_TYPE, ""),
            })
            .collect();
        resource
    }

    /// Estimate size in bytes
    pub fn estimated_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }
}

/// An immutable captured state of a resource plus its lineage pointers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    /// Branch the version was created on
    pub branch: String,
    /// Predecessor version
    pub prev: Option<VersionId>,
    /// Successor versions, in creation order
    pub next: Vec<VersionId>,
    pub created_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

impl Version {
    /// Independent copy of the captured state
    pub fn copy_state(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Whether any successor exists
    pub fn has_successor(&self) -> bool {
        !self.next.is_empty()
    }
}
