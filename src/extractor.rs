//! State extraction: what part of a resource is versioned
//!
//! A [`StateExtractor`] decides which attributes and children of a resource
//! go into a [`Snapshot`] and which are carried across restores untouched.
//! Strategies are picked once per resource type by [`ExtractorRegistry`]:
//!
//! - `Custom` - an extractor registered for the type
//! - `Container` - attributes by ignore list, plus children that are
//!   themselves versionable are left to their own histories
//! - `Default` - attributes by ignore list only

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VersionControlError};
use crate::resource::Resource;
use crate::version::{Snapshot, SnapshotChild};

/// Data kept outside version control, carried across a restore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonVersionedData {
    /// Ignored attributes and their live values
    pub attributes: BTreeMap<String, Value>,
    /// Children managed by their own histories
    pub contents: Vec<Resource>,
    /// Live child order at extraction time
    pub order: Vec<String>,
}

/// Collaborator that partitions a resource into versioned and non-versioned state
pub trait StateExtractor: Send + Sync {
    /// Names of children replaced by placeholders in a snapshot
    fn list_ignored(&self, resource: &Resource) -> Vec<String>;

    /// Current non-versioned data of a live resource
    fn extract_non_versioned(&self, resource: &Resource) -> NonVersionedData;

    /// Put previously extracted non-versioned data back
    fn restore_non_versioned(&self, resource: &mut Resource, data: NonVersionedData);

    /// Attribute names excluded from snapshots
    fn ignored_attributes(&self, resource: &Resource) -> Vec<String> {
        resource.vc_ignore.clone()
    }

    /// Deep copy of the versionable state
    fn capture(&self, resource: &Resource) -> Snapshot {
        let ignored_attrs: HashSet<String> = self.ignored_attributes(resource).into_iter().collect();
        let ignored_children: HashSet<String> = self.list_ignored(resource).into_iter().collect();

        let attributes = resource
            .attributes
            .iter()
            .filter(|(k, _)| !ignored_attrs.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let children = resource
            .children
            .iter()
            .map(|child| {
                if ignored_children.contains(&child.name) {
                    SnapshotChild::Placeholder {
                        name: child.name.clone(),
                    }
                } else {
                    SnapshotChild::Captured {
                        resource: Box::new(child.clone()),
                    }
                }
            })
            .collect();

        Snapshot {
            type_name: resource.type_name.clone(),
            attributes,
            children,
            container: resource.container,
        }
    }
}

/// Flat strategy: attributes named in an ignore list are non-versioned
#[derive(Debug, Clone, Default)]
pub struct FlatExtractor {
    /// Type-wide ignore list, merged with each resource's own `vc_ignore`
    ignore: Vec<String>,
}

impl FlatExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored(attrs: &[&str]) -> Self {
        Self {
            ignore: attrs.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn ignore_list(&self, resource: &Resource) -> Vec<String> {
        let mut attrs = self.ignore.clone();
        for attr in &resource.vc_ignore {
            if !attrs.contains(attr) {
                attrs.push(attr.clone());
            }
        }
        attrs
    }

    fn extract_attributes(&self, resource: &Resource) -> BTreeMap<String, Value> {
        self.ignore_list(resource)
            .into_iter()
            .filter_map(|attr| resource.attributes.get(&attr).map(|v| (attr, v.clone())))
            .collect()
    }

    fn restore_attributes(&self, resource: &mut Resource, attributes: BTreeMap<String, Value>) {
        let ignore = self.ignore_list(resource);
        for (attr, value) in attributes {
            if ignore.contains(&attr) {
                resource.attributes.insert(attr, value);
            }
        }
    }
}

impl StateExtractor for FlatExtractor {
    fn list_ignored(&self, _resource: &Resource) -> Vec<String> {
        Vec::new()
    }

    fn ignored_attributes(&self, resource: &Resource) -> Vec<String> {
        self.ignore_list(resource)
    }

    fn extract_non_versioned(&self, resource: &Resource) -> NonVersionedData {
        NonVersionedData {
            attributes: self.extract_attributes(resource),
            ..Default::default()
        }
    }

    fn restore_non_versioned(&self, resource: &mut Resource, data: NonVersionedData) {
        self.restore_attributes(resource, data.attributes);
    }
}

/// Container strategy: independently versionable children stay out of the snapshot
#[derive(Debug, Clone, Default)]
pub struct ContainerExtractor {
    attrs: FlatExtractor,
}

impl ContainerExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored(attrs: &[&str]) -> Self {
        Self {
            attrs: FlatExtractor::with_ignored(attrs),
        }
    }
}

impl StateExtractor for ContainerExtractor {
    fn list_ignored(&self, resource: &Resource) -> Vec<String> {
        resource
            .children
            .iter()
            .filter(|c| c.versionable)
            .map(|c| c.name.clone())
            .collect()
    }

    fn ignored_attributes(&self, resource: &Resource) -> Vec<String> {
        self.attrs.ignore_list(resource)
    }

    fn extract_non_versioned(&self, resource: &Resource) -> NonVersionedData {
        NonVersionedData {
            attributes: self.attrs.extract_attributes(resource),
            contents: resource.children.iter().filter(|c| c.versionable).cloned().collect(),
            order: resource.children.iter().map(|c| c.name.clone()).collect(),
        }
    }

    fn restore_non_versioned(&self, resource: &mut Resource, data: NonVersionedData) {
        self.attrs.restore_attributes(resource, data.attributes);

        // Children restored from the snapshot win over carried ones
        for child in data.contents {
            if resource.child(&child.name).is_none() {
                resource.children.push(child);
            }
        }

        let position: HashMap<&str, usize> = data
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        resource
            .children
            .sort_by_key(|c| position.get(c.name.as_str()).copied().unwrap_or(usize::MAX));
    }
}

/// Strategy resolved for a resource type
#[derive(Clone)]
pub enum ExtractorKind {
    Custom(Arc<dyn StateExtractor>),
    Container(ContainerExtractor),
    Default(FlatExtractor),
}

impl std::fmt::Debug for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractorKind::Custom(_) => f.write_str("Custom"),
            ExtractorKind::Container(_) => f.write_str("Container"),
            ExtractorKind::Default(_) => f.write_str("Default"),
        }
    }
}

impl ExtractorKind {
    pub fn extractor(&self) -> &dyn StateExtractor {
        match self {
            ExtractorKind::Custom(e) => e.as_ref(),
            ExtractorKind::Container(e) => e,
            ExtractorKind::Default(e) => e,
        }
    }

    pub fn capture(&self, resource: &Resource) -> Snapshot {
        self.extractor().capture(resource)
    }

    /// Overwrite the live state of `live` with `snapshot`, in place.
    ///
    /// Non-versioned data is read off the live resource first and put back
    /// on top of the restored state. Attributes present live but absent
    /// from the snapshot are dropped.
    pub fn replace_state(&self, live: &mut Resource, snapshot: &Snapshot) -> Result<()> {
        if live.type_name != snapshot.type_name {
            return Err(VersionControlError::ClassMismatch {
                live: live.type_name.clone(),
                snapshot: snapshot.type_name.clone(),
            });
        }

        let extractor = self.extractor();
        let non_versioned = extractor.extract_non_versioned(live);

        live.attributes = snapshot.attributes.clone();
        live.children = snapshot.captured_children().cloned().collect();
        extractor.restore_non_versioned(live, non_versioned);
        Ok(())
    }
}

/// Resolves and caches an extraction strategy per resource type
#[derive(Default)]
pub struct ExtractorRegistry {
    custom: HashMap<String, Arc<dyn StateExtractor>>,
    resolved: RwLock<HashMap<String, ExtractorKind>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut custom: Vec<_> = self.custom.keys().collect();
        custom.sort();
        let resolved: BTreeMap<String, ExtractorKind> =
            self.resolved.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        f.debug_struct("ExtractorRegistry")
            .field("custom", &custom)
            .field("resolved", &resolved)
            .finish()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom extractor for a resource type
    pub fn register(&mut self, type_name: impl Into<String>, extractor: Arc<dyn StateExtractor>) {
        let type_name = type_name.into();
        self.resolved.write().remove(&type_name);
        self.custom.insert(type_name, extractor);
    }

    /// Strategy for this resource's type, resolving on first use
    pub fn resolve(&self, resource: &Resource) -> ExtractorKind {
        if let Some(kind) = self.resolved.read().get(&resource.type_name) {
            return kind.clone();
        }

        let kind = if let Some(custom) = self.custom.get(&resource.type_name) {
            ExtractorKind::Custom(Arc::clone(custom))
        } else if resource.container {
            ExtractorKind::Container(ContainerExtractor::new())
        } else {
            ExtractorKind::Default(FlatExtractor::new())
        };

        debug!(type_name = %resource.type_name, strategy = ?kind, "Resolved state extractor");
        self.resolved
            .write()
            .insert(resource.type_name.clone(), kind.clone());
        kind
    }
}
