//! Live resource records handed to the engine by the host

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::info::VersionInfo;

/// A mutable host resource.
///
/// The host owns the record and its place in the resource tree; the engine
/// only reads and rewrites its state and the attached `vc_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Name within the parent container
    pub name: String,
    /// Structural type, compared against snapshots on restore
    pub type_name: String,
    /// Location string used in audit records
    pub path: String,
    pub attributes: BTreeMap<String, Value>,
    /// Ordered children (containers only)
    pub children: Vec<Resource>,
    /// Independently identifiable and storable
    pub versionable: bool,
    /// Partitions children into versioned and non-versioned
    pub container: bool,
    /// Attribute names managed outside version control
    pub vc_ignore: Vec<String>,
    /// Version bookkeeping side-table
    pub vc_info: Option<VersionInfo>,
}

impl Resource {
    /// Create a versionable leaf resource
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            path: path.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            versionable: true,
            container: false,
            vc_ignore: Vec::new(),
            vc_info: None,
        }
    }

    /// Create a versionable container resource
    pub fn container(name: impl Into<String>, type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: true,
            ..Self::new(name, type_name, path)
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_ignored(mut self, attrs: &[&str]) -> Self {
        self.vc_ignore = attrs.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn non_versionable(mut self) -> Self {
        self.versionable = false;
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Append a child, deriving its path from this resource
    pub fn add_child(&mut self, mut child: Resource) {
        if child.path.is_empty() {
            child.path = format!("{}/{}", self.path.trim_end_matches('/'), child.name);
        }
        self.children.push(child);
    }

    pub fn child(&self, name: &str) -> Option<&Resource> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn remove_child(&mut self, name: &str) -> Option<Resource> {
        let idx = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(idx))
    }

    /// Names of children in order
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Caller identity and ancestor context supplied by the host
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Identity recorded in audit entries and bookkeeping
    pub actor_id: String,
    /// Bookkeeping of the resource's logical parent, if any
    pub parent_info: Option<VersionInfo>,
}

impl CallContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            parent_info: None,
        }
    }

    pub fn with_parent(mut self, parent_info: Option<VersionInfo>) -> Self {
        self.parent_info = parent_info;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_defaults() {
        let doc = Resource::new("doc", "Document", "/folder/doc");
        assert!(doc.versionable);
        assert!(!doc.container);
        assert!(doc.vc_info.is_none());
    }

    #[test]
    fn test_add_child_derives_path() {
        let mut folder = Resource::container("folder", "Folder", "/folder/");
        folder.add_child(Resource::new("a", "Document", ""));
        folder.add_child(Resource::new("b", "Document", "/elsewhere/b"));

        assert_eq!(folder.child("a").unwrap().path, "/folder/a");
        assert_eq!(folder.child("b").unwrap().path, "/elsewhere/b");
        assert_eq!(folder.child_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_child() {
        let mut folder = Resource::container("folder", "Folder", "/folder");
        folder.add_child(Resource::new("a", "Document", ""));

        assert!(folder.remove_child("a").is_some());
        assert!(folder.remove_child("a").is_none());
        assert!(folder.children.is_empty());
    }

    #[test]
    fn test_attributes() {
        let mut doc = Resource::new("doc", "Document", "/doc").with_attribute("title", "Hello");
        doc.set_attribute("body", "text");

        assert_eq!(doc.attribute("title"), Some(&Value::from("Hello")));
        assert_eq!(doc.remove_attribute("body"), Some(Value::from("text")));
        assert!(doc.attribute("body").is_none());
    }

    #[test]
    fn test_call_context() {
        let ctx = CallContext::new("alice");
        assert_eq!(ctx.actor_id, "alice");
        assert!(ctx.parent_info.is_none());
    }
}
