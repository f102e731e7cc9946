//! # Lineage
//!
//! Version control engine for mutable resources - every change leaves a trace.
//!
//! This crate provides:
//! - Per-resource version histories with branches and labels
//! - A checked-in / checked-out state machine
//! - Selection of versions by id, label, branch or point in time
//! - Pluggable extraction of versionable state
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    Repository                    │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐ │
//! │  │  History   │  │  History   │  │  History   │ │
//! │  │   (H1)     │  │   (H2)     │  │   (H3)     │ │
//! │  └────────────┘  └────────────┘  └────────────┘ │
//! │       │              │              │           │
//! │       ▼              ▼              ▼           │
//! │  ┌────────────────────────────────────────────┐ │
//! │  │        Branch timelines and labels         │ │
//! │  │   mainline: [V1] → [V2] → [V3]             │ │
//! │  │   bugfix:          └→ [V4]                 │ │
//! │  └────────────────────────────────────────────┘ │
//! │                      │                          │
//! │                      ▼                          │
//! │  ┌────────────────────────────────────────────┐ │
//! │  │              StateExtractor                │ │
//! │  │   capture, replace, non-versioned data     │ │
//! │  └────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use lineage::{CallContext, Repository, RepositoryConfig, Resource};
//!
//! let mut repo = Repository::new(RepositoryConfig::default());
//! let ctx = CallContext::new("alice");
//! let mut doc = Resource::new("doc", "Document", "/docs/doc").with_attribute("body", "draft");
//!
//! repo.apply_version_control(&ctx, &mut doc, None)?;
//! repo.label_resource(&ctx, &doc, "v1", false)?;
//!
//! repo.checkout_resource(&ctx, &mut doc)?;
//! doc.set_attribute("body", "final");
//! repo.checkin_resource(&ctx, &mut doc, "fix")?;
//!
//! // Back to the labeled state
//! repo.update_resource(&ctx, &mut doc, Some("v1"))?;
//! ```

pub mod error;
pub mod extractor;
pub mod history;
pub mod ids;
pub mod info;
pub mod log;
pub mod names;
pub mod repository;
pub mod resource;
pub mod selector;
pub mod storage;
pub mod version;

/// Name of the trunk branch every history starts on
pub const MAINLINE: &str = "mainline";

pub use error::{Result, VersionControlError};
pub use extractor::{
    ContainerExtractor, ExtractorKind, ExtractorRegistry, FlatExtractor, NonVersionedData, StateExtractor,
};
pub use history::{BranchTimeline, VersionHistory};
pub use ids::{HistoryId, VersionId};
pub use info::{ResourceStatus, Sticky, VersionInfo};
pub use log::{LogAction, LogEntry};
pub use names::NameRegistry;
pub use repository::{Repository, RepositoryConfig, SharedRepository};
pub use resource::{CallContext, Resource};
pub use selector::parse_point_in_time;
pub use storage::RepositoryStore;
pub use version::{Snapshot, SnapshotChild, Version};
