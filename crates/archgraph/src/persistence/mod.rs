//! Durable-store boundary.
//!
//! The graph engine keeps its state in memory; an [`ArchitectureStore`] is the
//! durable source of truth it hydrates from on first access and writes
//! committed plans through to afterwards.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryArchitectureStore`]: ephemeral, with write-failure injection for tests
//! - [`JsonlArchitectureStore`]: one JSON-lines file of tagged records, rewritten atomically

mod hydrate;
mod jsonl;
mod memory;

pub use hydrate::{Hydrated, HydrationWarning, hydrate};
pub use jsonl::{JsonlArchitectureStore, LoadWarning};
pub use memory::InMemoryArchitectureStore;

use crate::domain::{Attributes, DependencyEdge, DependencyType, Node, NodeId, ProjectId};
use crate::error::Result;
use crate::rules::RuleDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A module as stored durably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Node id
    pub id: NodeId,
    /// Type tag
    #[serde(rename = "module_type")]
    pub node_type: String,
    /// Attributes
    #[serde(default)]
    pub attributes: Attributes,
    /// Hierarchy level
    #[serde(default)]
    pub level: i64,
}

impl From<&Node> for ModuleRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            attributes: node.attributes.clone(),
            level: node.level().unwrap_or_default(),
        }
    }
}

/// A dependency as stored durably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Dependent node
    pub from: NodeId,
    /// Node depended upon
    pub to: NodeId,
    /// Dependency type
    #[serde(rename = "type", default)]
    pub dep_type: DependencyType,
    /// Explicit strength; the type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Attributes>,
}

impl DependencyRecord {
    fn matches(&self, edge: &DependencyEdge) -> bool {
        self.from == edge.from && self.to == edge.to && self.dep_type == edge.dep_type
    }
}

impl From<&DependencyEdge> for DependencyRecord {
    fn from(edge: &DependencyEdge) -> Self {
        Self {
            from: edge.from.clone(),
            to: edge.to.clone(),
            dep_type: edge.dep_type.clone(),
            strength: Some(edge.strength),
            metadata: edge.metadata.clone(),
        }
    }
}

/// Durable source of truth for modules, dependencies and rules.
///
/// Loads are called once per project on first engine access; writes are
/// invoked after a successful in-memory commit, one call per applied change.
#[async_trait]
pub trait ArchitectureStore: Send + Sync {
    /// All modules of a project
    async fn load_modules(&self, project: &ProjectId) -> Result<Vec<ModuleRecord>>;

    /// All dependencies of a project
    async fn load_dependencies(&self, project: &ProjectId) -> Result<Vec<DependencyRecord>>;

    /// All rule definitions of a project
    async fn load_rules(&self, project: &ProjectId) -> Result<Vec<RuleDefinition>>;

    /// Persist a new module
    async fn create_module(&self, project: &ProjectId, node: &Node) -> Result<()>;

    /// Replace a module's type and attributes
    async fn update_module(&self, project: &ProjectId, node: &Node) -> Result<()>;

    /// Remove a module and its dependencies
    async fn delete_module(&self, project: &ProjectId, id: &NodeId) -> Result<()>;

    /// Persist a new dependency
    async fn create_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()>;

    /// Remove a dependency
    async fn delete_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()>;
}

/// Which durable store to use
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Ephemeral in-memory store
    InMemory,

    /// JSON-lines file
    Jsonl(PathBuf),
}

impl StoreBackend {
    /// Data file of file-based backends
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        match self {
            StoreBackend::Jsonl(path) => Some(path),
            StoreBackend::InMemory => None,
        }
    }
}

/// Create a store for the given backend
#[must_use]
pub fn create_store(backend: StoreBackend) -> Arc<dyn ArchitectureStore> {
    match backend {
        StoreBackend::InMemory => Arc::new(InMemoryArchitectureStore::new()),
        StoreBackend::Jsonl(path) => Arc::new(JsonlArchitectureStore::new(path)),
    }
}
