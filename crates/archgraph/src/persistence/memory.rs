//! Ephemeral in-memory store.

use super::{ArchitectureStore, DependencyRecord, ModuleRecord};
use crate::domain::{DependencyEdge, Node, NodeId, ProjectId};
use crate::error::{Error, Result};
use crate::rules::RuleDefinition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct ProjectRecords {
    modules: Vec<ModuleRecord>,
    dependencies: Vec<DependencyRecord>,
    rules: Vec<RuleDefinition>,
}

/// Ephemeral store keeping every project in process memory.
///
/// [`Self::set_fail_writes`] makes every write fail, which lets tests exercise
/// the write-through failure path.
#[derive(Debug, Default)]
pub struct InMemoryArchitectureStore {
    projects: Mutex<HashMap<ProjectId, ProjectRecords>>,
    fail_writes: AtomicBool,
}

impl InMemoryArchitectureStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a module
    pub async fn seed_module(&self, project: &ProjectId, record: ModuleRecord) {
        self.projects
            .lock()
            .await
            .entry(project.clone())
            .or_default()
            .modules
            .push(record);
    }

    /// Seed a dependency
    pub async fn seed_dependency(&self, project: &ProjectId, record: DependencyRecord) {
        self.projects
            .lock()
            .await
            .entry(project.clone())
            .or_default()
            .dependencies
            .push(record);
    }

    /// Seed a rule definition
    pub async fn seed_rule(&self, project: &ProjectId, rule: RuleDefinition) {
        self.projects
            .lock()
            .await
            .entry(project.clone())
            .or_default()
            .rules
            .push(rule);
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Persistence(format!("{operation}: store unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchitectureStore for InMemoryArchitectureStore {
    async fn load_modules(&self, project: &ProjectId) -> Result<Vec<ModuleRecord>> {
        let projects = self.projects.lock().await;
        Ok(projects
            .get(project)
            .map(|p| p.modules.clone())
            .unwrap_or_default())
    }

    async fn load_dependencies(&self, project: &ProjectId) -> Result<Vec<DependencyRecord>> {
        let projects = self.projects.lock().await;
        Ok(projects
            .get(project)
            .map(|p| p.dependencies.clone())
            .unwrap_or_default())
    }

    async fn load_rules(&self, project: &ProjectId) -> Result<Vec<RuleDefinition>> {
        let projects = self.projects.lock().await;
        Ok(projects
            .get(project)
            .map(|p| p.rules.clone())
            .unwrap_or_default())
    }

    async fn create_module(&self, project: &ProjectId, node: &Node) -> Result<()> {
        self.check_writable("create_module")?;
        let mut projects = self.projects.lock().await;
        let records = projects.entry(project.clone()).or_default();
        if records.modules.iter().any(|m| m.id == node.id) {
            return Err(Error::Persistence(format!("module {} already exists", node.id)));
        }
        records.modules.push(ModuleRecord::from(node));
        Ok(())
    }

    async fn update_module(&self, project: &ProjectId, node: &Node) -> Result<()> {
        self.check_writable("update_module")?;
        let mut projects = self.projects.lock().await;
        let record = projects
            .get_mut(project)
            .and_then(|p| p.modules.iter_mut().find(|m| m.id == node.id))
            .ok_or_else(|| Error::Persistence(format!("module {} not found", node.id)))?;
        *record = ModuleRecord::from(node);
        Ok(())
    }

    async fn delete_module(&self, project: &ProjectId, id: &NodeId) -> Result<()> {
        self.check_writable("delete_module")?;
        let mut projects = self.projects.lock().await;
        if let Some(records) = projects.get_mut(project) {
            records.modules.retain(|m| &m.id != id);
            records
                .dependencies
                .retain(|d| &d.from != id && &d.to != id);
        }
        Ok(())
    }

    async fn create_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()> {
        self.check_writable("create_dependency")?;
        let mut projects = self.projects.lock().await;
        let records = projects.entry(project.clone()).or_default();
        if records.dependencies.iter().any(|d| d.matches(edge)) {
            return Err(Error::Persistence(format!(
                "dependency {} -> {} already exists",
                edge.from, edge.to
            )));
        }
        records.dependencies.push(DependencyRecord::from(edge));
        Ok(())
    }

    async fn delete_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()> {
        self.check_writable("delete_dependency")?;
        let mut projects = self.projects.lock().await;
        if let Some(records) = projects.get_mut(project) {
            records.dependencies.retain(|d| !d.matches(edge));
        }
        Ok(())
    }
}
