//! Snapshots and rollback.
//!
//! A [`Snapshot`] is an immutable deep copy of a [`GraphStore`], shared behind
//! an `Arc` so concurrent readers never need a lock. Rolling back replaces the
//! live store wholesale with a clone of the snapshot's copy.

use crate::domain::{DependencyEdge, DependencyType, Node, NodeId};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::id_generation::IdGenerator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Listing information for a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Version id (`snap-...`)
    pub id: String,
    /// Human name
    pub name: String,
    /// Description
    pub description: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Nodes captured
    pub node_count: usize,
    /// Edges captured
    pub edge_count: usize,
}

/// Immutable copy of a graph at one instant
#[derive(Debug)]
pub struct Snapshot {
    meta: SnapshotMeta,
    store: GraphStore,
}

impl Snapshot {
    /// Listing information
    #[must_use]
    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// The captured graph
    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }
}

/// Differences between two graph states
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphDiff {
    /// Nodes only in the new state
    pub added_nodes: Vec<Node>,
    /// Nodes only in the old state
    pub removed_nodes: Vec<Node>,
    /// Nodes present in both with different type or attributes (new version)
    pub changed_nodes: Vec<Node>,
    /// Edges only in the new state
    pub added_edges: Vec<DependencyEdge>,
    /// Edges only in the old state
    pub removed_edges: Vec<DependencyEdge>,
}

impl GraphDiff {
    /// Compute what changed going from `old` to `new`
    #[must_use]
    pub fn between(old: &GraphStore, new: &GraphStore) -> Self {
        let mut diff = Self::default();

        for node in new.all_nodes() {
            match old.get_node(&node.id) {
                None => diff.added_nodes.push(node.clone()),
                Some(previous) if previous != node => diff.changed_nodes.push(node.clone()),
                Some(_) => {}
            }
        }
        diff.removed_nodes = old
            .all_nodes()
            .into_iter()
            .filter(|node| !new.contains_node(&node.id))
            .cloned()
            .collect();

        type EdgeKey = (NodeId, NodeId, DependencyType);
        let key = |e: &DependencyEdge| -> EdgeKey {
            (e.from.clone(), e.to.clone(), e.dep_type.clone())
        };
        let old_edges: HashMap<EdgeKey, DependencyEdge> =
            old.all_edges().into_iter().map(|e| (key(&e), e)).collect();
        let new_edges: HashMap<EdgeKey, DependencyEdge> =
            new.all_edges().into_iter().map(|e| (key(&e), e)).collect();

        for (k, edge) in &new_edges {
            if old_edges.get(k) != Some(edge) {
                diff.added_edges.push(edge.clone());
            }
        }
        for (k, edge) in &old_edges {
            if new_edges.get(k) != Some(edge) {
                diff.removed_edges.push(edge.clone());
            }
        }
        diff.added_edges.sort_by_key(key);
        diff.removed_edges.sort_by_key(key);

        diff
    }

    /// Whether the states were identical
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Snapshot registry for one project
#[derive(Debug)]
pub struct VersionManager {
    snapshots: VecDeque<Arc<Snapshot>>,
    max_snapshots: usize,
    ids: IdGenerator,
}

impl VersionManager {
    /// Create a manager retaining at most `max_snapshots` snapshots
    #[must_use]
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_snapshots: max_snapshots.max(1),
            ids: IdGenerator::with_existing("snap", Vec::<String>::new()),
        }
    }

    /// Capture the current state of `store`.
    ///
    /// # Errors
    ///
    /// Fails only if a unique id cannot be generated.
    pub fn create_snapshot(
        &mut self,
        store: &GraphStore,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<String> {
        let name = name.into();
        let description = description.into();
        let id = self.ids.generate(&[&name, &description])?;

        let snapshot = Snapshot {
            meta: SnapshotMeta {
                id: id.clone(),
                name,
                description,
                created_at: Utc::now(),
                node_count: store.node_count(),
                edge_count: store.edge_count(),
            },
            store: store.clone(),
        };

        info!(
            snapshot = %id,
            name = %snapshot.meta.name,
            nodes = snapshot.meta.node_count,
            edges = snapshot.meta.edge_count,
            "Created snapshot"
        );
        self.snapshots.push_back(Arc::new(snapshot));

        while self.snapshots.len() > self.max_snapshots {
            if let Some(evicted) = self.snapshots.pop_front() {
                debug!(snapshot = %evicted.meta.id, "Evicted oldest snapshot");
            }
        }

        Ok(id)
    }

    /// Replace the contents of `store` with the snapshot `id`.
    ///
    /// # Errors
    ///
    /// [`Error::SnapshotNotFound`] for unknown ids; `store` is left untouched.
    pub fn rollback(&self, id: &str, store: &mut GraphStore) -> Result<Arc<Snapshot>> {
        let snapshot = self
            .get_snapshot(id)
            .ok_or_else(|| Error::SnapshotNotFound(id.to_string()))?;

        *store = snapshot.store.clone();
        info!(snapshot = %id, "Rolled back to snapshot");
        Ok(snapshot)
    }

    /// Metadata of every retained snapshot, oldest first
    #[must_use]
    pub fn list_snapshots(&self) -> Vec<SnapshotMeta> {
        self.snapshots.iter().map(|s| s.meta.clone()).collect()
    }

    /// Look up a snapshot
    #[must_use]
    pub fn get_snapshot(&self, id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.iter().find(|s| s.meta.id == id).cloned()
    }

    /// Drop a snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::SnapshotNotFound`] for unknown ids.
    pub fn delete_snapshot(&mut self, id: &str) -> Result<SnapshotMeta> {
        let position = self
            .snapshots
            .iter()
            .position(|s| s.meta.id == id)
            .ok_or_else(|| Error::SnapshotNotFound(id.to_string()))?;
        let removed = self
            .snapshots
            .remove(position)
            .ok_or_else(|| Error::SnapshotNotFound(id.to_string()))?;
        Ok(removed.meta.clone())
    }

    /// Number of retained snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshots are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attributes;
    use serde_json::json;

    fn sample() -> GraphStore {
        let mut store = GraphStore::new();
        store.add_node("a".into(), "module", Attributes::new()).unwrap();
        store.add_node("b".into(), "module", Attributes::new()).unwrap();
        store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();
        store
    }

    #[test]
    fn test_snapshot_survives_later_mutation() {
        let mut store = sample();
        let mut versions = VersionManager::new(10);
        let id = versions.create_snapshot(&store, "baseline", "before edits").unwrap();

        store.remove_node(&"b".into()).unwrap();
        let snapshot = versions.get_snapshot(&id).unwrap();
        assert_eq!(snapshot.store().node_count(), 2);
        assert_eq!(snapshot.meta().edge_count, 1);
    }

    #[test]
    fn test_rollback_restores_exact_state() {
        let mut store = sample();
        let before = store.state();
        let mut versions = VersionManager::new(10);
        let id = versions.create_snapshot(&store, "baseline", "").unwrap();

        store.add_node("c".into(), "module", Attributes::new()).unwrap();
        store
            .add_edge(&"c".into(), &"a".into(), DependencyType::Import, None)
            .unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("status".into(), json!("deprecated"));
        store.update_node(&"a".into(), attrs).unwrap();
        store.remove_node(&"b".into()).unwrap();

        versions.rollback(&id, &mut store).unwrap();
        assert_eq!(store.state(), before);
    }

    #[test]
    fn test_rollback_unknown_id() {
        let mut store = sample();
        let versions = VersionManager::new(10);
        let result = versions.rollback("snap-nope", &mut store);
        assert!(matches!(result, Err(Error::SnapshotNotFound(_))));
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let store = sample();
        let mut versions = VersionManager::new(2);
        let first = versions.create_snapshot(&store, "one", "").unwrap();
        versions.create_snapshot(&store, "two", "").unwrap();
        versions.create_snapshot(&store, "three", "").unwrap();

        let names: Vec<String> = versions.list_snapshots().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["two", "three"]);
        assert!(versions.get_snapshot(&first).is_none());
    }

    #[test]
    fn test_delete_snapshot() {
        let store = sample();
        let mut versions = VersionManager::new(5);
        let id = versions.create_snapshot(&store, "one", "").unwrap();
        assert_eq!(versions.delete_snapshot(&id).unwrap().name, "one");
        assert!(versions.is_empty());
        assert!(versions.delete_snapshot(&id).is_err());
    }

    #[test]
    fn test_diff_lists_changes() {
        let old = sample();
        let mut new = sample();
        new.remove_node(&"b".into()).unwrap();
        new.add_node("c".into(), "module", Attributes::new()).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), json!("A"));
        new.update_node(&"a".into(), attrs).unwrap();

        let diff = GraphDiff::between(&old, &new);
        assert_eq!(diff.added_nodes.len(), 1);
        let removed: Vec<&NodeId> = diff.removed_nodes.iter().map(|n| &n.id).collect();
        assert_eq!(removed, [&NodeId::from("b")]);
        assert_eq!(diff.changed_nodes.len(), 1);
        assert_eq!(diff.removed_edges.len(), 1);
        assert!(diff.added_edges.is_empty());
        assert!(GraphDiff::between(&old, &old).is_empty());
    }
}
