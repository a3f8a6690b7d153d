//! Write-through of committed changes to the durable store.
//!
//! The durable store is authoritative and the in-memory graph is a cache of
//! it. A failed write never reverts the graph: it becomes a [`SyncWarning`]
//! and the caller marks the project for reconciliation.

use super::AppliedChange;
use crate::domain::{NodeId, ProjectId};
use crate::error::Error;
use crate::graph::GraphStore;
use crate::persistence::ArchitectureStore;
use crate::versioning::GraphDiff;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// A committed change the durable store did not accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWarning {
    /// Store call that failed (`create_module`, ...)
    pub operation: String,
    /// Node or dependency the call was about
    pub target: String,
    /// Failure detail
    pub message: String,
}

impl SyncWarning {
    fn new(operation: &str, target: String, error: &Error) -> Self {
        Self {
            operation: operation.to_string(),
            target,
            message: error.to_string(),
        }
    }
}

/// Propagate `changes` to `backend`, one call per change, in order.
///
/// Each call gets `deadline`; a call that times out counts as failed.
pub async fn write_through(
    backend: &dyn ArchitectureStore,
    project: &ProjectId,
    changes: &[AppliedChange],
    deadline: Duration,
) -> Vec<SyncWarning> {
    let mut warnings = Vec::new();

    for change in changes {
        let (operation, target, call) = match change {
            AppliedChange::NodeCreated(node) => (
                "create_module",
                node.id.to_string(),
                backend.create_module(project, node),
            ),
            AppliedChange::NodeUpdated { node, .. } => (
                "update_module",
                node.id.to_string(),
                backend.update_module(project, node),
            ),
            AppliedChange::NodeDeleted { node, .. } => (
                "delete_module",
                node.id.to_string(),
                backend.delete_module(project, &node.id),
            ),
            AppliedChange::DependencyCreated(edge) => (
                "create_dependency",
                format!("{} -> {} ({})", edge.from, edge.to, edge.dep_type),
                backend.create_dependency(project, edge),
            ),
            AppliedChange::DependencyDeleted(edge) => (
                "delete_dependency",
                format!("{} -> {} ({})", edge.from, edge.to, edge.dep_type),
                backend.delete_dependency(project, edge),
            ),
        };

        let result = match timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                millis: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        if let Err(e) = result {
            let error = Error::Sync {
                operation: operation.to_string(),
                message: e.to_string(),
            };
            warn!(
                project = %project,
                operation,
                target = %target,
                error = %e,
                "Write-through failed; durable store is behind the graph"
            );
            warnings.push(SyncWarning::new(operation, target, &error));
        }
    }

    warnings
}

/// Changes that take a durable copy of `old` to the new side of `diff`.
///
/// `diff` must have been computed with `old` as its old side. Dependencies
/// are removed first, then modules; modules are created before the
/// dependencies that reference them. Edges of removed modules are left to the
/// module deletion.
#[must_use]
pub fn changes_from_diff(old: &GraphStore, diff: GraphDiff) -> Vec<AppliedChange> {
    let removed: HashSet<NodeId> = diff.removed_nodes.iter().map(|n| n.id.clone()).collect();
    let dependents_of = |id: &NodeId| old.dependents(id).unwrap_or_default();
    let mut changes = Vec::new();

    changes.extend(
        diff.removed_edges
            .into_iter()
            .filter(|e| !removed.contains(&e.from) && !removed.contains(&e.to))
            .map(AppliedChange::DependencyDeleted),
    );
    changes.extend(diff.removed_nodes.into_iter().map(|node| AppliedChange::NodeDeleted {
        dependents: dependents_of(&node.id),
        node,
    }));
    changes.extend(diff.added_nodes.into_iter().map(AppliedChange::NodeCreated));
    changes.extend(diff.changed_nodes.into_iter().map(|node| AppliedChange::NodeUpdated {
        old: old
            .get_node(&node.id)
            .map(|n| n.attributes.clone())
            .unwrap_or_default(),
        dependents: dependents_of(&node.id),
        node,
    }));
    changes.extend(diff.added_edges.into_iter().map(AppliedChange::DependencyCreated));

    changes
}
