//! Error types for archgraph operations.
//!
//! The taxonomy mirrors the ways a graph mutation can be refused: malformed
//! plans, unknown references, dependency-specific rejections, rule and impact
//! refusals, and failures at the durable-store boundary.

use crate::domain::NodeId;
use crate::id_generation::IdGenerationError;
use crate::rules::Violation;
use std::io;
use thiserror::Error;

/// The error type for archgraph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A plan operation is missing a required field.
    #[error("Structural error: {0}")]
    Structural(String),

    /// A referenced node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A referenced dependency edge does not exist.
    #[error("Dependency not found: {from} -> {to} ({dep_type})")]
    EdgeNotFound {
        /// Source of the missing edge
        from: NodeId,
        /// Target of the missing edge
        to: NodeId,
        /// Dependency type tag
        dep_type: String,
    },

    /// A referenced snapshot version does not exist.
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// A node with this id already exists.
    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    /// A dependency from a node to itself was requested.
    #[error("Node cannot depend on itself: {0}")]
    SelfReference(NodeId),

    /// An identical (from, to, type) edge already exists.
    #[error("Dependency already exists: {from} -> {to} ({dep_type})")]
    DuplicateEdge {
        /// Source node
        from: NodeId,
        /// Target node
        to: NodeId,
        /// Dependency type tag
        dep_type: String,
    },

    /// Adding the edge would close a cycle.
    #[error("Adding dependency would create a cycle: {}", format_path(.path))]
    CircularDependency {
        /// The cycle that the new edge would close, starting and ending at the same node
        path: Vec<NodeId>,
    },

    /// One or more error-severity rules rejected the change.
    #[error("Rule violation: {}", format_violations(.violations))]
    RuleViolation {
        /// Every violation raised by the change, warnings included
        violations: Vec<Violation>,
    },

    /// The change was refused because its impact exceeds the configured threshold.
    #[error("Change to {node_id} blocked: impact on {} dependent(s) exceeds threshold", .affected.len())]
    ImpactBlocked {
        /// Node whose change was blocked
        node_id: NodeId,
        /// Dependents scoring above the threshold
        affected: Vec<NodeId>,
    },

    /// Write-through to the durable store failed after an in-memory commit.
    #[error("Sync error during {operation}: {message}")]
    Sync {
        /// The write-through call that failed
        operation: String,
        /// Failure detail from the durable store
        message: String,
    },

    /// The durable store reported an error.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A call to the durable store exceeded its deadline.
    #[error("Timed out after {millis}ms during {operation}")]
    Timeout {
        /// The durable-store call that timed out
        operation: String,
        /// Deadline in milliseconds
        millis: u64,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Id generation failed.
    #[error(transparent)]
    IdGeneration(#[from] IdGenerationError),
}

impl Error {
    /// Short machine-readable name of the error category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structural(_) => "structural",
            Self::NodeNotFound(_) | Self::EdgeNotFound { .. } | Self::SnapshotNotFound(_) => {
                "not_found"
            }
            Self::DuplicateNode(_) => "duplicate_node",
            Self::SelfReference(_) => "self_reference",
            Self::DuplicateEdge { .. } => "duplicate_edge",
            Self::CircularDependency { .. } => "cycle",
            Self::RuleViolation { .. } => "rule_violation",
            Self::ImpactBlocked { .. } => "impact_blocked",
            Self::Sync { .. } => "sync",
            Self::Persistence(_) | Self::Timeout { .. } => "persistence",
            Self::Config(_) => "config",
            Self::Io(_) | Self::Json(_) | Self::IdGeneration(_) => "internal",
        }
    }
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("[{}] {}", v.rule, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialized Result type for archgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_lists_path() {
        let err = Error::CircularDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Adding dependency would create a cycle: a -> b -> a"
        );
        assert_eq!(err.kind(), "cycle");
    }

    #[test]
    fn test_not_found_kinds_share_category() {
        assert_eq!(Error::NodeNotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::SnapshotNotFound("snap-1".into()).kind(), "not_found");
    }
}
