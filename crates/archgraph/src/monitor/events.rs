//! Typed events published by the change monitor.

use super::alerts::Alert;
use crate::domain::{Attributes, ChangeKind, DependencyType, NodeId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One recorded change to a node; immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Node that changed
    pub node_id: NodeId,
    /// Kind of change
    pub change_kind: ChangeKind,
    /// Attributes before the change (absent for creations)
    pub old: Option<Attributes>,
    /// Attributes after the change (absent for deletions)
    pub new: Option<Attributes>,
    /// Keys whose values differ between `old` and `new`
    pub changed_fields: BTreeSet<String>,
    /// When the change was committed
    pub timestamp: DateTime<Utc>,
    /// Who made the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl ChangeEvent {
    /// Build an event, computing the changed fields
    #[must_use]
    pub fn new(
        node_id: NodeId,
        change_kind: ChangeKind,
        old: Option<Attributes>,
        new: Option<Attributes>,
        actor: Option<String>,
    ) -> Self {
        let empty = Attributes::new();
        let changed_fields = changed_fields(
            old.as_ref().unwrap_or(&empty),
            new.as_ref().unwrap_or(&empty),
        );
        Self {
            node_id,
            change_kind,
            old,
            new,
            changed_fields,
            timestamp: Utc::now(),
            actor,
        }
    }
}

/// Keys present in either map whose values differ
#[must_use]
pub fn changed_fields(old: &Attributes, new: &Attributes) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}

/// Notice that a dependent may need updating after a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentUpdate {
    /// Node that depends on the changed node
    pub dependent_node_id: NodeId,
    /// The changed node
    pub source_node_id: NodeId,
    /// Type of the dependency linking them
    pub dependency_type: DependencyType,
    /// What happened to the source
    pub source_change: ChangeKind,
    /// Source fields that changed
    pub changed_fields: BTreeSet<String>,
    /// Always true; kept for consumers that filter on it
    pub requires_update: bool,
    /// When the notice was issued
    pub timestamp: DateTime<Utc>,
}

/// Events consumable by an external event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    /// A node was created, updated, moved or deleted
    NodeChanged(ChangeEvent),
    /// A dependent of a changed node may need updating
    DependentNeedsUpdate(DependentUpdate),
    /// A health check found a problem
    Alert(Alert),
}

impl GraphEvent {
    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeChanged(_) => "node_changed",
            Self::DependentNeedsUpdate(_) => "dependent_needs_update",
            Self::Alert(_) => "alert",
        }
    }
}

/// An event with its delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Per-project sequence number, strictly increasing
    pub seq: u64,
    /// Project the event belongs to
    pub project: ProjectId,
    /// The event
    pub event: GraphEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changed_fields_is_symmetric() {
        let mut old = Attributes::new();
        old.insert("name".into(), json!("A"));
        old.insert("status".into(), json!("active"));
        old.insert("gone".into(), json!(1));

        let mut new = Attributes::new();
        new.insert("name".into(), json!("A"));
        new.insert("status".into(), json!("deprecated"));
        new.insert("added".into(), json!(true));

        let fields: Vec<String> = changed_fields(&old, &new).into_iter().collect();
        assert_eq!(fields, ["added", "gone", "status"]);
        assert_eq!(changed_fields(&new, &old), changed_fields(&old, &new));
    }

    #[test]
    fn test_event_serializes_with_name_tag() {
        let event = GraphEvent::NodeChanged(ChangeEvent::new(
            "a".into(),
            ChangeKind::Create,
            None,
            Some(Attributes::new()),
            Some("alice".into()),
        ));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["change_kind"], "create");
        assert_eq!(value["actor"], "alice");
    }
}
