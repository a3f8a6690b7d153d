//! Multi-step change plans.
//!
//! A [`Plan`] is an ordered batch of graph mutations. [`PlanExecutor`] runs it
//! as one unit through the states
//! `Validating -> (Simulating) -> Applying -> Committed | RolledBack | Rejected`:
//! structural defects reject the whole plan before anything is touched, every
//! step is applied to a working copy, and the copy replaces the live graph in a
//! single swap only when every step succeeded.
//!
//! Write-through of the committed changes to the durable store happens
//! afterwards, at the async boundary, see [`write_through`].

mod executor;
mod sync;

pub use executor::{AppliedChange, Executed, PlanExecutor};
pub use sync::{SyncWarning, changes_from_diff, write_through};

use crate::domain::{Attributes, DependencyType, NodeId, attr};
use crate::error::{Error, Result};
use crate::rules::Violation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step of a plan.
///
/// Fields are optional on the wire so that a missing field is reported as a
/// structural error for its step instead of failing to parse the whole plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanOperation {
    /// Create a node from `data` (`name` required, `id` and `module_type` optional)
    CreateNode {
        /// Node attributes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Attributes>,
    },
    /// Merge `data` into an existing node's attributes
    UpdateNode {
        /// Node to update
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
        /// Attributes to merge
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Attributes>,
    },
    /// Add a dependency; endpoints are node ids or unique node names
    CreateDependency {
        /// Dependent node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// Node depended upon
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// Dependency type, `depends_on` when absent
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        dep_type: Option<DependencyType>,
        /// Explicit strength; the type's default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strength: Option<f64>,
    },
    /// Remove a node and its edges
    DeleteNode {
        /// Node to remove
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
    },
}

impl PlanOperation {
    /// Create a node with the given attributes
    #[must_use]
    pub fn create_node(data: Attributes) -> Self {
        Self::CreateNode { data: Some(data) }
    }

    /// Update a node's attributes
    #[must_use]
    pub fn update_node(node_id: impl Into<NodeId>, data: Attributes) -> Self {
        Self::UpdateNode {
            node_id: Some(node_id.into()),
            data: Some(data),
        }
    }

    /// Add a dependency of the given type
    #[must_use]
    pub fn create_dependency(
        from: impl Into<String>,
        to: impl Into<String>,
        dep_type: DependencyType,
    ) -> Self {
        Self::CreateDependency {
            from: Some(from.into()),
            to: Some(to.into()),
            dep_type: Some(dep_type),
            strength: None,
        }
    }

    /// Remove a node
    #[must_use]
    pub fn delete_node(node_id: impl Into<NodeId>) -> Self {
        Self::DeleteNode {
            node_id: Some(node_id.into()),
        }
    }

    /// Wire name of the action
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "CREATE_NODE",
            Self::UpdateNode { .. } => "UPDATE_NODE",
            Self::CreateDependency { .. } => "CREATE_DEPENDENCY",
            Self::DeleteNode { .. } => "DELETE_NODE",
        }
    }

    /// Required fields this step is missing, as messages prefixed with its index
    fn structural_errors(&self, index: usize) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::CreateNode { data: None } => {
                errors.push(format!("Step {index}: CREATE_NODE missing 'data'"));
            }
            Self::CreateNode { data: Some(data) } => {
                let named = data
                    .get(attr::NAME)
                    .and_then(Value::as_str)
                    .is_some_and(|name| !name.trim().is_empty());
                if !named {
                    errors.push(format!("Step {index}: CREATE_NODE data missing 'name'"));
                }
            }
            Self::UpdateNode { node_id, data } => {
                if node_id.is_none() {
                    errors.push(format!("Step {index}: UPDATE_NODE missing 'node_id'"));
                }
                if data.is_none() {
                    errors.push(format!("Step {index}: UPDATE_NODE missing 'data'"));
                }
            }
            Self::CreateDependency { from, to, .. } => {
                if from.is_none() || to.is_none() {
                    errors.push(format!(
                        "Step {index}: CREATE_DEPENDENCY missing 'from' or 'to'"
                    ));
                }
            }
            Self::DeleteNode { node_id: None } => {
                errors.push(format!("Step {index}: DELETE_NODE missing 'node_id'"));
            }
            Self::DeleteNode { .. } => {}
        }
        errors
    }
}

/// An ordered batch of operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Steps, applied in order
    #[serde(default)]
    pub operations: Vec<PlanOperation>,
}

impl Plan {
    /// Create a plan from its steps
    #[must_use]
    pub fn new(operations: Vec<PlanOperation>) -> Self {
        Self { operations }
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the plan has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Every missing required field, one message per defect
    #[must_use]
    pub fn structural_errors(&self) -> Vec<String> {
        self.operations
            .iter()
            .enumerate()
            .flat_map(|(index, op)| op.structural_errors(index))
            .collect()
    }

    /// Parse a plan document.
    ///
    /// Accepts YAML or JSON, either a bare list of steps or a mapping with an
    /// `operations` list.
    ///
    /// # Errors
    ///
    /// [`Error::Structural`] listing every step without a usable `action`, and
    /// [`Error::Config`] if the document is not YAML at all.
    pub fn parse(content: &str) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        let steps = match document {
            Value::Array(steps) => steps,
            Value::Object(mut map) => match map.remove("operations") {
                Some(Value::Array(steps)) => steps,
                _ => {
                    return Err(Error::Structural(
                        "plan must contain an 'operations' list".to_string(),
                    ));
                }
            },
            Value::Null => Vec::new(),
            _ => {
                return Err(Error::Structural(
                    "plan must be a list of operations".to_string(),
                ));
            }
        };

        let mut operations = Vec::with_capacity(steps.len());
        let mut errors = Vec::new();
        for (index, step) in steps.into_iter().enumerate() {
            if step.get("action").is_none() {
                errors.push(format!("Step {index}: Missing 'action' field"));
                continue;
            }
            match serde_json::from_value::<PlanOperation>(step) {
                Ok(op) => operations.push(op),
                Err(e) => errors.push(format!("Step {index}: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(Self { operations })
        } else {
            Err(Error::Structural(errors.join("; ")))
        }
    }
}

impl FromIterator<PlanOperation> for Plan {
    fn from_iter<T: IntoIterator<Item = PlanOperation>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// How a plan is executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// Evaluate rules for every step; structural checks always run
    pub validate: bool,
    /// Apply to a scratch copy that is discarded afterwards
    pub dry_run: bool,
    /// Take a snapshot before applying anything
    pub create_snapshot: bool,
    /// Recorded on change events
    pub actor: Option<String>,
    /// Refuse updates and deletes whose impact on any dependent exceeds this score
    pub impact_block_threshold: Option<f64>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            validate: true,
            dry_run: false,
            create_snapshot: true,
            actor: None,
            impact_block_threshold: None,
        }
    }
}

impl ExecuteOptions {
    /// Options for a dry run
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            create_snapshot: false,
            ..Self::default()
        }
    }

    /// Record `actor` on change events
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// States a plan passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    /// Checking required fields
    Validating,
    /// Dry run: applying to a scratch copy
    Simulating,
    /// Applying steps to the working copy
    Applying,
    /// The working copy replaced the live graph
    Committed,
    /// Dry run finished; the scratch copy was dropped
    Discarded,
    /// A step failed and the pre-plan snapshot was restored
    RolledBack,
    /// The plan was refused; nothing changed
    Rejected,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Simulating => "simulating",
            Self::Applying => "applying",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
            Self::RolledBack => "rolled_back",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Final status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Every step applied and is live
    Committed,
    /// Every step applied to a scratch copy; nothing is live
    DryRun,
    /// A step failed and the pre-plan snapshot was restored
    RolledBack,
    /// Refused before or during application; nothing is live
    Rejected,
}

impl PlanStatus {
    /// Whether every step succeeded
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Committed | Self::DryRun)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Committed => "committed",
            Self::DryRun => "dry_run",
            Self::RolledBack => "rolled_back",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A step that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Zero-based step index
    pub index: usize,
    /// Action of the step
    pub action: String,
    /// Error category, see [`Error::kind`]
    pub kind: String,
    /// Error message
    pub message: String,
    /// Cycle the step would have closed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle: Vec<NodeId>,
    /// Dependents that blocked the step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<NodeId>,
}

impl StepFailure {
    fn new(index: usize, op: &PlanOperation, error: &Error) -> Self {
        let (cycle, blocked_by) = match error {
            Error::CircularDependency { path } => (path.clone(), Vec::new()),
            Error::ImpactBlocked { affected, .. } => (Vec::new(), affected.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        Self {
            index,
            action: op.action().to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
            cycle,
            blocked_by,
        }
    }
}

/// Structured result of executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    /// Final status
    pub status: PlanStatus,
    /// States traversed, in order
    pub transitions: Vec<PlanState>,
    /// Pre-plan snapshot, when one was taken
    pub snapshot_id: Option<String>,
    /// Nodes created
    pub nodes_created: usize,
    /// Nodes updated
    pub nodes_updated: usize,
    /// Nodes deleted
    pub nodes_deleted: usize,
    /// Dependencies created
    pub dependencies_created: usize,
    /// Ids of created nodes, in step order
    pub created_node_ids: Vec<NodeId>,
    /// Every rule violation raised, warnings included
    pub violations: Vec<Violation>,
    /// Every failing step
    pub failures: Vec<StepFailure>,
    /// Index of the first failing step
    pub failed_step: Option<usize>,
    /// Missing-field defects that rejected the plan
    pub structural_errors: Vec<String>,
    /// Whether the pre-plan snapshot was restored
    pub rollback_performed: bool,
    /// Whether a rollback point remains available
    pub rollback_available: bool,
    /// Write-through failures after commit
    pub sync_warnings: Vec<SyncWarning>,
}

impl PlanOutcome {
    fn new(status: PlanStatus) -> Self {
        Self {
            status,
            transitions: Vec::new(),
            snapshot_id: None,
            nodes_created: 0,
            nodes_updated: 0,
            nodes_deleted: 0,
            dependencies_created: 0,
            created_node_ids: Vec::new(),
            violations: Vec::new(),
            failures: Vec::new(),
            failed_step: None,
            structural_errors: Vec::new(),
            rollback_performed: false,
            rollback_available: false,
            sync_warnings: Vec::new(),
        }
    }

    /// Whether every step succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Final state
    #[must_use]
    pub fn final_state(&self) -> Option<PlanState> {
        self.transitions.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> Attributes {
        let mut data = Attributes::new();
        data.insert("name".into(), json!(name));
        data
    }

    #[test]
    fn test_structural_errors_name_each_step() {
        let plan = Plan::new(vec![
            PlanOperation::create_node(named("Api")),
            PlanOperation::create_node(Attributes::new()),
            PlanOperation::UpdateNode {
                node_id: None,
                data: None,
            },
            PlanOperation::CreateDependency {
                from: Some("a".into()),
                to: None,
                dep_type: None,
                strength: None,
            },
            PlanOperation::DeleteNode { node_id: None },
        ]);

        assert_eq!(
            plan.structural_errors(),
            [
                "Step 1: CREATE_NODE data missing 'name'",
                "Step 2: UPDATE_NODE missing 'node_id'",
                "Step 2: UPDATE_NODE missing 'data'",
                "Step 3: CREATE_DEPENDENCY missing 'from' or 'to'",
                "Step 4: DELETE_NODE missing 'node_id'",
            ]
        );
    }

    #[test]
    fn test_blank_name_is_structural() {
        let plan = Plan::new(vec![PlanOperation::create_node(named("  "))]);
        assert_eq!(plan.structural_errors().len(), 1);
    }

    #[test]
    fn test_parse_yaml_operations() {
        let plan = Plan::parse(
            r"
operations:
  - action: CREATE_NODE
    data: { name: Api, module_type: service }
  - action: CREATE_DEPENDENCY
    from: Api
    to: db
    type: uses
  - action: DELETE_NODE
    node_id: legacy
",
        )
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.operations[0].action(), "CREATE_NODE");
        assert!(matches!(
            &plan.operations[1],
            PlanOperation::CreateDependency { dep_type: Some(DependencyType::Uses), .. }
        ));
    }

    #[test]
    fn test_parse_bare_json_list() {
        let plan = Plan::parse(r#"[{"action": "DELETE_NODE", "node_id": "x"}]"#).unwrap();
        assert_eq!(plan.operations, [PlanOperation::delete_node("x")]);
    }

    #[test]
    fn test_parse_reports_missing_and_unknown_actions() {
        let err = Plan::parse(r#"[{"node_id": "x"}, {"action": "RENAME_NODE"}]"#).unwrap_err();
        match err {
            Error::Structural(message) => {
                assert!(message.contains("Step 0: Missing 'action' field"));
                assert!(message.contains("Step 1:"));
            }
            other => panic!("Expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn test_operation_wire_format() {
        let op = PlanOperation::create_dependency("a", "b", DependencyType::Import);
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({"action": "CREATE_DEPENDENCY", "from": "a", "to": "b", "type": "import"})
        );
    }

    #[test]
    fn test_default_options() {
        let options = ExecuteOptions::default();
        assert!(options.validate);
        assert!(options.create_snapshot);
        assert!(!options.dry_run);
        assert!(!ExecuteOptions::dry_run().create_snapshot);
    }
}
