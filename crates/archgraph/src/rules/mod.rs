//! Rule engine.
//!
//! Rules are tagged variants ([`RuleKind`]) scoped to a node, a node type or
//! the whole graph. The engine evaluates them against a *proposed* state and
//! never mutates the store. Rules are kept sorted by descending priority, so
//! every evaluation visits them highest-priority first.

mod definition;

pub use definition::{RuleDefinition, RuleDefinitionError};

use crate::domain::{Attributes, DependencyType, NodeId, layer_of};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Which nodes a rule applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "target", rename_all = "snake_case")]
pub enum RuleScope {
    /// Every node
    #[default]
    Global,
    /// Nodes with this type tag
    NodeType(String),
    /// A single node
    Node(NodeId),
}

impl RuleScope {
    fn matches(&self, node_id: &NodeId, node_type: &str) -> bool {
        match self {
            Self::Global => true,
            Self::NodeType(t) => t == node_type,
            Self::Node(id) => id == node_id,
        }
    }
}

/// How serious a violation is; only errors make a change invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported but does not block
    Warning,
    /// Blocks the change
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Caller-supplied predicate for [`RuleKind::Custom`].
///
/// The predicate returns `true` when the proposed state is acceptable.
#[derive(Clone)]
pub struct CustomCondition {
    description: String,
    predicate: Arc<dyn Fn(&RuleInput<'_>) -> bool + Send + Sync>,
}

impl CustomCondition {
    /// Wrap a predicate with a human readable description
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Description of what the predicate checks
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for CustomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCondition")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Serialize for CustomCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("description", &self.description)?;
        map.end()
    }
}

/// Built-in rule kinds
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// The node name must start and/or end with the given text
    Naming {
        /// Required prefix
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        /// Required suffix
        #[serde(skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
    /// Outgoing edge count after the change must not exceed `max`
    MaxDependencyCount {
        /// Upper bound, inclusive
        max: usize,
    },
    /// Edges from `from_layer` to `to_layer` are forbidden
    LayerForbidden {
        /// Source layer
        from_layer: String,
        /// Target layer
        to_layer: String,
    },
    /// Arbitrary predicate
    Custom(CustomCondition),
}

/// A proposed dependency being validated
#[derive(Debug, Clone, Copy)]
pub struct EdgeProposal<'a> {
    /// Target node
    pub to: &'a NodeId,
    /// Dependency type
    pub dep_type: &'a DependencyType,
    /// Layer of the target node
    pub target_layer: &'a str,
}

/// Proposed node state presented to a rule
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// Node under validation
    pub node_id: &'a NodeId,
    /// Its type tag
    pub node_type: &'a str,
    /// Attributes as they would be after the change
    pub attributes: &'a Attributes,
    /// Outgoing edge count as it would be after the change
    pub outgoing_count: usize,
    /// The dependency being added, if any
    pub edge: Option<EdgeProposal<'a>>,
}

impl RuleInput<'_> {
    /// Proposed `name` attribute
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attributes
            .get(crate::domain::attr::NAME)
            .and_then(serde_json::Value::as_str)
    }

    /// Proposed layer of the node
    #[must_use]
    pub fn layer(&self) -> &str {
        layer_of(self.attributes, self.node_type)
    }
}

/// A change to validate against an existing node
#[derive(Debug, Clone)]
pub enum ProposedChange {
    /// Attribute update (merged into the current attributes)
    Attributes(Attributes),
    /// New outgoing dependency
    Dependency {
        /// Target node
        to: NodeId,
        /// Dependency type
        dep_type: DependencyType,
    },
    /// Node removal
    Removal,
}

/// A rule refusing a proposed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the violated rule
    pub rule: String,
    /// Severity of the rule
    pub severity: Severity,
    /// Human readable explanation
    pub message: String,
    /// Optional hint for fixing the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// Node the violation was raised for
    pub node_id: NodeId,
}

/// Outcome of validating one proposed change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// False when any error-severity rule was violated
    pub is_valid: bool,
    /// Every violation, highest-priority rule first
    pub violations: Vec<Violation>,
}

impl Validation {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            is_valid: !violations.iter().any(|v| v.severity == Severity::Error),
            violations,
        }
    }

    /// A validation with nothing to report
    #[must_use]
    pub fn passed() -> Self {
        Self::from_violations(Vec::new())
    }

    /// Turn an invalid validation into [`Error::RuleViolation`].
    ///
    /// # Errors
    ///
    /// Returns the error when `is_valid` is false.
    pub fn into_result(self) -> Result<Vec<Violation>> {
        if self.is_valid {
            Ok(self.violations)
        } else {
            Err(Error::RuleViolation {
                violations: self.violations,
            })
        }
    }
}

/// A named constraint
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    /// Unique rule name
    pub name: String,
    /// Nodes the rule applies to
    pub scope: RuleScope,
    /// What the rule checks
    #[serde(flatten)]
    pub kind: RuleKind,
    /// Higher runs first
    pub priority: i32,
    /// Whether a violation blocks the change
    pub severity: Severity,
    /// Hint shown alongside violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Rule {
    /// Create a global, error-severity rule with priority 0
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            scope: RuleScope::Global,
            kind,
            priority: 0,
            severity: Severity::Error,
            suggested_fix: None,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the suggested fix
    #[must_use]
    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Whether the rule judges individual edges rather than the node itself
    #[must_use]
    pub fn is_edge_rule(&self) -> bool {
        matches!(self.kind, RuleKind::LayerForbidden { .. })
    }

    /// Evaluate the rule against a proposed state.
    ///
    /// Returns `None` when the rule is satisfied or does not apply.
    #[must_use]
    pub fn evaluate(&self, input: &RuleInput<'_>) -> Option<Violation> {
        let message = match &self.kind {
            RuleKind::Naming { prefix, suffix } => {
                if input.edge.is_some() {
                    return None;
                }
                let name = input.name()?;
                match (prefix, suffix) {
                    (Some(p), _) if !name.starts_with(p.as_str()) => {
                        format!("Name '{name}' must start with '{p}'")
                    }
                    (_, Some(s)) if !name.ends_with(s.as_str()) => {
                        format!("Name '{name}' must end with '{s}'")
                    }
                    _ => return None,
                }
            }
            RuleKind::MaxDependencyCount { max } => {
                if input.outgoing_count <= *max {
                    return None;
                }
                format!(
                    "Node {} would have {} dependencies (maximum {max})",
                    input.node_id, input.outgoing_count
                )
            }
            RuleKind::LayerForbidden {
                from_layer,
                to_layer,
            } => {
                let edge = input.edge?;
                if input.layer() != from_layer || edge.target_layer != to_layer {
                    return None;
                }
                format!(
                    "Layer '{from_layer}' cannot depend on layer '{to_layer}' ({} -> {})",
                    input.node_id, edge.to
                )
            }
            RuleKind::Custom(condition) => {
                if (condition.predicate)(input) {
                    return None;
                }
                format!("Condition failed: {}", condition.description)
            }
        };

        Some(Violation {
            rule: self.name.clone(),
            severity: self.severity,
            message,
            suggested_fix: self.suggested_fix.clone(),
            node_id: input.node_id.clone(),
        })
    }
}

/// Summary of checking the whole graph against every rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReport {
    /// No error-severity violations
    pub valid: bool,
    /// Error-severity violations
    pub errors: Vec<Violation>,
    /// Warning-severity violations
    pub warnings: Vec<Violation>,
    /// Rules that were evaluated and never violated
    pub passed_rules: Vec<String>,
    /// Rules violated at least once
    pub failed_rules: Vec<String>,
}

/// Registry of rules for one project
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    /// Sorted by descending priority, registration order within a priority
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rule` under `scope`.
    ///
    /// A rule with the same name is replaced.
    pub fn register(&mut self, scope: RuleScope, mut rule: Rule) {
        rule.scope = scope;
        self.rules.retain(|existing| existing.name != rule.name);
        let position = self
            .rules
            .iter()
            .position(|existing| existing.priority < rule.priority)
            .unwrap_or(self.rules.len());
        tracing::debug!(rule = %rule.name, priority = rule.priority, "Registered rule");
        self.rules.insert(position, rule);
    }

    /// Remove a rule by name
    pub fn unregister(&mut self, name: &str) -> Option<Rule> {
        let index = self.rules.iter().position(|rule| rule.name == name)?;
        Some(self.rules.remove(index))
    }

    /// All rules, highest priority first
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules applying to a node, highest priority first
    #[must_use]
    pub fn rules_for(&self, node_id: &NodeId, node_type: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.scope.matches(node_id, node_type))
            .collect()
    }

    /// Validate a proposed change to an existing node.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node, or the target of a proposed
    /// dependency, does not exist.
    pub fn validate(
        &self,
        store: &GraphStore,
        node_id: &NodeId,
        change: &ProposedChange,
    ) -> Result<Validation> {
        let node = store.node(node_id)?;
        let outgoing = store.out_degree(node_id);

        match change {
            ProposedChange::Removal => Ok(Validation::passed()),
            ProposedChange::Attributes(proposed) => {
                let mut merged = node.attributes.clone();
                merged.extend(proposed.clone());
                Ok(self.evaluate(&RuleInput {
                    node_id,
                    node_type: &node.node_type,
                    attributes: &merged,
                    outgoing_count: outgoing,
                    edge: None,
                }))
            }
            ProposedChange::Dependency { to, dep_type } => {
                let target = store.node(to)?;
                Ok(self.evaluate(&RuleInput {
                    node_id,
                    node_type: &node.node_type,
                    attributes: &node.attributes,
                    outgoing_count: outgoing + 1,
                    edge: Some(EdgeProposal {
                        to,
                        dep_type,
                        target_layer: target.layer(),
                    }),
                }))
            }
        }
    }

    /// Validate a node that does not exist yet
    #[must_use]
    pub fn validate_new_node(
        &self,
        node_id: &NodeId,
        node_type: &str,
        attributes: &Attributes,
    ) -> Validation {
        self.evaluate(&RuleInput {
            node_id,
            node_type,
            attributes,
            outgoing_count: 0,
            edge: None,
        })
    }

    /// Evaluate every applicable rule against `input`
    #[must_use]
    pub fn evaluate(&self, input: &RuleInput<'_>) -> Validation {
        let violations = self
            .rules_for(input.node_id, input.node_type)
            .into_iter()
            .filter_map(|rule| rule.evaluate(input))
            .collect();
        Validation::from_violations(violations)
    }

    /// Check the current graph against every rule
    #[must_use]
    pub fn validate_all(&self, store: &GraphStore) -> RuleReport {
        let mut violations = Vec::new();
        let mut evaluated: Vec<&str> = Vec::new();

        for node in store.all_nodes() {
            let base = RuleInput {
                node_id: &node.id,
                node_type: &node.node_type,
                attributes: &node.attributes,
                outgoing_count: store.out_degree(&node.id),
                edge: None,
            };
            let edges = store.dependencies(&node.id).unwrap_or_default();

            for rule in self.rules_for(&node.id, &node.node_type) {
                if !evaluated.contains(&rule.name.as_str()) {
                    evaluated.push(rule.name.as_str());
                }
                if !rule.is_edge_rule() {
                    violations.extend(rule.evaluate(&base));
                    continue;
                }
                for edge in &edges {
                    let target_layer = store.get_node(&edge.to).map_or("", |t| t.layer());
                    let input = RuleInput {
                        edge: Some(EdgeProposal {
                            to: &edge.to,
                            dep_type: &edge.dep_type,
                            target_layer,
                        }),
                        ..base
                    };
                    violations.extend(rule.evaluate(&input));
                }
            }
        }

        let failed_rules: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| violations.iter().any(|v| v.rule == rule.name))
            .map(|rule| rule.name.clone())
            .collect();
        let passed_rules = evaluated
            .into_iter()
            .filter(|name| !failed_rules.iter().any(|failed| failed == name))
            .map(str::to_string)
            .collect();

        let (errors, warnings): (Vec<_>, Vec<_>) = violations
            .into_iter()
            .partition(|v| v.severity == Severity::Error);

        RuleReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            passed_rules,
            failed_rules,
        }
    }
}
