//! Domain types for the architecture graph.
//!
//! Nodes model software modules, edges model typed and weighted dependencies
//! between them. Attribute maps are open-ended JSON values so that callers can
//! carry whatever metadata their modules need.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute map of a node, ordered by key.
pub type Attributes = BTreeMap<String, Value>;

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a project scope; each project owns exactly one graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Create a new project ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Well-known attribute keys.
pub mod attr {
    /// Human readable module name
    pub const NAME: &str = "name";
    /// Free-form description
    pub const DESCRIPTION: &str = "description";
    /// Hierarchy level (0 = top)
    pub const LEVEL: &str = "level";
    /// Lifecycle status
    pub const STATUS: &str = "status";
    /// Architectural layer used by layer rules
    pub const LAYER: &str = "layer";
    /// Whether the module was machine generated
    pub const AI_GENERATED: &str = "ai_generated";
    /// Nested metadata object
    pub const METADATA: &str = "metadata";
}

/// A modeled architecture module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,

    /// Type tag (service, module, database, component, ...)
    pub node_type: String,

    /// Attribute map
    #[serde(default)]
    pub attributes: Attributes,
}

impl Node {
    /// Create a node from its parts
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            attributes,
        }
    }

    /// The `name` attribute, if it is a string
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(attr::NAME).and_then(Value::as_str)
    }

    /// The `level` attribute, if it is an integer
    #[must_use]
    pub fn level(&self) -> Option<i64> {
        self.attributes.get(attr::LEVEL).and_then(Value::as_i64)
    }

    /// The `status` attribute, if it is a string
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.attributes.get(attr::STATUS).and_then(Value::as_str)
    }

    /// Architectural layer: the `layer` attribute, falling back to the type tag
    #[must_use]
    pub fn layer(&self) -> &str {
        layer_of(&self.attributes, &self.node_type)
    }

    /// Display label: the name when present, otherwise the id
    #[must_use]
    pub fn label(&self) -> &str {
        self.name().unwrap_or(self.id.as_str())
    }
}

/// Resolve the layer for an attribute map and type tag.
pub(crate) fn layer_of<'a>(attributes: &'a Attributes, node_type: &'a str) -> &'a str {
    attributes
        .get(attr::LAYER)
        .and_then(Value::as_str)
        .unwrap_or(node_type)
}

/// Type of dependency relationship
///
/// Unknown tags are preserved verbatim in [`DependencyType::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencyType {
    /// Inheritance
    Extends,
    /// Direct import
    Import,
    /// Interface implementation
    Implements,
    /// Runtime usage
    Uses,
    /// Generic dependency
    #[default]
    DependsOn,
    /// Any other tag
    Other(String),
}

impl DependencyType {
    /// Coupling weight for this dependency type
    ///
    /// extends=1.0, import=0.9, implements=0.8, uses=0.6, depends_on=0.4, anything else 0.5
    #[must_use]
    pub fn default_strength(&self) -> f64 {
        match self {
            Self::Extends => 1.0,
            Self::Import => 0.9,
            Self::Implements => 0.8,
            Self::Uses => 0.6,
            Self::DependsOn => 0.4,
            Self::Other(_) => 0.5,
        }
    }

    /// The serialized tag
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Extends => "extends",
            Self::Import => "import",
            Self::Implements => "implements",
            Self::Uses => "uses",
            Self::DependsOn => "depends_on",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DependencyType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "extends" => Self::Extends,
            "import" => Self::Import,
            "implements" => Self::Implements,
            "uses" => Self::Uses,
            "depends_on" => Self::DependsOn,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for DependencyType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<DependencyType> for String {
    fn from(t: DependencyType) -> Self {
        match t {
            DependencyType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// A directed, typed, weighted dependency between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The node that depends
    pub from: NodeId,

    /// The node depended upon
    pub to: NodeId,

    /// Dependency type
    pub dep_type: DependencyType,

    /// Coupling weight in [0, 1]
    pub strength: f64,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Attributes>,
}

/// Clamp a score into [0, 1]; NaN becomes 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Kind of change applied to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Node creation
    Create,
    /// Attribute update
    Update,
    /// Node removal
    Delete,
    /// Relocation in the hierarchy
    Move,
}

impl ChangeKind {
    /// Factor applied to dependency strength when scoring impact
    #[must_use]
    pub fn impact_multiplier(self) -> f64 {
        match self {
            Self::Delete => 1.5,
            Self::Move => 0.8,
            Self::Create | Self::Update => 1.0,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Move => write!(f, "move"),
        }
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "move" => Ok(Self::Move),
            other => Err(format!("unknown change kind '{other}'")),
        }
    }
}

/// Which side of a node's edges to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// Edges pointing at the node (its dependents)
    Incoming,
    /// Edges leaving the node (its dependencies)
    Outgoing,
}

impl From<EdgeDirection> for petgraph::Direction {
    fn from(d: EdgeDirection) -> Self {
        match d {
            EdgeDirection::Incoming => petgraph::Direction::Incoming,
            EdgeDirection::Outgoing => petgraph::Direction::Outgoing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::extends("extends", 1.0)]
    #[case::import("import", 0.9)]
    #[case::implements("implements", 0.8)]
    #[case::uses("uses", 0.6)]
    #[case::depends_on("depends_on", 0.4)]
    #[case::unknown("calls", 0.5)]
    fn test_default_strength(#[case] tag: &str, #[case] expected: f64) {
        assert!((DependencyType::from(tag).default_strength() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dependency_type_serializes_as_plain_tag() {
        let json = serde_json::to_string(&DependencyType::DependsOn).unwrap();
        assert_eq!(json, "\"depends_on\"");

        let other: DependencyType = serde_json::from_str("\"publishes_to\"").unwrap();
        assert_eq!(other, DependencyType::Other("publishes_to".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"publishes_to\"");
    }

    #[test]
    fn test_layer_falls_back_to_type() {
        let mut node = Node::new("n1", "service", Attributes::new());
        assert_eq!(node.layer(), "service");

        node.attributes.insert(attr::LAYER.into(), json!("ui"));
        assert_eq!(node.layer(), "ui");
    }

    #[rstest]
    #[case::delete(ChangeKind::Delete, 1.5)]
    #[case::update(ChangeKind::Update, 1.0)]
    #[case::move_(ChangeKind::Move, 0.8)]
    fn test_impact_multiplier(#[case] kind: ChangeKind, #[case] expected: f64) {
        assert!((kind.impact_multiplier() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clamp_unit() {
        assert!((clamp_unit(1.35) - 1.0).abs() < f64::EPSILON);
        assert!(clamp_unit(-0.2).abs() < f64::EPSILON);
        assert!(clamp_unit(f64::NAN).abs() < f64::EPSILON);
    }
}
