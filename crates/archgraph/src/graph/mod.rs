//! Graph store for one project.
//!
//! [`GraphStore`] owns nodes and their directed, typed edges. It enforces only
//! the structural invariants of the graph itself:
//!
//! - both endpoints of an edge exist
//! - no self-referencing edge
//! - no duplicate `(from, to, type)` triple
//! - removing a node removes every incident edge
//!
//! Cycle checks, rule evaluation and persistence are layered on top by the
//! plan executor.
//!
//! The adjacency structure is a petgraph `StableDiGraph`, so node indices stay
//! valid across removals and the `node_map` never needs rebuilding.

use crate::domain::{Attributes, DependencyEdge, DependencyType, EdgeDirection, Node, NodeId, clamp_unit};
use crate::error::{Error, Result};
use petgraph::Direction;
use petgraph::algo;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;

/// Weight stored on each petgraph edge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EdgeData {
    pub(crate) dep_type: DependencyType,
    pub(crate) strength: f64,
    pub(crate) metadata: Option<Attributes>,
}

/// Nodes and dependency edges of a single project.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    /// Node payloads by id
    nodes: HashMap<NodeId, Node>,

    /// Dependency graph (from depends on to)
    graph: StableDiGraph<NodeId, EdgeData>,

    /// Map from node ID to graph node index
    node_map: HashMap<NodeId, NodeIndex>,
}

/// Canonical, order-independent view of a store, used for equality checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphState {
    /// Nodes sorted by id
    pub nodes: Vec<Node>,
    /// Edges sorted by (from, to, type)
    pub edges: Vec<DependencyEdge>,
}

impl GraphStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the store holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a node with this id exists
    #[must_use]
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Add a node.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateNode`] if the id is taken.
    pub fn add_node(
        &mut self,
        id: NodeId,
        node_type: impl Into<String>,
        attributes: Attributes,
    ) -> Result<&Node> {
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateNode(id));
        }

        let index = self.graph.add_node(id.clone());
        self.node_map.insert(id.clone(), index);
        let node = Node {
            id: id.clone(),
            node_type: node_type.into(),
            attributes,
        };
        Ok(self.nodes.entry(id).or_insert(node))
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns the removed node together with the edges that went with it.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(Node, Vec<DependencyEdge>)> {
        let index = *self
            .node_map
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;

        let mut removed_edges = self.collect_edges(index, Direction::Outgoing);
        removed_edges.extend(self.collect_edges(index, Direction::Incoming));

        self.graph.remove_node(index);
        self.node_map.remove(id);
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;

        Ok((node, removed_edges))
    }

    /// Merge `attributes` into a node's attribute map.
    ///
    /// Keys absent from `attributes` keep their current value. Returns the
    /// attribute maps before and after the merge.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn update_node(
        &mut self,
        id: &NodeId,
        attributes: Attributes,
    ) -> Result<(Attributes, Attributes)> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;

        let old = node.attributes.clone();
        node.attributes.extend(attributes);
        Ok((old, node.attributes.clone()))
    }

    /// Add a dependency edge.
    ///
    /// `strength` defaults to the type's coupling weight and is clamped to [0, 1].
    ///
    /// # Errors
    ///
    /// - [`Error::SelfReference`] if `from == to`
    /// - [`Error::NodeNotFound`] if either endpoint is missing
    /// - [`Error::DuplicateEdge`] if the same `(from, to, type)` already exists
    pub fn add_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        dep_type: DependencyType,
        strength: Option<f64>,
    ) -> Result<DependencyEdge> {
        let strength = strength.unwrap_or_else(|| dep_type.default_strength());
        self.insert_edge(DependencyEdge {
            from: from.clone(),
            to: to.clone(),
            dep_type,
            strength,
            metadata: None,
        })
    }

    /// Add a fully specified edge, subject to the same checks as [`Self::add_edge`].
    ///
    /// # Errors
    ///
    /// See [`Self::add_edge`].
    pub fn insert_edge(&mut self, edge: DependencyEdge) -> Result<DependencyEdge> {
        if edge.from == edge.to {
            return Err(Error::SelfReference(edge.from));
        }
        let from_index = self.index(&edge.from)?;
        let to_index = self.index(&edge.to)?;

        if self.find_edge(from_index, to_index, &edge.dep_type).is_some() {
            return Err(Error::DuplicateEdge {
                from: edge.from,
                to: edge.to,
                dep_type: edge.dep_type.to_string(),
            });
        }

        let edge = DependencyEdge {
            strength: clamp_unit(edge.strength),
            ..edge
        };
        self.graph.add_edge(
            from_index,
            to_index,
            EdgeData {
                dep_type: edge.dep_type.clone(),
                strength: edge.strength,
                metadata: edge.metadata.clone(),
            },
        );
        Ok(edge)
    }

    /// Remove the edge `(from, to, type)`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown endpoints, [`Error::EdgeNotFound`] if
    /// no such edge exists.
    pub fn remove_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        dep_type: &DependencyType,
    ) -> Result<DependencyEdge> {
        let from_index = self.index(from)?;
        let to_index = self.index(to)?;

        let edge_index =
            self.find_edge(from_index, to_index, dep_type)
                .ok_or_else(|| Error::EdgeNotFound {
                    from: from.clone(),
                    to: to.clone(),
                    dep_type: dep_type.to_string(),
                })?;

        let data = self
            .graph
            .remove_edge(edge_index)
            .ok_or_else(|| Error::EdgeNotFound {
                from: from.clone(),
                to: to.clone(),
                dep_type: dep_type.to_string(),
            })?;

        Ok(DependencyEdge {
            from: from.clone(),
            to: to.clone(),
            dep_type: data.dep_type,
            strength: data.strength,
            metadata: data.metadata,
        })
    }

    /// Look up a node
    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up a node, failing with [`Error::NodeNotFound`].
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn node(&self, id: &NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    /// Edges on one side of a node.
    ///
    /// `Outgoing` yields what the node depends on, `Incoming` yields its dependents.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn get_edges(&self, id: &NodeId, direction: EdgeDirection) -> Result<Vec<DependencyEdge>> {
        let index = self.index(id)?;
        Ok(self.collect_edges(index, direction.into()))
    }

    /// Edges from nodes that depend on `id`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn dependents(&self, id: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.get_edges(id, EdgeDirection::Incoming)
    }

    /// Edges to nodes that `id` depends on.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn dependencies(&self, id: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.get_edges(id, EdgeDirection::Outgoing)
    }

    /// Number of outgoing edges of a node (0 for unknown nodes)
    #[must_use]
    pub fn out_degree(&self, id: &NodeId) -> usize {
        self.node_map.get(id).map_or(0, |&index| {
            self.graph.edges_directed(index, Direction::Outgoing).count()
        })
    }

    /// Number of incoming edges of a node (0 for unknown nodes)
    #[must_use]
    pub fn in_degree(&self, id: &NodeId) -> usize {
        self.node_map.get(id).map_or(0, |&index| {
            self.graph.edges_directed(index, Direction::Incoming).count()
        })
    }

    /// All nodes in the store's iteration order
    #[must_use]
    pub fn all_nodes(&self) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter_map(|index| self.nodes.get(&self.graph[index]))
            .collect()
    }

    /// All edges, grouped by source node in iteration order
    #[must_use]
    pub fn all_edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .node_indices()
            .flat_map(|index| self.collect_edges(index, Direction::Outgoing))
            .collect()
    }

    /// Nodes whose `name` attribute equals `name`
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Vec<&Node> {
        self.all_nodes()
            .into_iter()
            .filter(|node| node.name() == Some(name))
            .collect()
    }

    /// Whether `to` is reachable from `from` along dependency edges.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if either node does not exist.
    pub fn has_path(&self, from: &NodeId, to: &NodeId) -> Result<bool> {
        let from_index = self.index(from)?;
        let to_index = self.index(to)?;
        Ok(algo::has_path_connecting(&self.graph, from_index, to_index, None))
    }

    /// Canonical sorted view of the store
    #[must_use]
    pub fn state(&self) -> GraphState {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges = self.all_edges();
        edges.sort_by(|a, b| {
            (&a.from, &a.to, &a.dep_type).cmp(&(&b.from, &b.to, &b.dep_type))
        });

        GraphState { nodes, edges }
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<NodeId, EdgeData> {
        &self.graph
    }

    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    fn index(&self, id: &NodeId) -> Result<NodeIndex> {
        self.index_of(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    fn find_edge(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        dep_type: &DependencyType,
    ) -> Option<EdgeIndex> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .find(|edge| edge.target() == to && &edge.weight().dep_type == dep_type)
            .map(|edge| edge.id())
    }

    fn collect_edges(&self, index: NodeIndex, direction: Direction) -> Vec<DependencyEdge> {
        self.graph
            .edges_directed(index, direction)
            .map(|edge| DependencyEdge {
                from: self.graph[edge.source()].clone(),
                to: self.graph[edge.target()].clone(),
                dep_type: edge.weight().dep_type.clone(),
                strength: edge.weight().strength,
                metadata: edge.weight().metadata.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn attrs(name: &str) -> Attributes {
        let mut map = Attributes::new();
        map.insert("name".to_string(), json!(name));
        map
    }

    fn store_with(ids: &[&str]) -> GraphStore {
        let mut store = GraphStore::new();
        for id in ids {
            store.add_node(NodeId::from(*id), "module", attrs(id)).unwrap();
        }
        store
    }

    #[test]
    fn test_add_and_get_node() {
        let store = store_with(&["api"]);
        let node = store.get_node(&"api".into()).unwrap();
        assert_eq!(node.name(), Some("api"));
        assert_eq!(node.node_type, "module");
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut store = store_with(&["api"]);
        let result = store.add_node("api".into(), "module", Attributes::new());
        assert!(matches!(result, Err(Error::DuplicateNode(_))));
    }

    #[rstest]
    #[case::uses(DependencyType::Uses)]
    #[case::extends(DependencyType::Extends)]
    #[case::custom(DependencyType::Other("calls".to_string()))]
    fn test_self_reference_rejected_for_any_type(#[case] dep_type: DependencyType) {
        let mut store = store_with(&["x"]);
        let result = store.add_edge(&"x".into(), &"x".into(), dep_type, None);
        assert!(matches!(result, Err(Error::SelfReference(id)) if id.as_str() == "x"));
    }

    #[test]
    fn test_duplicate_edge_rejected_but_other_type_allowed() {
        let mut store = store_with(&["a", "b"]);
        store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();

        let dup = store.add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None);
        assert!(matches!(dup, Err(Error::DuplicateEdge { .. })));

        store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Import, None)
            .unwrap();
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut store = store_with(&["a"]);
        let result = store.add_edge(&"a".into(), &"ghost".into(), DependencyType::Uses, None);
        assert!(matches!(result, Err(Error::NodeNotFound(id)) if id.as_str() == "ghost"));
    }

    #[test]
    fn test_strength_defaults_and_clamps() {
        let mut store = store_with(&["a", "b", "c"]);
        let edge = store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Import, None)
            .unwrap();
        assert!((edge.strength - 0.9).abs() < f64::EPSILON);

        let edge = store
            .add_edge(&"a".into(), &"c".into(), DependencyType::Uses, Some(3.0))
            .unwrap();
        assert!((edge.strength - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut store = store_with(&["a", "b", "c"]);
        store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();
        store
            .add_edge(&"b".into(), &"c".into(), DependencyType::Uses, None)
            .unwrap();

        let (node, removed) = store.remove_node(&"b".into()).unwrap();
        assert_eq!(node.id.as_str(), "b");
        assert_eq!(removed.len(), 2);
        assert_eq!(store.edge_count(), 0);

        // Indices of surviving nodes stay valid
        store
            .add_edge(&"a".into(), &"c".into(), DependencyType::Uses, None)
            .unwrap();
        assert!(store.has_path(&"a".into(), &"c".into()).unwrap());
    }

    #[test]
    fn test_update_merges_attributes() {
        let mut store = store_with(&["a"]);
        let mut update = Attributes::new();
        update.insert("status".to_string(), json!("deprecated"));

        let (old, new) = store.update_node(&"a".into(), update).unwrap();
        assert!(!old.contains_key("status"));
        assert_eq!(new.get("name"), Some(&json!("a")));
        assert_eq!(new.get("status"), Some(&json!("deprecated")));
    }

    #[test]
    fn test_get_edges_by_direction() {
        let mut store = store_with(&["db", "s1", "s2"]);
        store
            .add_edge(&"s1".into(), &"db".into(), DependencyType::Uses, None)
            .unwrap();
        store
            .add_edge(&"s2".into(), &"db".into(), DependencyType::Uses, None)
            .unwrap();

        let incoming = store.get_edges(&"db".into(), EdgeDirection::Incoming).unwrap();
        assert_eq!(incoming.len(), 2);
        assert!(incoming.iter().all(|e| e.to.as_str() == "db"));

        let outgoing = store.get_edges(&"s1".into(), EdgeDirection::Outgoing).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(store.out_degree(&"s1".into()), 1);
        assert_eq!(store.in_degree(&"db".into()), 2);
    }

    #[test]
    fn test_remove_edge() {
        let mut store = store_with(&["a", "b"]);
        store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();

        let removed = store
            .remove_edge(&"a".into(), &"b".into(), &DependencyType::Uses)
            .unwrap();
        assert_eq!(removed.dep_type, DependencyType::Uses);

        let missing = store.remove_edge(&"a".into(), &"b".into(), &DependencyType::Uses);
        assert!(matches!(missing, Err(Error::EdgeNotFound { .. })));
    }

    #[test]
    fn test_state_is_order_independent() {
        let mut first = store_with(&["a", "b"]);
        first
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();

        let mut second = store_with(&["b", "a"]);
        second
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();

        assert_eq!(first.state(), second.state());
    }
}
