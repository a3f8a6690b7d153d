//! Read-only analyses over a [`GraphStore`].
//!
//! - Cycle detection (DFS with an explicit recursion stack)
//! - Dependents/dependencies lookup
//! - Impact scoring for a proposed change
//! - Propagation paths and dependency chains
//! - Coupling and complexity metrics

mod impact;
mod metrics;

pub use impact::{ImpactResult, ImpactScore};
pub use metrics::{ComplexityReport, CouplingReport, Hotspot};

use crate::config::AnalysisConfig;
use crate::domain::{DependencyEdge, DependencyType, NodeId};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyses bound to one store and one set of thresholds
#[derive(Debug, Clone, Copy)]
pub struct DependencyAnalyzer<'a> {
    store: &'a GraphStore,
    config: &'a AnalysisConfig,
}

impl<'a> DependencyAnalyzer<'a> {
    /// Create an analyzer over `store`
    #[must_use]
    pub fn new(store: &'a GraphStore, config: &'a AnalysisConfig) -> Self {
        Self { store, config }
    }

    /// The analyzed store
    #[must_use]
    pub fn store(&self) -> &'a GraphStore {
        self.store
    }

    /// Every distinct cycle in the graph.
    ///
    /// Each cycle starts and ends with the same node. A cycle is reported once
    /// regardless of which of its nodes the traversal entered it from.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        self.detect_cycles_by(|_| true)
    }

    /// Cycles formed only by edges whose type passes `filter`
    #[must_use]
    pub fn detect_cycles_by(&self, filter: impl Fn(&DependencyType) -> bool) -> Vec<Vec<NodeId>> {
        let graph = self.store.graph();
        let successors = |index: NodeIndex| -> Vec<NodeIndex> {
            graph
                .edges_directed(index, Direction::Outgoing)
                .filter(|edge| filter(&edge.weight().dep_type))
                .map(|edge| edge.target())
                .collect()
        };

        let mut cycles = Vec::new();
        let mut seen: HashSet<Vec<NodeIndex>> = HashSet::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();

        for start in graph.node_indices() {
            if visited.contains(&start) {
                continue;
            }

            let mut path: Vec<NodeIndex> = vec![start];
            let mut on_stack: HashMap<NodeIndex, usize> = HashMap::from([(start, 0)]);
            let mut frames: Vec<(Vec<NodeIndex>, usize)> = vec![(successors(start), 0)];
            visited.insert(start);

            while let Some((next, cursor)) = frames.last_mut() {
                let Some(&target) = next.get(*cursor) else {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        on_stack.remove(&done);
                    }
                    continue;
                };
                *cursor += 1;

                if let Some(&position) = on_stack.get(&target) {
                    let cycle = &path[position..];
                    if seen.insert(canonical_rotation(cycle)) {
                        let mut ids: Vec<NodeId> =
                            cycle.iter().map(|&i| graph[i].clone()).collect();
                        ids.push(graph[target].clone());
                        cycles.push(ids);
                    }
                } else if visited.insert(target) {
                    on_stack.insert(target, path.len());
                    path.push(target);
                    frames.push((successors(target), 0));
                }
            }
        }

        if !cycles.is_empty() {
            tracing::debug!(count = cycles.len(), "Detected dependency cycles");
        }
        cycles
    }

    /// The cycle that a new edge `from -> to` would close, if any.
    ///
    /// The returned path starts and ends at `from`: `[from, to, ..., from]`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if either node does not exist.
    pub fn find_cycle_path(&self, from: &NodeId, to: &NodeId) -> Result<Option<Vec<NodeId>>> {
        let graph = self.store.graph();
        let start = self.index(to)?;
        let goal = self.index(from)?;

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut reversed = vec![current];
                let mut cursor = current;
                while let Some(&parent) = parents.get(&cursor) {
                    reversed.push(parent);
                    cursor = parent;
                }
                let mut path = vec![from.clone()];
                path.extend(reversed.into_iter().rev().map(|i| graph[i].clone()));
                return Ok(Some(path));
            }
            for neighbor in graph.neighbors_directed(current, Direction::Outgoing) {
                if visited.insert(neighbor) {
                    parents.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
        }

        Ok(None)
    }

    /// Edges from nodes depending on `node`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn get_dependents(&self, node: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.store.dependents(node)
    }

    /// Edges to nodes that `node` depends on.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn get_dependencies(&self, node: &NodeId) -> Result<Vec<DependencyEdge>> {
        self.store.dependencies(node)
    }

    /// Chains of dependents reachable from `node`, at most `max_depth` hops long.
    ///
    /// A chain ends when it reaches a node without further dependents, when
    /// every further dependent is already on the chain, or at the depth limit.
    /// A node nobody depends on yields the single chain `[node]`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn propagation_paths(&self, node: &NodeId, max_depth: usize) -> Result<Vec<Vec<NodeId>>> {
        self.walk_paths(node, max_depth, Direction::Incoming)
    }

    /// Chains of dependencies `node` requires, at most `max_depth` hops long.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node does not exist.
    pub fn dependency_chains(&self, node: &NodeId, max_depth: usize) -> Result<Vec<Vec<NodeId>>> {
        self.walk_paths(node, max_depth, Direction::Outgoing)
    }

    fn walk_paths(
        &self,
        node: &NodeId,
        max_depth: usize,
        direction: Direction,
    ) -> Result<Vec<Vec<NodeId>>> {
        let start = self.index(node)?;
        let mut paths = Vec::new();
        let mut path = vec![start];
        self.extend_path(&mut path, max_depth, direction, &mut paths);

        let graph = self.store.graph();
        Ok(paths
            .into_iter()
            .map(|p| p.into_iter().map(|i| graph[i].clone()).collect())
            .collect())
    }

    fn extend_path(
        &self,
        path: &mut Vec<NodeIndex>,
        max_depth: usize,
        direction: Direction,
        paths: &mut Vec<Vec<NodeIndex>>,
    ) {
        let Some(&current) = path.last() else {
            return;
        };

        let mut next: Vec<NodeIndex> = Vec::new();
        if path.len() <= max_depth {
            for neighbor in self.store.graph().neighbors_directed(current, direction) {
                if !path.contains(&neighbor) && !next.contains(&neighbor) {
                    next.push(neighbor);
                }
            }
        }

        if next.is_empty() {
            paths.push(path.clone());
            return;
        }

        for neighbor in next {
            path.push(neighbor);
            self.extend_path(path, max_depth, direction, paths);
            path.pop();
        }
    }

    fn index(&self, id: &NodeId) -> Result<NodeIndex> {
        self.store
            .index_of(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }
}

/// Rotate a cycle so its smallest index comes first.
fn canonical_rotation(cycle: &[NodeIndex]) -> Vec<NodeIndex> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, index)| **index)
        .map_or(0, |(position, _)| position);
    cycle[pivot..].iter().chain(&cycle[..pivot]).copied().collect()
}
