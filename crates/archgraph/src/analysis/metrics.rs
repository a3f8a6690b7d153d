//! Coupling and complexity metrics.

use super::DependencyAnalyzer;
use crate::domain::{NodeId, clamp_unit};
use crate::error::Result;
use serde::{Deserialize, Serialize};

const MAX_HOTSPOTS: usize = 5;

/// Coupling profile of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingReport {
    /// Node analyzed
    pub node_id: NodeId,
    /// Outgoing edge count
    pub direct_dependencies: usize,
    /// Incoming edge count
    pub dependents: usize,
    /// Number of dependency chains
    pub chain_count: usize,
    /// Longest dependency chain, in hops
    pub max_chain_depth: usize,
    /// Mean strength of outgoing edges, in [0, 1]
    pub coupling_score: f64,
    /// Whether many nodes depend on this one
    pub is_critical: bool,
}

/// A node with unusually many edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    /// The node
    pub node_id: NodeId,
    /// Incoming plus outgoing edges
    pub total_dependencies: usize,
    /// `min(10, total / 2)`
    pub complexity_score: f64,
    /// Why the node was flagged
    pub reason: String,
}

/// Whole-graph complexity on a 0..10 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    /// Number of nodes
    pub module_count: usize,
    /// Number of edges
    pub dependency_count: usize,
    /// Edges per node
    pub avg_dependencies: f64,
    /// Highest outgoing edge count of any node
    pub max_dependencies: usize,
    /// Deepest hierarchy level
    pub max_depth: i64,
    /// 10 for loosely coupled graphs, falling as edges accumulate
    pub coupling_score: f64,
    /// Edges plus nodes
    pub cyclomatic: usize,
    /// Up to five most connected outliers
    pub hotspots: Vec<Hotspot>,
    /// Combined score, capped at 10
    pub overall: f64,
}

impl DependencyAnalyzer<'_> {
    /// Coupling profile of `node`.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::NodeNotFound`] if the node does not exist.
    pub fn coupling(&self, node: &NodeId) -> Result<CouplingReport> {
        let dependencies = self.get_dependencies(node)?;
        let dependents = self.get_dependents(node)?.len();
        let chains = self.dependency_chains(node, self.config.chain_depth)?;

        #[allow(clippy::cast_precision_loss)]
        let coupling_score = if dependencies.is_empty() {
            0.0
        } else {
            clamp_unit(
                dependencies.iter().map(|e| e.strength).sum::<f64>() / dependencies.len() as f64,
            )
        };

        Ok(CouplingReport {
            node_id: node.clone(),
            direct_dependencies: dependencies.len(),
            dependents,
            chain_count: chains.len(),
            max_chain_depth: chains.iter().map(|c| c.len().saturating_sub(1)).max().unwrap_or(0),
            coupling_score,
            is_critical: dependents > self.config.critical_dependent_count,
        })
    }

    /// Complexity metrics for the whole graph
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn complexity(&self) -> ComplexityReport {
        let store = self.store;
        let module_count = store.node_count();
        let dependency_count = store.edge_count();
        let avg_dependencies = if module_count == 0 {
            0.0
        } else {
            dependency_count as f64 / module_count as f64
        };

        let nodes = store.all_nodes();
        let max_depth = nodes.iter().filter_map(|n| n.level()).max().unwrap_or(0).max(0);
        let max_dependencies = nodes
            .iter()
            .map(|n| store.out_degree(&n.id))
            .max()
            .unwrap_or(0);

        let mut hotspots: Vec<Hotspot> = nodes
            .iter()
            .filter_map(|node| {
                let total = store.out_degree(&node.id) + store.in_degree(&node.id);
                (total as f64 > avg_dependencies * 2.0 && total > 0).then(|| Hotspot {
                    node_id: node.id.clone(),
                    total_dependencies: total,
                    complexity_score: (total as f64 / 2.0).min(10.0),
                    reason: format!("High coupling: {total} dependencies"),
                })
            })
            .collect();
        hotspots.sort_by(|a, b| {
            b.total_dependencies
                .cmp(&a.total_dependencies)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        let hotspot_count = hotspots.len();
        hotspots.truncate(MAX_HOTSPOTS);

        let overall = (module_count as f64 / 50.0 * 3.0
            + avg_dependencies / 5.0 * 3.0
            + max_depth as f64 / 5.0 * 2.0
            + hotspot_count as f64 / 5.0 * 2.0)
            .min(10.0);

        ComplexityReport {
            module_count,
            dependency_count,
            avg_dependencies,
            max_dependencies,
            max_depth,
            coupling_score: (10.0 - avg_dependencies * 0.5).clamp(0.0, 10.0),
            cyclomatic: dependency_count + module_count,
            hotspots,
            overall,
        }
    }
}
