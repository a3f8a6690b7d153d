//! Impact scoring for a proposed change.

use super::DependencyAnalyzer;
use crate::domain::{ChangeKind, DependencyType, NodeId, clamp_unit};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Impact of a change on one dependent node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactScore {
    /// The dependent node
    pub node_id: NodeId,
    /// Type of the strongest edge from the dependent
    pub dependency_type: DependencyType,
    /// Strength of that edge
    pub strength: f64,
    /// `min(1, strength * multiplier)`
    pub score: f64,
}

/// Outcome of [`DependencyAnalyzer::impact_analysis`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    /// Node being changed
    pub target: NodeId,
    /// Kind of change
    pub change_kind: ChangeKind,
    /// Direct dependents
    pub affected_nodes: Vec<NodeId>,
    /// One score per dependent, highest first
    pub impact_scores: Vec<ImpactScore>,
    /// Dependent chains starting at the target
    pub propagation_paths: Vec<Vec<NodeId>>,
    /// Warnings and suggestions
    pub recommendations: Vec<String>,
}

impl ImpactResult {
    /// Dependents scoring above `threshold`
    #[must_use]
    pub fn above(&self, threshold: f64) -> Vec<&ImpactScore> {
        self.impact_scores
            .iter()
            .filter(|s| s.score > threshold)
            .collect()
    }

    /// Highest score, or 0 when nothing is affected
    #[must_use]
    pub fn max_score(&self) -> f64 {
        self.impact_scores
            .iter()
            .map(|s| s.score)
            .fold(0.0, f64::max)
    }
}

impl DependencyAnalyzer<'_> {
    /// Score the effect of `change_kind` on every direct dependent of `node`.
    ///
    /// A dependent with several edges to `node` is scored by its strongest one.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::NodeNotFound`] if the node does not exist.
    pub fn impact_analysis(&self, node: &NodeId, change_kind: ChangeKind) -> Result<ImpactResult> {
        let multiplier = change_kind.impact_multiplier();
        let mut scores: Vec<ImpactScore> = Vec::new();

        for edge in self.get_dependents(node)? {
            let score = clamp_unit((edge.strength * multiplier).min(1.0));
            match scores.iter_mut().find(|s| s.node_id == edge.from) {
                Some(existing) if existing.score >= score => {}
                Some(existing) => {
                    existing.dependency_type = edge.dep_type;
                    existing.strength = edge.strength;
                    existing.score = score;
                }
                None => scores.push(ImpactScore {
                    node_id: edge.from,
                    dependency_type: edge.dep_type,
                    strength: edge.strength,
                    score,
                }),
            }
        }

        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let affected_nodes: Vec<NodeId> = scores.iter().map(|s| s.node_id.clone()).collect();
        let propagation_paths = self.propagation_paths(node, self.config.propagation_depth)?;

        let mut recommendations = Vec::new();
        let high = scores
            .iter()
            .filter(|s| s.score > self.config.high_impact_threshold)
            .count();
        if high > 0 {
            recommendations.push(format!("HIGH IMPACT: {high} node(s) heavily affected"));
        }
        if change_kind == ChangeKind::Delete {
            recommendations.push("Consider archiving instead of deleting".to_string());
        }
        if affected_nodes.len() > self.config.large_scope_threshold {
            recommendations.push(format!(
                "Large impact scope ({} nodes) - plan carefully",
                affected_nodes.len()
            ));
        }

        tracing::debug!(
            node = %node,
            change = %change_kind,
            affected = affected_nodes.len(),
            high_impact = high,
            "Computed impact"
        );

        Ok(ImpactResult {
            target: node.clone(),
            change_kind,
            affected_nodes,
            impact_scores: scores,
            propagation_paths,
            recommendations,
        })
    }
}
