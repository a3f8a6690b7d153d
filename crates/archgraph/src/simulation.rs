//! Change simulation.
//!
//! [`ChangeSimulator`] combines rule validation with impact analysis to assess
//! a proposed change without applying it.

use crate::analysis::{DependencyAnalyzer, ImpactScore};
use crate::config::AnalysisConfig;
use crate::domain::{Attributes, ChangeKind, NodeId};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::id_generation::IdGenerator;
use crate::rules::{ProposedChange, RuleEngine, Validation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk classification of a simulated change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Small, valid change
    Low,
    /// Wide but shallow impact
    Medium,
    /// Many heavily impacted dependents
    High,
    /// Rules reject the change
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Result of simulating a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    /// Simulation id (`sim-...`)
    pub id: String,
    /// Node being changed
    pub target: NodeId,
    /// Kind of change
    pub change_kind: ChangeKind,
    /// Attributes the change would set
    pub proposed_attributes: Attributes,
    /// Direct dependents
    pub affected_nodes: Vec<NodeId>,
    /// Score per dependent
    pub impact_scores: Vec<ImpactScore>,
    /// Risk classification
    pub risk_level: RiskLevel,
    /// Estimated probability the change succeeds, in [0, 1]
    pub success_probability: f64,
    /// Human readable consequences
    pub side_effects: Vec<String>,
    /// Rule validation of the proposed state
    pub validation: Validation,
    /// Recommendations from impact analysis
    pub recommendations: Vec<String>,
    /// When the simulation ran
    pub created_at: DateTime<Utc>,
}

/// Evaluates proposed changes without committing them
#[derive(Debug, Clone, Copy)]
pub struct ChangeSimulator<'a> {
    store: &'a GraphStore,
    rules: &'a RuleEngine,
    config: &'a AnalysisConfig,
}

impl<'a> ChangeSimulator<'a> {
    /// Create a simulator over a store and its rules
    #[must_use]
    pub fn new(store: &'a GraphStore, rules: &'a RuleEngine, config: &'a AnalysisConfig) -> Self {
        Self {
            store,
            rules,
            config,
        }
    }

    /// Simulate `change_kind` on `node` with `proposed` attributes.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::NodeNotFound`] if the node does not exist, and id
    /// generation failures.
    pub fn simulate(
        &self,
        node: &NodeId,
        change_kind: ChangeKind,
        proposed: Attributes,
    ) -> Result<Simulation> {
        let change = if change_kind == ChangeKind::Delete {
            ProposedChange::Removal
        } else {
            ProposedChange::Attributes(proposed.clone())
        };
        let validation = self.rules.validate(self.store, node, &change)?;
        let impact =
            DependencyAnalyzer::new(self.store, self.config).impact_analysis(node, change_kind)?;

        let high_impact = impact.above(self.config.high_impact_threshold).len();
        let affected = impact.affected_nodes.len();

        let risk_level = if !validation.is_valid {
            RiskLevel::Critical
        } else if high_impact > self.config.high_risk_dependent_count {
            RiskLevel::High
        } else if affected > self.config.large_scope_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let mut success_probability: f64 = 1.0;
        if !validation.is_valid {
            success_probability *= 0.3;
        }
        if !validation.violations.is_empty() {
            success_probability *= 0.7;
        }
        if high_impact > 0 {
            success_probability *= 0.85;
        }

        let mut side_effects: Vec<String> = validation
            .violations
            .iter()
            .map(|v| v.message.clone())
            .collect();
        if affected > 0 {
            side_effects.push(format!("Will affect {affected} dependent nodes"));
        }
        if high_impact > 0 {
            side_effects.push(format!("{high_impact} nodes will be heavily impacted"));
        }

        let id = IdGenerator::with_existing("sim", Vec::<String>::new())
            .generate(&[node.as_str(), &change_kind.to_string()])?;

        tracing::debug!(
            simulation = %id,
            node = %node,
            change = %change_kind,
            risk = %risk_level,
            "Simulated change"
        );

        Ok(Simulation {
            id,
            target: node.clone(),
            change_kind,
            proposed_attributes: proposed,
            affected_nodes: impact.affected_nodes,
            impact_scores: impact.impact_scores,
            risk_level,
            success_probability: success_probability.clamp(0.0, 1.0),
            side_effects,
            validation,
            recommendations: impact.recommendations,
            created_at: Utc::now(),
        })
    }
}
