//! Health checks that raise alerts.

use crate::analysis::DependencyAnalyzer;
use crate::config::EngineConfig;
use crate::graph::GraphStore;
use crate::persistence::HydrationWarning;
use crate::rules::RuleEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The graph contains dependency cycles
    CircularDependencies,
    /// Overall complexity exceeds the configured threshold
    HighComplexity,
    /// Stored dependencies reference missing modules
    BrokenDependencies,
    /// The graph violates registered rules
    RuleViolations,
}

/// Alert urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Worth a look
    Warning,
    /// Something is wrong
    Error,
    /// Requires immediate attention
    Critical,
}

/// A problem found by a health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// What was found
    pub kind: AlertKind,
    /// How urgent it is
    pub severity: AlertSeverity,
    /// Short title
    pub title: String,
    /// Details
    pub message: String,
    /// Suggested next steps
    pub actions: Vec<String>,
    /// When the check ran
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        title: &str,
        message: String,
        actions: &[&str],
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.to_string(),
            message,
            actions: actions.iter().map(|a| (*a).to_string()).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// Run every health check against the current graph.
///
/// `hydration_warnings` are the records skipped when the project was loaded;
/// broken dependencies among them raise an alert.
#[must_use]
pub fn check_health(
    store: &GraphStore,
    rules: &RuleEngine,
    config: &EngineConfig,
    hydration_warnings: &[HydrationWarning],
) -> Vec<Alert> {
    let analyzer = DependencyAnalyzer::new(store, &config.analysis);
    let mut alerts = Vec::new();

    let cycles = analyzer.detect_cycles();
    if !cycles.is_empty() {
        alerts.push(Alert::new(
            AlertKind::CircularDependencies,
            AlertSeverity::Critical,
            "Circular Dependencies Detected",
            format!(
                "Architecture has {} circular dependenc{} - requires immediate attention",
                cycles.len(),
                if cycles.len() == 1 { "y" } else { "ies" }
            ),
            &[
                "Review architecture dependencies",
                "Remove circular references",
                "Validate architecture",
            ],
        ));
    }

    let complexity = analyzer.complexity();
    if complexity.overall > config.monitoring.complexity_threshold {
        alerts.push(Alert::new(
            AlertKind::HighComplexity,
            AlertSeverity::Warning,
            "High Complexity Detected",
            format!(
                "Architecture complexity score {:.1} exceeds {:.1} - consider simplification",
                complexity.overall, config.monitoring.complexity_threshold
            ),
            &[
                "Review complexity dashboard",
                "Identify hotspots",
                "Consider module split",
            ],
        ));
    }

    let broken = hydration_warnings
        .iter()
        .filter(|w| w.is_broken_dependency())
        .count();
    if broken > 0 {
        alerts.push(Alert::new(
            AlertKind::BrokenDependencies,
            AlertSeverity::Error,
            "Broken Dependencies Found",
            format!(
                "{broken} stored dependenc{} reference non-existent modules",
                if broken == 1 { "y" } else { "ies" }
            ),
            &[
                "Review dependencies",
                "Remove broken links",
                "Update module references",
            ],
        ));
    }

    let report = rules.validate_all(store);
    let violation_count = report.errors.len() + report.warnings.len();
    if violation_count > 0 {
        alerts.push(Alert::new(
            AlertKind::RuleViolations,
            AlertSeverity::Warning,
            "Architecture Rule Violations",
            format!(
                "{violation_count} violation(s) of rules: {}",
                report.failed_rules.join(", ")
            ),
            &["Review rules", "Fix violations", "Update architecture"],
        ));
    }

    alerts
}
