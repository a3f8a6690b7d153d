//! Output formatting for CLI commands.
//!
//! Every command renders either human-readable text or pretty JSON. Text
//! renderers take a generic writer so they can be tested against a buffer.

pub mod color;

use crate::analysis::ImpactResult;
use crate::domain::{DependencyEdge, Node, NodeId};
use crate::monitor::Alert;
use crate::plan::PlanOutcome;
use crate::rules::RuleReport;
use crate::simulation::Simulation;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use color::{error, info, success, warning};

use color::{bold, colorize_risk, colorize_severity, dimmed};

// ============================================================================
// Output Configuration
// ============================================================================

/// Configuration for output formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create an OutputConfig by reading from environment variables.
    ///
    /// Reads:
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `ARCHGRAPH_COLOR`: Set to "0" or "false" to disable colors (default: true)
    pub fn from_env() -> Self {
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("ARCHGRAPH_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);

        Self { use_colors }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

fn render<T, F>(value: &T, mode: OutputMode, text: F) -> io::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&mut io::StdoutLock<'_>, &OutputConfig) -> io::Result<()>,
{
    match mode {
        OutputMode::Json => print_json(&value),
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            text(&mut handle, &OutputConfig::from_env())
        }
    }
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print nodes with their outgoing dependencies
pub fn print_nodes(nodes: &[(Node, Vec<DependencyEdge>)], mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            let value: Vec<_> = nodes
                .iter()
                .map(|(node, deps)| serde_json::json!({ "node": node, "dependencies": deps }))
                .collect();
            print_json(&value)
        }
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_nodes(&mut handle, nodes, &OutputConfig::from_env())
        }
    }
}

/// Print detected cycles
pub fn print_cycles(cycles: &[Vec<NodeId>], mode: OutputMode) -> io::Result<()> {
    render(cycles, mode, |w, config| write_cycles(w, cycles, config))
}

/// Print an impact analysis
pub fn print_impact(impact: &ImpactResult, mode: OutputMode) -> io::Result<()> {
    render(impact, mode, |w, config| write_impact(w, impact, config))
}

/// Print dependency or dependent chains
pub fn print_chains(chains: &[Vec<NodeId>], mode: OutputMode) -> io::Result<()> {
    render(chains, mode, |w, config| write_chains(w, chains, config))
}

/// Print a simulation
pub fn print_simulation(simulation: &Simulation, mode: OutputMode) -> io::Result<()> {
    render(simulation, mode, |w, config| {
        write_simulation(w, simulation, config)
    })
}

/// Print a whole-graph rule report
pub fn print_rule_report(report: &RuleReport, mode: OutputMode) -> io::Result<()> {
    render(report, mode, |w, config| write_rule_report(w, report, config))
}

/// Print the outcome of a plan
pub fn print_plan_outcome(outcome: &PlanOutcome, mode: OutputMode) -> io::Result<()> {
    render(outcome, mode, |w, config| write_plan_outcome(w, outcome, config))
}

/// Print health alerts
pub fn print_alerts(alerts: &[Alert], mode: OutputMode) -> io::Result<()> {
    render(alerts, mode, |w, config| write_alerts(w, alerts, config))
}

// ============================================================================
// Text Formatting
// ============================================================================

fn write_nodes<W: Write>(
    w: &mut W,
    nodes: &[(Node, Vec<DependencyEdge>)],
    config: &OutputConfig,
) -> io::Result<()> {
    if nodes.is_empty() {
        return writeln!(w, "No modules found.");
    }

    for (node, deps) in nodes {
        writeln!(
            w,
            "{} {} {}",
            info(node.id.as_str(), config),
            bold(node.label(), config),
            dimmed(&format!("[{}]", node.node_type), config)
        )?;
        for dep in deps {
            writeln!(
                w,
                "  -> {} ({}, {:.2})",
                info(dep.to.as_str(), config),
                dep.dep_type,
                dep.strength
            )?;
        }
    }
    Ok(())
}

fn write_cycles<W: Write>(w: &mut W, cycles: &[Vec<NodeId>], config: &OutputConfig) -> io::Result<()> {
    if cycles.is_empty() {
        return writeln!(w, "{}", success("No circular dependencies.", config));
    }

    writeln!(
        w,
        "{}",
        error(&format!("{} circular dependenc(ies):", cycles.len()), config)
    )?;
    for cycle in cycles {
        writeln!(w, "  {}", join_path(cycle))?;
    }
    Ok(())
}

fn write_impact<W: Write>(w: &mut W, impact: &ImpactResult, config: &OutputConfig) -> io::Result<()> {
    writeln!(
        w,
        "{} {} ({})",
        bold("Impact of", config),
        info(impact.target.as_str(), config),
        impact.change_kind
    )?;

    if impact.impact_scores.is_empty() {
        writeln!(w, "  No dependents affected.")?;
    }
    for score in &impact.impact_scores {
        writeln!(
            w,
            "  {:<24} {:.2} {}",
            score.node_id.as_str(),
            score.score,
            dimmed(&format!("via {}", score.dependency_type), config)
        )?;
    }

    if !impact.propagation_paths.is_empty() {
        writeln!(w, "{}", bold("Propagation:", config))?;
        for path in &impact.propagation_paths {
            writeln!(w, "  {}", join_path(path))?;
        }
    }

    for rec in &impact.recommendations {
        writeln!(w, "{} {rec}", warning("!", config))?;
    }
    Ok(())
}

fn write_chains<W: Write>(w: &mut W, chains: &[Vec<NodeId>], config: &OutputConfig) -> io::Result<()> {
    if chains.is_empty() {
        return writeln!(w, "No chains.");
    }
    for chain in chains {
        writeln!(w, "  {}", info(&join_path(chain), config))?;
    }
    Ok(())
}

fn write_simulation<W: Write>(
    w: &mut W,
    simulation: &Simulation,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {} of {}",
        bold("Simulated", config),
        simulation.change_kind,
        info(simulation.target.as_str(), config)
    )?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Risk:", config),
        colorize_risk(simulation.risk_level, config)
    )?;
    writeln!(
        w,
        "  {} {:.0}%",
        dimmed("Success probability:", config),
        simulation.success_probability * 100.0
    )?;
    writeln!(
        w,
        "  {} {}",
        dimmed("Affected:", config),
        simulation.affected_nodes.len()
    )?;

    for effect in &simulation.side_effects {
        writeln!(w, "  - {effect}")?;
    }
    for violation in &simulation.validation.violations {
        writeln!(
            w,
            "  {} {}: {}",
            error("x", config),
            violation.rule,
            violation.message
        )?;
    }
    for rec in &simulation.recommendations {
        writeln!(w, "  {} {rec}", warning("!", config))?;
    }
    Ok(())
}

fn write_rule_report<W: Write>(w: &mut W, report: &RuleReport, config: &OutputConfig) -> io::Result<()> {
    if report.valid && report.warnings.is_empty() {
        return writeln!(
            w,
            "{} ({} rule(s) passed)",
            success("Architecture is valid", config),
            report.passed_rules.len()
        );
    }

    for violation in &report.errors {
        writeln!(
            w,
            "{} [{}] {}: {}",
            error("error", config),
            violation.rule,
            info(violation.node_id.as_str(), config),
            violation.message
        )?;
    }
    for violation in &report.warnings {
        writeln!(
            w,
            "{} [{}] {}: {}",
            warning("warning", config),
            violation.rule,
            info(violation.node_id.as_str(), config),
            violation.message
        )?;
    }
    writeln!(
        w,
        "{} error(s), {} warning(s), {} rule(s) failed",
        report.errors.len(),
        report.warnings.len(),
        report.failed_rules.len()
    )
}

fn write_plan_outcome<W: Write>(
    w: &mut W,
    outcome: &PlanOutcome,
    config: &OutputConfig,
) -> io::Result<()> {
    let status = outcome.status.to_string();
    let status = if outcome.is_success() {
        success(&status, config)
    } else {
        error(&status, config)
    };
    writeln!(w, "{} {status}", bold("Plan", config))?;

    writeln!(
        w,
        "  created {} node(s), updated {}, deleted {}, {} dependenc(ies)",
        outcome.nodes_created,
        outcome.nodes_updated,
        outcome.nodes_deleted,
        outcome.dependencies_created
    )?;
    if let Some(snapshot) = &outcome.snapshot_id {
        writeln!(w, "  {} {}", dimmed("Snapshot:", config), info(snapshot, config))?;
    }

    for structural in &outcome.structural_errors {
        writeln!(w, "  {} {structural}", error("x", config))?;
    }
    for failure in &outcome.failures {
        writeln!(
            w,
            "  {} step {} ({}): {}",
            error("x", config),
            failure.index,
            failure.action,
            failure.message
        )?;
    }
    if outcome.rollback_performed {
        writeln!(w, "  {}", warning("Rolled back to pre-plan snapshot", config))?;
    }
    for warn in &outcome.sync_warnings {
        writeln!(
            w,
            "  {} {} {}: {}",
            warning("sync", config),
            warn.operation,
            warn.target,
            warn.message
        )?;
    }
    Ok(())
}

fn write_alerts<W: Write>(w: &mut W, alerts: &[Alert], config: &OutputConfig) -> io::Result<()> {
    if alerts.is_empty() {
        return writeln!(w, "{}", success("Healthy.", config));
    }
    for alert in alerts {
        writeln!(
            w,
            "{} {}: {}",
            colorize_severity(alert.severity, config),
            bold(&alert.title, config),
            alert.message
        )?;
        for action in &alert.actions {
            writeln!(w, "    - {action}")?;
        }
    }
    Ok(())
}

fn join_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
