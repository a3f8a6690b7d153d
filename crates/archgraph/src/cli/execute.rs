//! Command execution logic.
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{Context, Result};

use super::args::{ApplyArgs, ChainsArgs, CyclesArgs, ImpactArgs, InitArgs, SimulateArgs};
use crate::app::App;
use crate::domain::{Attributes, EdgeDirection, NodeId};
use crate::output::{self, OutputMode};
use crate::plan::{ExecuteOptions, Plan};

/// Execute the init command
pub async fn execute_init(args: &InitArgs) -> Result<()> {
    use crate::commands::init;

    let current_dir = std::env::current_dir()?;

    if !args.quiet {
        println!(
            "Initializing archgraph repository{}...",
            args.project
                .as_ref()
                .map(|p| format!(" for project '{p}'"))
                .unwrap_or_default()
        );
    }

    let result = init::init(&current_dir, args.project.as_deref()).await?;

    if !args.quiet {
        println!("Initialized archgraph in {}", result.archgraph_dir.display());
        println!("  Config: {}", result.config_file.display());
        println!("  Data: {}", result.data_file.display());
        println!("  Project: {}", result.project);
    }

    Ok(())
}

/// Execute the info command
pub async fn execute_info(app: &App, output_mode: OutputMode) -> Result<()> {
    let engine = app.engine();
    let (modules, dependencies) = engine.counts().await;
    let rules = engine.rules().await.len();
    let warnings = engine.hydration_warnings().await;

    match output_mode {
        OutputMode::Json => {
            output::print_json(&serde_json::json!({
                "archgraph_dir": app.archgraph_dir().display().to_string(),
                "project": app.project(),
                "modules": modules,
                "dependencies": dependencies,
                "rules": rules,
                "hydration_warnings": warnings,
            }))?;
        }
        OutputMode::Text => {
            println!("Archgraph directory: {}", app.archgraph_dir().display());
            println!("Project: {}", app.project());
            println!();
            println!("Modules:      {modules}");
            println!("Dependencies: {dependencies}");
            println!("Rules:        {rules}");
            if !warnings.is_empty() {
                println!();
                println!("{} record(s) skipped while loading:", warnings.len());
                for warning in &warnings {
                    println!("  {}", serde_json::to_string(warning)?);
                }
            }
        }
    }

    Ok(())
}

/// Execute the nodes command
pub async fn execute_nodes(app: &App, output_mode: OutputMode) -> Result<()> {
    let engine = app.engine();
    let mut listed = Vec::new();
    for node in engine.all_nodes().await {
        let deps = engine
            .get_dependencies(&node.id, EdgeDirection::Outgoing)
            .await?;
        listed.push((node, deps));
    }

    output::print_nodes(&listed, output_mode)?;
    Ok(())
}

/// Execute the cycles command
pub async fn execute_cycles(app: &App, args: &CyclesArgs, output_mode: OutputMode) -> Result<()> {
    let cycles = match args.dep_type {
        Some(dep_type) => app.engine().detect_cycles_of(&dep_type.into()).await,
        None => app.engine().detect_cycles().await,
    };

    output::print_cycles(&cycles, output_mode)?;
    Ok(())
}

/// Execute the impact command
pub async fn execute_impact(app: &App, args: &ImpactArgs, output_mode: OutputMode) -> Result<()> {
    let impact = app
        .engine()
        .impact_analysis(&NodeId::from(args.node.as_str()), args.change.into())
        .await?;

    output::print_impact(&impact, output_mode)?;
    Ok(())
}

/// Execute the chains command
pub async fn execute_chains(app: &App, args: &ChainsArgs, output_mode: OutputMode) -> Result<()> {
    let id = NodeId::from(args.node.as_str());
    let chains = if args.dependents {
        app.engine().propagation_paths(&id, args.depth).await?
    } else {
        app.engine().dependency_chains(&id, args.depth).await?
    };

    output::print_chains(&chains, output_mode)?;
    Ok(())
}

/// Execute the simulate command
pub async fn execute_simulate(
    app: &App,
    args: &SimulateArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let proposed: Attributes = args.set.iter().cloned().collect();
    let simulation = app
        .engine()
        .simulate(&NodeId::from(args.node.as_str()), args.change.into(), proposed)
        .await?;

    output::print_simulation(&simulation, output_mode)?;
    Ok(())
}

/// Execute the validate command
pub async fn execute_validate(app: &App, output_mode: OutputMode) -> Result<()> {
    let report = app.engine().validate_rules().await;
    output::print_rule_report(&report, output_mode)?;

    if !report.valid {
        anyhow::bail!("{} rule violation(s)", report.errors.len());
    }
    Ok(())
}

/// Execute the apply command
pub async fn execute_apply(app: &App, args: &ApplyArgs, output_mode: OutputMode) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.plan_file)
        .await
        .with_context(|| format!("Failed to read plan file {}", args.plan_file.display()))?;
    let plan = Plan::parse(&content)?;

    let options = ExecuteOptions {
        validate: !args.no_validate,
        dry_run: args.dry_run,
        create_snapshot: !args.no_snapshot && !args.dry_run,
        actor: args.actor.clone(),
        impact_block_threshold: None,
    };

    tracing::debug!(
        steps = plan.len(),
        dry_run = options.dry_run,
        "Applying plan"
    );

    let outcome = app.engine().execute_plan(&plan, &options).await?;
    output::print_plan_outcome(&outcome, output_mode)?;

    if !outcome.is_success() {
        anyhow::bail!("Plan {}", outcome.status);
    }
    Ok(())
}

/// Execute the health command
pub async fn execute_health(app: &App, output_mode: OutputMode) -> Result<()> {
    let alerts = app.engine().check_health().await;
    output::print_alerts(&alerts, output_mode)?;
    Ok(())
}
