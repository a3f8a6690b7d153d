//! CLI argument structs for all commands.

use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

use super::types::{ChangeKindArg, DependencyTypeArg};
use super::validators::{parse_attribute, validate_node_id, validate_project};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Project id the repository models
    ///
    /// 2-40 characters: letters, digits, '-' or '_'.
    #[arg(short, long, value_parser = validate_project)]
    pub project: Option<String>,

    /// Suppress output messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `cycles` command
#[derive(Parser, Debug, Clone)]
pub struct CyclesArgs {
    /// Only follow dependencies of this type
    #[arg(short = 't', long = "type", value_enum)]
    pub dep_type: Option<DependencyTypeArg>,
}

/// Arguments for the `impact` command
#[derive(Parser, Debug, Clone)]
pub struct ImpactArgs {
    /// Node to analyze
    #[arg(value_parser = validate_node_id)]
    pub node: String,

    /// Kind of change
    #[arg(short, long, value_enum, default_value = "update")]
    pub change: ChangeKindArg,
}

/// Arguments for the `chains` command
#[derive(Parser, Debug, Clone)]
pub struct ChainsArgs {
    /// Node to start from
    #[arg(value_parser = validate_node_id)]
    pub node: String,

    /// Maximum number of hops (configured default when omitted)
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Follow dependents instead of dependencies
    #[arg(long)]
    pub dependents: bool,
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Node to change
    #[arg(value_parser = validate_node_id)]
    pub node: String,

    /// Kind of change
    #[arg(short, long, value_enum, default_value = "update")]
    pub change: ChangeKindArg,

    /// Proposed attribute values (repeatable, key=value)
    #[arg(long = "set", value_parser = parse_attribute)]
    pub set: Vec<(String, Value)>,
}

/// Arguments for the `apply` command
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Plan file (YAML or JSON)
    pub plan_file: PathBuf,

    /// Apply to a scratch copy and discard the result
    #[arg(long)]
    pub dry_run: bool,

    /// Do not take a snapshot before applying
    #[arg(long)]
    pub no_snapshot: bool,

    /// Skip rule evaluation (structural checks still run)
    #[arg(long)]
    pub no_validate: bool,

    /// Recorded as the author of the changes
    #[arg(long)]
    pub actor: Option<String>,
}
