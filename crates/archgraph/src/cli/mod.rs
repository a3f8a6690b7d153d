//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `init`: Initialize a new archgraph repository
//! - `info`: Show repository and graph summary
//! - `nodes`: List modules with their dependencies
//! - `cycles`: Detect circular dependencies
//! - `impact`: Score the impact of a change on dependents
//! - `chains`: Show dependency or dependent chains
//! - `simulate`: Simulate a change without applying it
//! - `validate`: Check the graph against all rules
//! - `apply`: Execute a plan file atomically
//! - `health`: Run the health checks
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! archgraph init --project shop
//! archgraph apply plan.yaml --dry-run
//! archgraph impact mod-db --change delete
//! archgraph simulate mod-api --set status=deprecated
//! ```

mod args;
mod execute;
mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{ApplyArgs, ChainsArgs, CyclesArgs, ImpactArgs, InitArgs, SimulateArgs};
pub use types::{ChangeKindArg, DependencyTypeArg};
pub use validators::{parse_attribute, validate_node_id, validate_project};

/// Archgraph - architecture dependency graph engine
///
/// Model modules and their dependencies, enforce structural rules, analyze
/// change impact and apply multi-step plans atomically. Data is stored in
/// `.archgraph/architecture.jsonl`.
#[derive(Parser, Debug)]
#[command(name = "archgraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new archgraph repository
    Init(InitArgs),

    /// Show repository and graph summary
    Info,

    /// List modules with their outgoing dependencies
    Nodes,

    /// Detect circular dependencies
    Cycles(CyclesArgs),

    /// Score the impact of a change on dependents
    Impact(ImpactArgs),

    /// Show dependency chains (or dependent chains with --dependents)
    Chains(ChainsArgs),

    /// Simulate a change without applying it
    Simulate(SimulateArgs),

    /// Check the whole graph against every rule
    Validate,

    /// Execute a plan file as one atomic unit
    Apply(ApplyArgs),

    /// Run the health checks
    Health,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let Some(command) = &self.command else {
            println!("Archgraph - run with --help for usage");
            return Ok(());
        };

        if let Commands::Init(args) = command {
            return execute::execute_init(args).await;
        }

        let app = App::from_directory(&std::env::current_dir()?).await?;
        match command {
            Commands::Init(_) => Ok(()),
            Commands::Info => execute::execute_info(&app, output_mode).await,
            Commands::Nodes => execute::execute_nodes(&app, output_mode).await,
            Commands::Cycles(args) => execute::execute_cycles(&app, args, output_mode).await,
            Commands::Impact(args) => execute::execute_impact(&app, args, output_mode).await,
            Commands::Chains(args) => execute::execute_chains(&app, args, output_mode).await,
            Commands::Simulate(args) => execute::execute_simulate(&app, args, output_mode).await,
            Commands::Validate => execute::execute_validate(&app, output_mode).await,
            Commands::Apply(args) => execute::execute_apply(&app, args, output_mode).await,
            Commands::Health => execute::execute_health(&app, output_mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["archgraph"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_global_json_flag() {
        let cli = Cli::try_parse_from(["archgraph", "cycles", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::Cycles(_))));
    }

    #[test]
    fn test_parse_init_with_project() {
        let cli = Cli::try_parse_from(["archgraph", "init", "--project", "shop", "-q"]).unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert_eq!(args.project.as_deref(), Some("shop"));
                assert!(args.quiet);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_parse_init_rejects_bad_project() {
        assert!(Cli::try_parse_from(["archgraph", "init", "--project", "a b"]).is_err());
    }

    #[test]
    fn test_parse_impact_defaults_to_update() {
        let cli = Cli::try_parse_from(["archgraph", "impact", "mod-db"]).unwrap();
        match cli.command {
            Some(Commands::Impact(args)) => {
                assert_eq!(args.node, "mod-db");
                assert_eq!(args.change, ChangeKindArg::Update);
            }
            _ => panic!("Expected Impact command"),
        }
    }

    #[test]
    fn test_parse_chains_flags() {
        let cli = Cli::try_parse_from(["archgraph", "chains", "api", "--depth", "2", "--dependents"])
            .unwrap();
        match cli.command {
            Some(Commands::Chains(args)) => {
                assert_eq!(args.depth, Some(2));
                assert!(args.dependents);
            }
            _ => panic!("Expected Chains command"),
        }
    }

    #[test]
    fn test_parse_simulate_attributes() {
        let cli = Cli::try_parse_from([
            "archgraph",
            "simulate",
            "api",
            "--change",
            "delete",
            "--set",
            "status=deprecated",
            "--set",
            "level=3",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Simulate(args)) => {
                assert_eq!(args.change, ChangeKindArg::Delete);
                assert_eq!(
                    args.set,
                    vec![
                        ("status".to_string(), json!("deprecated")),
                        ("level".to_string(), json!(3)),
                    ]
                );
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from(["archgraph", "apply", "plan.yaml", "--dry-run", "--no-validate"])
            .unwrap();
        match cli.command {
            Some(Commands::Apply(args)) => {
                assert_eq!(args.plan_file, std::path::PathBuf::from("plan.yaml"));
                assert!(args.dry_run);
                assert!(args.no_validate);
                assert!(!args.no_snapshot);
            }
            _ => panic!("Expected Apply command"),
        }
    }

    #[test]
    fn test_parse_cycles_type_filter() {
        let cli = Cli::try_parse_from(["archgraph", "cycles", "--type", "depends_on"]).unwrap();
        match cli.command {
            Some(Commands::Cycles(args)) => {
                assert_eq!(args.dep_type, Some(DependencyTypeArg::DependsOn));
            }
            _ => panic!("Expected Cycles command"),
        }
    }
}
