//! Archgraph CLI binary.

use anyhow::Result;
use archgraph::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the archgraph CLI.
///
/// Uses tokio's current_thread runtime; commands run sequentially.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Example: RUST_LOG=archgraph=debug archgraph apply plan.yaml
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("archgraph=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting archgraph CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Archgraph CLI completed successfully");
    Ok(())
}
