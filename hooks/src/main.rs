//! Kraken hooks replay binary.
//!
//! Reads host callbacks as JSON lines, runs them through the guard pipeline
//! and writes the rewritten payloads to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kraken_core::{GuardConfig, ProcessMemoryProbe, ProcessTerminator};
use kraken_hooks::{replay, HookPipeline};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kraken-hooks", version, about = "Replay host callbacks through the guard hooks")]
struct Cli {
    /// Guard configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines input (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GuardConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GuardConfig::default(),
    };

    // Stdout carries replies, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::from(config.log_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting kraken hooks replay");
    tracing::info!("Version: {}", kraken_hooks::VERSION);

    let probe = Arc::new(ProcessMemoryProbe::new()?);
    let pipeline = HookPipeline::from_config(&config, probe, Arc::new(ProcessTerminator));

    let stdout = tokio::io::stdout();
    let stats = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay(&pipeline, BufReader::new(file), stdout).await?
        }
        None => replay(&pipeline, BufReader::new(tokio::io::stdin()), stdout).await?,
    };

    tracing::info!(
        dispatched = stats.dispatched,
        failed = stats.failed,
        "Replay finished"
    );
    Ok(())
}
