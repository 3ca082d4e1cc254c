//! Granary Ingest - granule sync tool

use anyhow::{Context, Result};
use clap::Parser;
use granary_common::logging::{init_logging, LogConfig, LogLevel};
use granary_ingest::store::{S3Store, StoreConfig};
use granary_ingest::task::{sync_granule, SyncGranuleEvent};
use std::io::Read;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "granary-ingest")]
#[command(author, version, about = "Granary granule ingest tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one sync-granule event
    Run {
        /// Path to the event JSON, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        event: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the CLI flag
    let log_config = LogConfig::from_env().unwrap_or_else(|_| LogConfig::new(log_level));
    init_logging(&log_config)?;

    match cli.command {
        Command::Run { event } => {
            let raw = if event == "-" {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Failed to read event from stdin")?;
                buffer
            } else {
                std::fs::read_to_string(&event)
                    .with_context(|| format!("Failed to read event file {}", event))?
            };

            let event: SyncGranuleEvent =
                serde_json::from_str(&raw).context("Failed to parse sync-granule event")?;

            let store_config = StoreConfig::from_env()?;
            let store = Arc::new(S3Store::new(&store_config));

            info!("Running sync-granule");
            let output = sync_granule(store, event).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        },
    }

    info!("Sync complete");
    Ok(())
}
