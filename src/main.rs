//! Pagenet - unified CLI entrypoint.
//!
//! Usage:
//!   pagenet start --config config/pagenet.toml
//!   pagenet status
//!   pagenet config validate --config config/pagenet.toml
//!   pagenet snapshot inspect <path>

use anyhow::Result;
use clap::Parser;
use pagenet::cli::commands::{run_config, run_snapshot, run_start, run_status};
use pagenet::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine config path - use global --config or default
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/pagenet.toml"));

    match cli.command {
        Commands::Start(args) => run_start(&config_path, args).await,
        Commands::Status(args) => run_status(&config_path, args),
        Commands::Config(args) => run_config(&config_path, args),
        Commands::Snapshot(args) => run_snapshot(&config_path, args),
    }
}
