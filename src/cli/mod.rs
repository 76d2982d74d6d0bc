//! Command-line interface.
//!
//! Unified CLI for running and inspecting a pagenet node.

pub mod commands;

use clap::{Parser, Subcommand};

/// Pagenet - replicated state engine for a paging network.
#[derive(Parser, Debug)]
#[command(name = "pagenet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Start(commands::StartArgs),
    /// Show the persisted state summary.
    Status(commands::StatusArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Snapshot operations.
    Snapshot(commands::SnapshotArgs),
}
