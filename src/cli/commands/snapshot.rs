//! Snapshot command implementation.
//!
//! These commands work on snapshot files directly and must not run against
//! the state file of a live node.

use super::load_config;
use crate::core::time::minutes;
use crate::state::persistence::{read_snapshot, write_atomic};
use crate::state::{ExpirationPolicy, Persistence};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Snapshot operations.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

/// Snapshot subcommands.
#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Inspect a snapshot.
    Inspect {
        /// Snapshot path.
        path: PathBuf,
    },
    /// Copy the configured snapshot to another file.
    Export {
        /// Destination path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Install a snapshot file as the configured state file.
    Import {
        /// Snapshot path.
        path: PathBuf,
    },
    /// Remove expired calls, news and activations from the configured snapshot.
    Clean,
}

/// Run the snapshot command.
pub fn run_snapshot(config_path: &Path, args: SnapshotArgs) -> Result<()> {
    match args.command {
        SnapshotCommand::Inspect { path } => inspect(&path),
        SnapshotCommand::Export { output } => {
            let config = load_config(config_path)?;
            export(Path::new(&config.model.state_file), &output)
        }
        SnapshotCommand::Import { path } => {
            let config = load_config(config_path)?;
            import(&path, Path::new(&config.model.state_file))
        }
        SnapshotCommand::Clean => {
            let config = load_config(config_path)?;
            let model = &config.model;
            let policy = ExpirationPolicy {
                call: minutes(model.call_expiration_minutes),
                news: minutes(model.news_expiration_minutes),
                activation: minutes(model.activation_expiration_minutes),
            };
            clean(Path::new(&model.state_file), &policy)
        }
    }
}

fn inspect(path: &Path) -> Result<()> {
    let (info, _) = read_snapshot(path)?;
    println!("Snapshot:  {}", path.display());
    println!("Format:    {}", info.format);
    println!("Saved at:  {}", info.saved_at.to_rfc3339());
    println!("Version:   {}", info.version);
    for (kind, count) in &info.counts {
        println!("  {:<20} {}", kind.as_str(), count);
    }
    Ok(())
}

fn export(source: &Path, output: &Path) -> Result<()> {
    // Parse first so a corrupt snapshot is never exported.
    read_snapshot(source)?;
    let bytes =
        std::fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
    write_atomic(output, &bytes)?;
    println!("Exported {} to {}", source.display(), output.display());
    Ok(())
}

fn import(source: &Path, target: &Path) -> Result<()> {
    let (info, state) = read_snapshot(source)?;
    Persistence::new(target).write_state(&state)?;
    println!(
        "Imported {} (version {}) into {}",
        source.display(),
        info.version,
        target.display()
    );
    Ok(())
}

fn clean(path: &Path, policy: &ExpirationPolicy) -> Result<()> {
    let (_, mut state) = read_snapshot(path)?;
    let report = state.clean(Utc::now(), policy);
    Persistence::new(path).write_state(&state)?;
    println!(
        "Removed {} call(s), {} news item(s), {} activation(s)",
        report.calls, report.news, report.activations
    );
    Ok(())
}
