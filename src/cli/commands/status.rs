//! Status command implementation.

use super::load_config;
use crate::state::persistence::read_snapshot;
use anyhow::Result;
use clap::Args;
use std::path::Path;

/// Show the persisted state summary.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format (text, json).
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Run the status command.
pub fn run_status(config_path: &Path, args: StatusArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let path = Path::new(&config.model.state_file);

    if !path.exists() {
        println!("Node:      {}", config.node.name);
        println!("Snapshot:  none ({})", path.display());
        return Ok(());
    }

    let (info, _) = read_snapshot(path)?;
    match args.format.as_str() {
        "json" => {
            let json = serde_json::json!({
                "node": config.node.name,
                "snapshot": path.display().to_string(),
                "peers": config.cluster.peers.len(),
                "info": info,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("Pagenet Node Status");
            println!("===================");
            println!("Node:      {}", config.node.name);
            println!("Peers:     {}", config.cluster.peers.len());
            println!("Snapshot:  {}", path.display());
            println!("Saved at:  {}", info.saved_at.to_rfc3339());
            println!("Version:   {}", info.version);
            println!();
            for (kind, count) in &info.counts {
                println!("  {:<20} {}", kind.as_str(), count);
            }
        }
    }
    Ok(())
}
