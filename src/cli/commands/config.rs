//! Config command implementation.

use super::load_config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate,
    /// Print configuration with defaults.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(config_path: &Path, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => {
            let config = load_config(config_path)?;
            println!(
                "✓ {:?} is valid (node '{}', {} peer(s))",
                config_path,
                config.node.name,
                config.cluster.peers.len()
            );
            Ok(())
        }
        ConfigCommand::Show { format } => {
            let config = load_config(config_path)?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => print!("{}", config.to_toml()?),
            }
            Ok(())
        }
    }
}
