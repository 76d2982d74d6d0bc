//! Start command implementation.

use super::load_config;
use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::Result;
use clap::Args;
use std::path::Path;

/// Start the node.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Start on local state when no peer answers the synchronization request.
    #[arg(long)]
    pub enforce_startup: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Snapshot file, overriding `model.state_file`.
    #[arg(long)]
    pub state_file: Option<String>,

    /// Peer listener address, overriding `cluster.bind`.
    #[arg(long)]
    pub bind: Option<String>,
}

impl StartArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            state_file: self.state_file.clone(),
            bind: self.bind.clone(),
            enforce_startup: self.enforce_startup,
        }
    }
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_config: &Config) {}

/// Run the node until ctrl-c.
pub async fn run_start(config_path: &Path, args: StartArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.apply_overrides(&args.overrides());
    init_tracing(&config);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
