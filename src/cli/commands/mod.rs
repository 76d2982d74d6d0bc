//! CLI command implementations.

mod config;
mod snapshot;
mod start;
mod status;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use snapshot::{run_snapshot, SnapshotArgs, SnapshotCommand};
pub use start::{run_start, StartArgs};
pub use status::{run_status, StatusArgs};

use crate::core::config::Config;
use anyhow::{Context, Result};
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("failed to load config from {:?}", path))
}
