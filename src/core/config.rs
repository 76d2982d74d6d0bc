//! Configuration parsing and validation.
//!
//! Node configuration is loaded from a TOML file with CLI overrides. Every
//! section except `[node]` may be omitted and falls back to defaults.

use crate::validation::checks;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this node.
    pub node: NodeConfig,

    /// Peer membership and replication timing.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// State persistence and expiry.
    #[serde(default)]
    pub model: ModelConfig,

    /// Periodic job intervals.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster-unique node name.
    pub name: String,

    /// First operator account, created when a new cluster starts without users.
    #[serde(default = "default_admin_name")]
    pub admin_name: String,

    #[serde(default = "default_admin_mail")]
    pub admin_mail: String,

    /// Password hash of the first operator. `"!"` keeps the account locked.
    #[serde(default = "default_admin_hash")]
    pub admin_hash: String,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin_name: default_admin_name(),
            admin_mail: default_admin_mail(),
            admin_hash: default_admin_hash(),
        }
    }
}

/// One configured peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    /// `host:port` of the peer's listener.
    pub address: String,
}

/// Cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Peer listener bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Every other member of the cluster.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// How long a proposal waits for acknowledgements.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// How long startup waits for snapshot replies.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a peer leaves the view.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Start on local state when no peer answers.
    #[serde(default)]
    pub enforce_startup: bool,

    /// Applied proposal ids remembered per origin.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Reject pager numbers already registered under another call sign.
    #[serde(default)]
    pub check_duplicate_pagers: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            peers: Vec::new(),
            response_timeout_ms: default_response_timeout_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            peer_timeout_ms: default_peer_timeout_ms(),
            enforce_startup: false,
            dedup_window: default_dedup_window(),
            check_duplicate_pagers: false,
        }
    }
}

/// State model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Snapshot file path.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Write a snapshot after every applied commit.
    #[serde(default)]
    pub saving_immediately: bool,

    #[serde(default = "default_expiration_minutes")]
    pub call_expiration_minutes: u64,

    #[serde(default = "default_expiration_minutes")]
    pub news_expiration_minutes: u64,

    #[serde(default = "default_expiration_minutes")]
    pub activation_expiration_minutes: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            saving_immediately: false,
            call_expiration_minutes: default_expiration_minutes(),
            news_expiration_minutes: default_expiration_minutes(),
            activation_expiration_minutes: default_expiration_minutes(),
        }
    }
}

/// Scheduler intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_time_seconds")]
    pub time: u64,

    #[serde(default = "default_rubric_names_seconds")]
    pub rubric_names: u64,

    #[serde(default = "default_news_seconds")]
    pub news: u64,

    #[serde(default = "default_identification_seconds")]
    pub identification: u64,

    #[serde(default = "default_state_saving_seconds")]
    pub state_saving: u64,

    #[serde(default = "default_state_cleaning_seconds")]
    pub state_cleaning: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time: default_time_seconds(),
            rubric_names: default_rubric_names_seconds(),
            news: default_news_seconds(),
            identification: default_identification_seconds(),
            state_saving: default_state_saving_seconds(),
            state_cleaning: default_state_cleaning_seconds(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_admin_name() -> String {
    "admin".to_string()
}

fn default_admin_mail() -> String {
    "admin@pagenet.invalid".to_string()
}

fn default_admin_hash() -> String {
    "!".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:43434".to_string()
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

fn default_sync_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

fn default_peer_timeout_ms() -> u64 {
    3_000
}

fn default_dedup_window() -> usize {
    1024
}

fn default_state_file() -> String {
    "data/state.json".to_string()
}

fn default_expiration_minutes() -> u64 {
    1440
}

fn default_time_seconds() -> u64 {
    1200
}

fn default_rubric_names_seconds() -> u64 {
    1200
}

fn default_news_seconds() -> u64 {
    3600
}

fn default_identification_seconds() -> u64 {
    600
}

fn default_state_saving_seconds() -> u64 {
    600
}

fn default_state_cleaning_seconds() -> u64 {
    86_400
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Configuration with defaults for a single node named `name`.
    pub fn for_node(name: impl Into<String>) -> Self {
        Self {
            node: NodeConfig::new(name),
            cluster: ClusterConfig::default(),
            model: ModelConfig::default(),
            scheduler: SchedulerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, defaults included.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref state_file) = overrides.state_file {
            self.model.state_file = state_file.clone();
        }
        if let Some(ref bind) = overrides.bind {
            self.cluster.bind = bind.clone();
        }
        if overrides.enforce_startup {
            self.cluster.enforce_startup = true;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_node()?;
        self.validate_cluster()?;
        self.validate_model()?;
        self.validate_scheduler()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        if self.node.name.trim().is_empty() {
            anyhow::bail!("node.name must not be empty");
        }
        if !checks::length_within(&self.node.admin_name, 3, 20) {
            anyhow::bail!("node.admin_name must be 3 to 20 characters");
        }
        if !checks::is_valid_email(&self.node.admin_mail) {
            anyhow::bail!("node.admin_mail '{}' is not an e-mail address", self.node.admin_mail);
        }
        if !checks::is_present(&self.node.admin_hash) {
            anyhow::bail!("node.admin_hash must not be blank");
        }
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        let cluster = &self.cluster;

        let mut seen = HashSet::new();
        for peer in &cluster.peers {
            if peer.name.trim().is_empty() {
                anyhow::bail!("cluster.peers entries need a name");
            }
            if peer.name == self.node.name {
                anyhow::bail!("cluster.peers must not contain the local node '{}'", peer.name);
            }
            if !seen.insert(peer.name.as_str()) {
                anyhow::bail!("cluster.peers contains '{}' more than once", peer.name);
            }
            if peer.address.trim().is_empty() {
                anyhow::bail!("cluster.peers '{}' needs an address", peer.name);
            }
        }

        for (name, value) in [
            ("response_timeout_ms", cluster.response_timeout_ms),
            ("sync_timeout_ms", cluster.sync_timeout_ms),
            ("heartbeat_interval_ms", cluster.heartbeat_interval_ms),
            ("peer_timeout_ms", cluster.peer_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("cluster.{} must be > 0", name);
            }
        }

        if cluster.peer_timeout_ms <= cluster.heartbeat_interval_ms {
            anyhow::bail!(
                "cluster.peer_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                cluster.peer_timeout_ms,
                cluster.heartbeat_interval_ms
            );
        }

        if cluster.dedup_window == 0 {
            anyhow::bail!("cluster.dedup_window must be > 0");
        }

        Ok(())
    }

    fn validate_model(&self) -> Result<()> {
        if self.model.state_file.trim().is_empty() {
            anyhow::bail!("model.state_file must not be empty");
        }
        for (name, value) in [
            ("call_expiration_minutes", self.model.call_expiration_minutes),
            ("news_expiration_minutes", self.model.news_expiration_minutes),
            (
                "activation_expiration_minutes",
                self.model.activation_expiration_minutes,
            ),
        ] {
            if value == 0 {
                anyhow::bail!("model.{} must be > 0", name);
            }
        }
        Ok(())
    }

    fn validate_scheduler(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        for (name, value) in [
            ("time", scheduler.time),
            ("rubric_names", scheduler.rubric_names),
            ("news", scheduler.news),
            ("identification", scheduler.identification),
            ("state_saving", scheduler.state_saving),
            ("state_cleaning", scheduler.state_cleaning),
        ] {
            if value == 0 {
                anyhow::bail!("scheduler.{} must be > 0", name);
            }
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                LOG_LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override snapshot file path.
    pub state_file: Option<String>,
    /// Override peer listener bind address.
    pub bind: Option<String>,
    /// Force `cluster.enforce_startup` on.
    pub enforce_startup: bool,
}
