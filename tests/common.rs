//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use pagenet::cluster::{ChannelNetwork, ClusterManager, ClusterSettings, Command, NodeState, ProposalId};
use pagenet::model::{
    Activation, AntennaType, Call, CallSign, Entity, News, Node, NodeStatus, Pager, Rubric,
    Transmitter, TransmitterGroup, TransmitterStatus, TransmitterUsage, User,
};
use pagenet::scheduler::TransmissionSink;
use pagenet::state::{Persistence, State, StateAggregate};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::NamedTempFile;

// ============================================================================
// Config files
// ============================================================================

/// Write `content` to a temporary TOML file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config(
        r#"
[node]
name = "node-a"
"#,
    )
}

/// Create a three-node configuration for `node-a`.
pub fn create_cluster_config(state_file: &str) -> NamedTempFile {
    write_config(&format!(
        r#"
[node]
name = "node-a"

[cluster]
bind = "127.0.0.1:43434"
peers = [
    {{ name = "node-b", address = "127.0.0.1:43435" }},
    {{ name = "node-c", address = "127.0.0.1:43436" }},
]
response_timeout_ms = 2000

[model]
state_file = "{}"

[telemetry]
log_level = "debug"
"#,
        state_file
    ))
}

// ============================================================================
// Entity fixtures
// ============================================================================

/// Fixed reference instant used by expiry tests.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn user(name: &str) -> User {
    User::new(name, "5f4dcc3b5aa765d61d8327deb882cf99", format!("{}@example.org", name))
}

pub fn node(name: &str, owner: &str) -> Node {
    Node {
        name: name.to_string(),
        address: "10.0.0.1:43434".to_string(),
        longitude: "13.40495".to_string(),
        latitude: "52.52000".to_string(),
        status: NodeStatus::Online,
        owner_names: vec![owner.to_string()],
    }
}

pub fn transmitter(name: &str, node: &str, owner: &str) -> Transmitter {
    Transmitter {
        name: name.to_string(),
        auth_key: "secret".to_string(),
        node_name: node.to_string(),
        longitude: "13.40495".to_string(),
        latitude: "52.52000".to_string(),
        power: "12.5".to_string(),
        time_slot: "0123".to_string(),
        owner_names: vec![owner.to_string()],
        status: TransmitterStatus::Online,
        usage: TransmitterUsage::Widerange,
        antenna_above_ground_level: 30,
        antenna_type: AntennaType::Omni,
        antenna_direction: 0,
        antenna_gain_dbi: 3.0,
        identification_address: 1000,
        last_connected: None,
        connected_since: None,
    }
}

pub fn group(name: &str, transmitters: &[&str], owners: &[&str]) -> TransmitterGroup {
    TransmitterGroup {
        name: name.to_string(),
        description: String::new(),
        transmitter_names: names(transmitters),
        owner_names: names(owners),
    }
}

pub fn call_sign(name: &str, number: u32, owners: &[&str]) -> CallSign {
    CallSign {
        name: name.to_string(),
        description: String::new(),
        numeric: false,
        pagers: vec![Pager {
            number,
            name: "Skyper".to_string(),
        }],
        owner_names: names(owners),
    }
}

pub fn rubric(name: &str, number: u32, groups: &[&str], owners: &[&str]) -> Rubric {
    Rubric {
        name: name.to_string(),
        number,
        label: "Weather".to_string(),
        transmitter_group_names: names(groups),
        owner_names: names(owners),
    }
}

pub fn news(rubric: &str, text: &str, owner: &str, timestamp: DateTime<Utc>) -> News {
    News {
        text: text.to_string(),
        rubric_name: rubric.to_string(),
        number: 0,
        timestamp,
        owner_name: owner.to_string(),
        validity: None,
    }
}

pub fn call(
    text: &str,
    call_signs: &[&str],
    groups: &[&str],
    owner: &str,
    timestamp: DateTime<Utc>,
) -> Call {
    Call {
        id: String::new(),
        text: text.to_string(),
        call_sign_names: names(call_signs),
        transmitter_group_names: names(groups),
        emergency: false,
        timestamp,
        owner_name: owner.to_string(),
    }
}

pub fn activation(number: u32, groups: &[&str], owner: &str, timestamp: DateTime<Utc>) -> Activation {
    Activation {
        id: String::new(),
        number,
        transmitter_group_names: names(groups),
        timestamp,
        owner_name: owner.to_string(),
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// A proposal id that is unique within the test binary.
pub fn proposal_id() -> ProposalId {
    ProposalId::new("test", SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Apply a create command directly to a detached state and return the key.
pub fn create(state: &mut State, entity: impl Into<Entity>) -> String {
    let command = Command::create(proposal_id(), entity.into(), "admin");
    state.apply(&command).expect("create should apply");
    command.key().to_string()
}

/// Small network owned by `admin`:
///
/// node `node-a` → transmitter `tx-berlin` → group `berlin` → rubric `weather`,
/// call sign `db0abc` with pager 100, one news item, one call, one activation.
pub fn populated_state() -> State {
    let mut state = State::new();
    create(&mut state, user("admin"));
    create(&mut state, node("node-a", "admin"));
    create(&mut state, transmitter("tx-berlin", "node-a", "admin"));
    create(&mut state, group("berlin", &["tx-berlin"], &["admin"]));
    create(&mut state, call_sign("DB0ABC", 100, &["admin"]));
    create(&mut state, rubric("weather", 1, &["berlin"], &["admin"]));
    create(&mut state, news("weather", "Sunny, 24C", "admin", epoch()));
    create(&mut state, call("Hello", &["db0abc"], &["berlin"], "admin", epoch()));
    create(&mut state, activation(100, &["berlin"], "admin", epoch()));
    state
}

// ============================================================================
// Transmission sink
// ============================================================================

/// Sink that records every broadcast as a short string.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }
}

impl TransmissionSink for RecordingSink {
    fn send_rubric(&self, rubric: &Rubric) {
        self.events.lock().push(format!("rubric:{}", rubric.name));
    }

    fn send_news(&self, rubric: &Rubric, news: &News) {
        self.events
            .lock()
            .push(format!("news:{}:{}", rubric.name, news.number));
    }

    fn handle_time(&self, now: DateTime<Utc>) {
        self.events.lock().push(format!("time:{}", now.timestamp()));
    }

    fn handle_identification(&self) {
        self.events.lock().push("identification".to_string());
    }
}

// ============================================================================
// In-memory clusters
// ============================================================================

pub const WAIT: StdDuration = StdDuration::from_secs(5);

/// Settings with short timings for tests on the channel network.
pub fn test_settings(local: &str, peers: &[&str]) -> ClusterSettings {
    let mut settings = ClusterSettings::new(local);
    settings.address = format!("{}:43434", local);
    settings.peers = names(peers);
    settings.response_timeout = StdDuration::from_millis(500);
    settings.sync_timeout = StdDuration::from_millis(300);
    settings.heartbeat_interval = StdDuration::from_millis(50);
    settings.peer_timeout = StdDuration::from_millis(400);
    settings
}

/// Start one node on the network and wait for `start` to return.
pub async fn start_node(
    network: &ChannelNetwork,
    settings: ClusterSettings,
) -> pagenet::error::CoreResult<ClusterManager> {
    start_persistent_node(network, settings, None).await
}

/// Start one node that loads and saves snapshots through `persistence`.
pub async fn start_persistent_node(
    network: &ChannelNetwork,
    settings: ClusterSettings,
    persistence: Option<Arc<Persistence>>,
) -> pagenet::error::CoreResult<ClusterManager> {
    let (transport, inbound) = network.connect(&settings.local);
    let manager = ClusterManager::new(
        settings,
        Arc::new(StateAggregate::new()),
        Arc::new(transport),
        persistence,
    );
    manager.start(inbound).await?;
    Ok(manager)
}

/// Start a fully connected cluster. The first node starts on local state.
///
/// Returns once every node sees every other node and is `Active`.
pub async fn start_cluster(network: &ChannelNetwork, names: &[&str]) -> Vec<ClusterManager> {
    let mut managers = Vec::new();
    for (index, name) in names.iter().enumerate() {
        let peers: Vec<&str> = names.iter().copied().filter(|n| n != name).collect();
        let mut settings = test_settings(name, &peers);
        settings.enforce_startup = index == 0;
        let manager = start_node(network, settings)
            .await
            .expect("node should start");
        managers.push(manager);
    }

    for manager in &managers {
        assert!(
            manager.wait_for_view(names.len(), WAIT).await,
            "{} never saw the full cluster",
            manager.local_name()
        );
        assert!(
            manager.wait_for_state(NodeState::Active, WAIT).await,
            "{} never became active",
            manager.local_name()
        );
    }
    managers
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually(timeout: StdDuration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}

/// Stop every manager.
pub async fn stop_all(managers: &[ClusterManager]) {
    for manager in managers {
        manager.stop().await;
    }
}

/// Shorthand for chrono minutes in expiry tests.
pub fn minutes(value: i64) -> Duration {
    Duration::minutes(value)
}
