//! Cluster replication tests on the in-memory channel network.

mod common;

use common::{
    call_sign, eventually, populated_state, start_cluster, start_node, start_persistent_node,
    stop_all, test_settings, user, WAIT,
};
use pagenet::cluster::{
    ChannelNetwork, ClusterManager, Command, Envelope, MessageKind, NodeState, PeerMessage,
};
use pagenet::core::error::CoreError;
use pagenet::model::{EntityKind, NodeStatus};
use pagenet::state::Persistence;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn has_user(manager: &ClusterManager, name: &str) -> bool {
    manager
        .state()
        .with_read_lock(|state| state.users.contains_key(name))
}

// ============================================================================
// First member
// ============================================================================

#[tokio::test]
async fn single_node_bootstraps_and_commits_alone() {
    let network = ChannelNetwork::new();
    let manager = start_node(&network, test_settings("node-a", &[]))
        .await
        .unwrap();
    assert_eq!(manager.node_state(), NodeState::Active);

    // The first node of a new cluster creates an operator and registers itself.
    manager.state().with_read_lock(|state| {
        let admin = state.users.get("admin").unwrap();
        assert!(admin.admin);
        let node = state.nodes.get("node-a").unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.owner_names, vec!["admin".to_string()]);
        assert_eq!(state.version, 2);
    });

    let result = manager.create(user("bob").into(), "admin").await.unwrap();
    assert_eq!(result.acknowledgements, 1);
    assert_eq!(result.required, 1);
    assert!(has_user(&manager, "bob"));

    manager.stop().await;
    assert_eq!(manager.node_state(), NodeState::Stopped);
    let status = manager
        .state()
        .with_read_lock(|state| state.nodes.get("node-a").map(|node| node.status));
    assert_eq!(status, Some(NodeStatus::Suspended));
}

#[tokio::test]
async fn enforced_start_with_peers_bootstraps_local_node() {
    let network = ChannelNetwork::new();
    let mut settings = test_settings("node-a", &["node-b", "node-c"]);
    settings.enforce_startup = true;
    let manager = start_node(&network, settings).await.unwrap();

    manager.state().with_read_lock(|state| {
        assert!(state.users.get("admin").is_some_and(|admin| admin.admin));
        let node = state.nodes.get("node-a").unwrap();
        assert_eq!(node.owner_names, vec!["admin".to_string()]);
        assert_eq!(node.address, "node-a:43434");
    });

    manager.stop().await;
}

#[tokio::test]
async fn bootstrap_refreshes_existing_node_and_keeps_users() {
    let dir = TempDir::new().unwrap();
    let persistence = Arc::new(Persistence::new(dir.path().join("state.json")));
    let mut snapshot = populated_state();
    snapshot.nodes.get_mut("node-a").unwrap().status = NodeStatus::Suspended;
    persistence.write_state(&snapshot).unwrap();

    let network = ChannelNetwork::new();
    let manager = start_persistent_node(
        &network,
        test_settings("node-a", &[]),
        Some(persistence),
    )
    .await
    .unwrap();

    manager.state().with_read_lock(|state| {
        assert_eq!(state.users.len(), 1);
        let node = state.nodes.get("node-a").unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.address, "node-a:43434");
        assert_eq!(state.version, 10);
    });

    manager.stop().await;
}

// ============================================================================
// Replication
// ============================================================================

#[tokio::test]
async fn joiners_receive_bootstrap_records() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    for node in &nodes {
        assert!(has_user(node, "admin"), "{} missed the operator", node.local_name());
        assert_eq!(node.state().version(), nodes[0].state().version());
    }

    stop_all(&nodes).await;
}

#[tokio::test]
async fn three_nodes_replicate_commits() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    let result = nodes[1].create(user("bob").into(), "admin").await.unwrap();
    assert!(result.acknowledgements >= 2);
    assert_eq!(result.required, 2);

    // Validation runs against node-c's local state, so wait for the commit there.
    assert!(eventually(WAIT, || has_user(&nodes[2], "bob")).await);
    nodes[2]
        .create(call_sign("DB0ABC", 100, &["bob"]).into(), "admin")
        .await
        .unwrap();

    for node in &nodes {
        let replicated = eventually(WAIT, || {
            node.state().with_read_lock(|state| {
                state.users.contains_key("bob") && state.call_signs.contains_key("db0abc")
            })
        })
        .await;
        assert!(replicated, "{} missed a commit", node.local_name());
    }

    nodes[0]
        .delete(EntityKind::User, "bob", "admin")
        .await
        .unwrap();
    for node in &nodes {
        let cascaded = eventually(WAIT, || {
            node.state().with_read_lock(|state| {
                !state.users.contains_key("bob") && state.call_signs.is_empty()
            })
        })
        .await;
        assert!(cascaded, "{} kept deleted entities", node.local_name());
    }

    stop_all(&nodes).await;
}

#[tokio::test]
async fn validation_failures_are_never_proposed() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    let err = nodes[0]
        .create(call_sign("DB0ABC", 100, &["nobody"]).into(), "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let err = nodes[1]
        .create(user("ADMIN").into(), "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { kind: EntityKind::User, .. }));
    assert_eq!(err.descriptor().code, 4090);

    let version = nodes[0].state().version();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(nodes[0].state().version(), version);

    stop_all(&nodes).await;
}

// ============================================================================
// Quorum loss
// ============================================================================

#[tokio::test]
async fn isolated_node_degrades_and_rejects_proposals() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    network.isolate("node-c");
    assert!(nodes[2].wait_for_state(NodeState::Degraded, WAIT).await);

    let err = nodes[2]
        .create(user("bob").into(), "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoQuorum { required: 2, .. }));
    assert!(err.is_retriable());

    // The majority side keeps committing.
    assert!(nodes[0].wait_for_view(2, WAIT).await);
    nodes[0].create(user("bob").into(), "admin").await.unwrap();

    // Rejoining re-synchronizes the missed commit.
    network.rejoin("node-c");
    assert!(nodes[2].wait_for_state(NodeState::Active, WAIT).await);
    assert!(eventually(WAIT, || has_user(&nodes[2], "bob")).await);

    stop_all(&nodes).await;
}

#[tokio::test]
async fn missing_acks_fail_without_applying_anywhere() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    network.drop_messages("node-a", MessageKind::Ack);
    let err = nodes[0]
        .submit_command_with(
            Command::create(nodes[0].next_proposal_id(), user("bob").into(), "admin"),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::NoQuorum {
            acknowledged: 1,
            required: 2
        }
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    for node in &nodes {
        assert!(
            !has_user(node, "bob"),
            "{} applied an uncommitted proposal",
            node.local_name()
        );
    }

    stop_all(&nodes).await;
}

// ============================================================================
// Catch-up and idempotent commits
// ============================================================================

#[tokio::test]
async fn node_that_missed_a_commit_catches_up() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    network.drop_messages("node-c", MessageKind::Commit);
    nodes[0].create(user("bob").into(), "admin").await.unwrap();
    network.heal();

    // Heartbeats carry the peers' higher version; node-c re-syncs from them.
    let converged = eventually(WAIT, || {
        has_user(&nodes[2], "bob") && nodes[2].state().version() == nodes[0].state().version()
    })
    .await;
    assert!(converged, "node-c stayed at version {}", nodes[2].state().version());
    assert!(nodes[2].wait_for_state(NodeState::Active, WAIT).await);

    // Later commits apply normally on top of the re-synced state.
    nodes[2].create(user("carol").into(), "admin").await.unwrap();
    for node in &nodes {
        assert!(eventually(WAIT, || has_user(node, "carol")).await);
    }

    stop_all(&nodes).await;
}

#[tokio::test]
async fn redelivered_commit_is_applied_once() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b", "node-c"]).await;

    let command = Command::create(nodes[0].next_proposal_id(), user("bob").into(), "admin");
    nodes[0].submit_command(command.clone()).await.unwrap();
    assert!(eventually(WAIT, || has_user(&nodes[1], "bob")).await);
    let version = nodes[1].state().version();

    let delivered = network.deliver(
        "node-b",
        Envelope::new("node-a", PeerMessage::Commit { command }),
    );
    assert!(delivered);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(nodes[1].state().version(), version);

    stop_all(&nodes).await;
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn startup_without_peers_fails_unless_enforced() {
    let network = ChannelNetwork::new();

    let err = start_node(&network, test_settings("node-a", &["node-b", "node-c"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoQuorumAtStartup { .. }));

    let mut settings = test_settings("node-a", &["node-b", "node-c"]);
    settings.enforce_startup = true;
    let manager = start_node(&network, settings).await.unwrap();
    assert!(manager.node_state().is_serving());
    manager.stop().await;
}

#[tokio::test]
async fn late_joiner_receives_current_state() {
    let network = ChannelNetwork::new();
    let nodes = start_cluster(&network, &["node-a", "node-b"]).await;
    nodes[0].create(user("bob").into(), "admin").await.unwrap();

    network.isolate("node-b");
    nodes[1].stop().await;
    network.rejoin("node-b");

    let restarted = start_node(&network, test_settings("node-b", &["node-a"]))
        .await
        .unwrap();
    assert_eq!(restarted.node_state(), NodeState::Active);
    assert!(has_user(&restarted, "bob"));
    assert_eq!(restarted.state().version(), nodes[0].state().version());

    restarted.stop().await;
    nodes[0].stop().await;
}

#[tokio::test]
async fn newer_local_snapshot_survives_older_peer_replies() {
    let network = ChannelNetwork::new();
    let mut settings = test_settings("node-a", &["node-b"]);
    settings.enforce_startup = true;
    let first = start_node(&network, settings).await.unwrap();
    let peer_version = first.state().version();

    let dir = TempDir::new().unwrap();
    let persistence = Arc::new(Persistence::new(dir.path().join("state.json")));
    let local = populated_state();
    assert!(local.version > peer_version);
    persistence.write_state(&local).unwrap();

    let joiner = start_persistent_node(
        &network,
        test_settings("node-b", &["node-a"]),
        Some(persistence),
    )
    .await
    .unwrap();
    joiner.state().with_read_lock(|state| {
        assert!(state.call_signs.contains_key("db0abc"));
        assert!(state.version >= local.version);
    });

    joiner.stop().await;
    first.stop().await;
}

#[tokio::test]
async fn stopped_node_rejects_proposals() {
    let network = ChannelNetwork::new();
    let manager = start_node(&network, test_settings("node-a", &[]))
        .await
        .unwrap();
    manager.stop().await;

    let err = manager
        .create(user("bob").into(), "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unavailable { .. }));
}
