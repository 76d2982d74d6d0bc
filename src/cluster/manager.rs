//! Cluster manager: membership, quorum proposals and synchronization.
//!
//! # Lifecycle
//!
//! `Joining → Synchronizing → Active ⇄ Degraded → Stopped`
//!
//! - **Joining**: load the local snapshot, start the receive and heartbeat loops.
//! - **Synchronizing**: ask every configured peer for its state and install
//!   the freshest reply. Commits arriving meanwhile are buffered and replayed.
//! - **Active**: proposals are broadcast and committed on majority acknowledgement.
//! - **Degraded**: the view lost its majority; proposals fail fast until a
//!   majority reappears and a re-sync completes.
//! - **Stopped**: no new proposals; in-flight ones resolve or time out.
//!
//! # Commit rule
//!
//! Peers acknowledge a proposal but never apply it on receipt. Only the
//! proposer's `Commit` broadcast, sent after a majority acknowledged, causes
//! a peer to apply. Re-delivered commits are skipped through a bounded
//! window of applied proposal ids.

use super::command::{Command, CommitResult, ProposalId};
use super::dedup::ProposalWindow;
use super::membership::{quorum_size, Membership, MembershipView, NodeState};
use super::protocol::{Envelope, PeerMessage};
use super::transport::Transport;
use crate::core::config::Config;
use crate::core::error::{CoreError, CoreResult};
use crate::model::{normalize_key, Entity, EntityKind, Node, NodeStatus, User};
use crate::state::{ApplyOutcome, Persistence, State, StateAggregate};
use crate::validation::{validate_command, ValidationOptions};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Cluster manager settings.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Local node name.
    pub local: String,
    /// Address recorded on the bootstrap Node entity.
    pub address: String,
    /// Configured peer names.
    pub peers: Vec<String>,
    pub response_timeout: Duration,
    pub sync_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub peer_timeout: Duration,
    /// Go active on local state when no peer answers the initial sync.
    pub enforce_startup: bool,
    /// Applied proposal ids remembered per origin.
    pub dedup_window: usize,
    pub validation: ValidationOptions,
    /// Write a snapshot after every applied commit.
    pub saving_immediately: bool,
    /// Operator account created by the first member of a cluster without users.
    pub first_user: User,
}

fn first_admin(name: &str, hash: &str, mail: &str) -> User {
    let mut user = User::new(name, hash, mail);
    user.admin = true;
    user
}

impl ClusterSettings {
    /// Settings with default timeouts for a node without peers.
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            address: String::new(),
            peers: Vec::new(),
            response_timeout: Duration::from_millis(10_000),
            sync_timeout: Duration::from_millis(10_000),
            heartbeat_interval: Duration::from_millis(1_000),
            peer_timeout: Duration::from_millis(3_000),
            enforce_startup: false,
            dedup_window: 1024,
            validation: ValidationOptions::default(),
            saving_immediately: false,
            first_user: first_admin("admin", "!", "admin@pagenet.invalid"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let cluster = &config.cluster;
        Self {
            local: config.node.name.clone(),
            address: cluster.bind.clone(),
            peers: cluster.peers.iter().map(|peer| peer.name.clone()).collect(),
            response_timeout: Duration::from_millis(cluster.response_timeout_ms),
            sync_timeout: Duration::from_millis(cluster.sync_timeout_ms),
            heartbeat_interval: Duration::from_millis(cluster.heartbeat_interval_ms),
            peer_timeout: Duration::from_millis(cluster.peer_timeout_ms),
            enforce_startup: cluster.enforce_startup,
            dedup_window: cluster.dedup_window,
            validation: ValidationOptions {
                check_duplicate_pagers: cluster.check_duplicate_pagers,
            },
            saving_immediately: config.model.saving_immediately,
            first_user: first_admin(
                &config.node.admin_name,
                &config.node.admin_hash,
                &config.node.admin_mail,
            ),
        }
    }
}

struct SyncReply {
    from: String,
    snapshot: State,
    recent: Vec<ProposalId>,
}

#[derive(Default)]
struct SyncSlot {
    collector: Option<mpsc::UnboundedSender<SyncReply>>,
    buffered: Vec<Command>,
}

struct Inner {
    settings: ClusterSettings,
    state: Arc<StateAggregate>,
    persistence: Option<Arc<Persistence>>,
    transport: Arc<dyn Transport>,
    membership: Mutex<Membership>,
    node_state: watch::Sender<NodeState>,
    sequence: AtomicU64,
    pending: Mutex<HashMap<ProposalId, mpsc::UnboundedSender<String>>>,
    committed: Mutex<ProposalWindow>,
    sync: Mutex<SyncSlot>,
    in_flight: AtomicUsize,
    resyncing: AtomicBool,
    /// Highest peer version seen ahead of local state, and since when.
    lagging: Mutex<Option<(u64, Instant)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Handle to the replication layer of one node. Cheap to clone.
#[derive(Clone)]
pub struct ClusterManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("local", &self.inner.settings.local)
            .field("state", &self.node_state())
            .finish()
    }
}

impl ClusterManager {
    /// Create a manager in the `Joining` state.
    pub fn new(
        settings: ClusterSettings,
        state: Arc<StateAggregate>,
        transport: Arc<dyn Transport>,
        persistence: Option<Arc<Persistence>>,
    ) -> Self {
        let membership = Membership::new(
            settings.local.clone(),
            settings.peers.iter().cloned(),
            settings.peer_timeout,
        );
        let (node_state, _) = watch::channel(NodeState::Joining);
        let (shutdown_tx, _) = watch::channel(false);
        let committed = ProposalWindow::new(settings.dedup_window);

        Self {
            inner: Arc::new(Inner {
                settings,
                state,
                persistence,
                transport,
                membership: Mutex::new(membership),
                node_state,
                sequence: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                committed: Mutex::new(committed),
                sync: Mutex::new(SyncSlot::default()),
                in_flight: AtomicUsize::new(0),
                resyncing: AtomicBool::new(false),
                lagging: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        }
    }

    /// Join the cluster and synchronize.
    ///
    /// Resolves once the node is `Active`. Fails with
    /// [`CoreError::NoQuorumAtStartup`] when no peer answers and
    /// `enforce_startup` is off; the manager is then `Stopped`.
    pub async fn start(&self, inbound: mpsc::UnboundedReceiver<Envelope>) -> CoreResult<()> {
        let inner = &self.inner;
        let local = inner.settings.local.clone();
        tracing::info!(node = %local, peers = inner.settings.peers.len(), "joining cluster");

        if let Some(persistence) = &inner.persistence {
            match persistence.load_snapshot() {
                Ok(Some(snapshot)) => {
                    tracing::info!(node = %local, version = snapshot.version, path = %persistence.path().display(), "loaded local snapshot");
                    inner.state.load_from(snapshot);
                }
                Ok(None) => {
                    tracing::info!(node = %local, path = %persistence.path().display(), "no local snapshot");
                }
                Err(err) => {
                    tracing::warn!(node = %local, error = %err, "ignoring unreadable local snapshot");
                }
            }
        }

        // Commits that arrive before the first sync completes are buffered.
        let sync_rx = (!inner.settings.peers.is_empty()).then(|| inner.begin_sync());

        let receive = tokio::spawn(receive_loop(
            inner.clone(),
            inbound,
            inner.shutdown_tx.subscribe(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(inner.clone(), inner.shutdown_tx.subscribe()));
        inner.tasks.lock().extend([receive, heartbeat]);

        let Some(sync_rx) = sync_rx else {
            tracing::warn!(node = %local, "no peers configured, starting as a single-node cluster");
            inner.seed_sequence();
            inner.bootstrap_first_member();
            inner.set_state(NodeState::Active);
            return Ok(());
        };

        inner.set_state(NodeState::Synchronizing);
        let peers: Vec<String> = inner.settings.peers.clone();
        let replies = inner
            .collect_snapshots(sync_rx, &peers, inner.settings.sync_timeout)
            .await;

        if replies.is_empty() {
            inner.finish_sync(None, true);
            let waited_ms = inner.settings.sync_timeout.as_millis() as u64;
            if !inner.settings.enforce_startup {
                tracing::error!(node = %local, waited_ms, "no peer answered and startup is not enforced");
                self.shutdown_tasks();
                inner.set_state(NodeState::Stopped);
                return Err(CoreError::NoQuorumAtStartup { waited_ms });
            }
            tracing::warn!(
                node = %local,
                waited_ms,
                version = inner.state.version(),
                "no peer answered, degraded start on local state"
            );
            inner.seed_sequence();
            inner.bootstrap_first_member();
        } else {
            let best = replies
                .into_iter()
                .max_by_key(|reply| reply.snapshot.version);
            inner.finish_sync(best, true);
            inner.seed_sequence();
        }

        inner.set_state(NodeState::Active);
        let view = self.view();
        inner.refresh_node_statuses(&view);
        Ok(())
    }

    /// Graceful stop. Idempotent.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let previous = inner.node_state.send_replace(NodeState::Stopped);
        if previous == NodeState::Stopped {
            return;
        }
        tracing::info!(node = %inner.settings.local, from = %previous, "stopping cluster manager");

        let deadline = Instant::now() + inner.settings.response_timeout;
        while inner.in_flight.load(Ordering::Acquire) > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    node = %inner.settings.local,
                    in_flight = inner.in_flight.load(Ordering::Acquire),
                    "giving up on in-flight proposals"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let local_key = normalize_key(&inner.settings.local);
        inner
            .state
            .with_write_lock(|state| state.set_node_status(&local_key, NodeStatus::Suspended));

        self.shutdown_tasks();
        tracing::info!(node = %inner.settings.local, "cluster manager stopped");
    }

    fn shutdown_tasks(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.transport.close();
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub fn local_name(&self) -> &str {
        &self.inner.settings.local
    }

    pub fn node_state(&self) -> NodeState {
        *self.inner.node_state.borrow()
    }

    /// Current membership view.
    pub fn view(&self) -> Arc<MembershipView> {
        self.inner.membership.lock().current()
    }

    /// Shared state aggregate.
    pub fn state(&self) -> &Arc<StateAggregate> {
        &self.inner.state
    }

    /// Allocate the next proposal id for this node.
    pub fn next_proposal_id(&self) -> ProposalId {
        self.inner.next_id()
    }

    /// Wait until the node reaches `target`. Returns false on timeout.
    pub async fn wait_for_state(&self, target: NodeState, timeout: Duration) -> bool {
        let mut rx = self.inner.node_state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    /// Wait until the view holds exactly `members` nodes. Returns false on timeout.
    pub async fn wait_for_view(&self, members: usize, timeout: Duration) -> bool {
        let mut rx = self.inner.membership.lock().subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|view| view.len() == members))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    /// Validate and propose with the configured response timeout.
    pub async fn submit_command(&self, command: Command) -> CoreResult<CommitResult> {
        self.submit_command_with(command, self.inner.settings.response_timeout)
            .await
    }

    /// Validate against local state under the read lock, then propose.
    pub async fn submit_command_with(
        &self,
        command: Command,
        timeout: Duration,
    ) -> CoreResult<CommitResult> {
        let options = self.inner.settings.validation;
        self.inner
            .state
            .with_read_lock(|state| validate_command(state, &command, &options))?;
        self.propose(command, timeout).await
    }

    /// Create an entity on behalf of `actor`.
    pub async fn create(&self, entity: Entity, actor: &str) -> CoreResult<CommitResult> {
        let command = Command::create(self.next_proposal_id(), entity, actor);
        self.submit_command(command).await
    }

    /// Replace an entity on behalf of `actor`.
    pub async fn update(&self, entity: Entity, actor: &str) -> CoreResult<CommitResult> {
        let command = Command::update(self.next_proposal_id(), entity, actor);
        self.submit_command(command).await
    }

    /// Delete an entity (with cascades) on behalf of `actor`.
    pub async fn delete(
        &self,
        kind: EntityKind,
        key: &str,
        actor: &str,
    ) -> CoreResult<CommitResult> {
        let command = Command::delete(self.next_proposal_id(), kind, key, actor);
        self.submit_command(command).await
    }

    /// Broadcast a proposal and commit it on majority acknowledgement.
    ///
    /// The command is not validated here. The majority threshold is fixed
    /// against the view observed when the proposal starts; a view change
    /// while waiting aborts the proposal.
    pub async fn propose(&self, command: Command, timeout: Duration) -> CoreResult<CommitResult> {
        let inner = &self.inner;
        let _in_flight = InFlight::enter(inner);

        let (view, full_size, mut view_rx) = {
            let membership = inner.membership.lock();
            let mut view_rx = membership.subscribe();
            let view = view_rx.borrow_and_update().clone();
            (view, membership.full_size(), view_rx)
        };
        let required = quorum_size(view.len().max(full_size));

        match self.node_state() {
            NodeState::Active => {}
            NodeState::Degraded => return Err(CoreError::no_quorum(1, required)),
            other => {
                return Err(CoreError::Unavailable {
                    state: other.to_string(),
                })
            }
        }

        let proposal_id = command.proposal_id().clone();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        inner.pending.lock().insert(proposal_id.clone(), ack_tx);

        let mut acknowledged = BTreeSet::from([inner.settings.local.clone()]);
        for peer in view.members.iter().filter(|m| **m != inner.settings.local) {
            inner.send(
                peer,
                PeerMessage::Propose {
                    command: command.clone(),
                },
            );
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = false;
        while acknowledged.len() < required {
            tokio::select! {
                ack = ack_rx.recv() => match ack {
                    Some(from) if view.contains(&from) => {
                        acknowledged.insert(from);
                    }
                    Some(_) => {}
                    None => break,
                },
                changed = view_rx.changed() => {
                    if changed.is_err() || view_rx.borrow().id != view.id {
                        aborted = true;
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        inner.pending.lock().remove(&proposal_id);

        if acknowledged.len() < required {
            tracing::warn!(
                proposal = %proposal_id,
                acknowledged = acknowledged.len(),
                required,
                view_id = view.id,
                aborted,
                "proposal did not reach quorum"
            );
            return Err(CoreError::no_quorum(acknowledged.len(), required));
        }

        let applied = inner.apply_own_commit(&command);
        for peer in view.members.iter().filter(|m| **m != inner.settings.local) {
            inner.send(
                peer,
                PeerMessage::Commit {
                    command: command.clone(),
                },
            );
        }

        let version = match applied {
            Ok(Some(outcome)) => outcome.version,
            Ok(None) => inner.state.version(),
            Err(err) => return Err(err.escalate_contract_violation()),
        };

        Ok(CommitResult {
            proposal_id,
            acknowledgements: acknowledged.len(),
            required,
            view_id: view.id,
            version,
        })
    }
}

struct InFlight<'a>(&'a Inner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a Inner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Inner {
    fn set_state(&self, next: NodeState) {
        let previous = self.node_state.send_replace(next);
        if previous != next {
            tracing::info!(node = %self.settings.local, from = %previous, to = %next, "node state changed");
        }
    }

    fn current_state(&self) -> NodeState {
        *self.node_state.borrow()
    }

    fn send(&self, peer: &str, message: PeerMessage) {
        let kind = message.kind();
        if let Err(err) = self.transport.send(peer, message) {
            tracing::debug!(peer, ?kind, error = %err, "peer send failed");
        }
    }

    fn broadcast(&self, peers: &[String], message: PeerMessage) {
        for peer in peers {
            self.send(peer, message.clone());
        }
    }

    /// Proposal sequences start above wall-clock microseconds so ids stay
    /// unique across restarts of the same node.
    fn seed_sequence(&self) {
        let clock = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let seen = self
            .committed
            .lock()
            .last_sequence(&self.settings.local)
            .unwrap_or(0);
        self.sequence.fetch_max(clock.max(seen), Ordering::AcqRel);
    }

    /// First member of a new cluster: make sure an operator exists and the
    /// local Node is registered and online. Applied locally as commands so
    /// the version moves and joiners pick the records up on sync.
    fn bootstrap_first_member(&self) {
        let local = &self.settings.local;
        let (owner, existing) = self.state.with_read_lock(|state| {
            let owner = if state.users.is_empty() {
                None
            } else if state.users.contains_key(&self.settings.first_user.name) {
                Some(normalize_key(&self.settings.first_user.name))
            } else {
                state
                    .users
                    .iter()
                    .find(|(_, user)| user.admin)
                    .or_else(|| state.users.iter().next())
                    .map(|(key, _)| key.clone())
            };
            (owner, state.nodes.get(local).cloned())
        });

        let owner = match owner {
            Some(owner) => owner,
            None => {
                let user = self.settings.first_user.clone();
                let owner = normalize_key(&user.name);
                self.apply_bootstrap(Command::create(self.next_id(), user.into(), local.as_str()));
                tracing::info!(node = %local, user = %owner, "created first operator account");
                owner
            }
        };

        let node = match existing {
            Some(mut node) => {
                node.address = self.settings.address.clone();
                node.status = NodeStatus::Online;
                Command::update(self.next_id(), node.into(), owner.as_str())
            }
            None => {
                let node =
                    Node::bootstrap(local.clone(), self.settings.address.clone(), owner.clone());
                tracing::info!(node = %local, owner = %owner, "registering local node in new cluster");
                Command::create(self.next_id(), node.into(), owner.as_str())
            }
        };
        self.apply_bootstrap(node);
    }

    fn apply_bootstrap(&self, command: Command) {
        if let Err(err) = self.apply_committed(&command) {
            tracing::error!(node = %self.settings.local, error = %err, "bootstrap command failed");
        }
    }

    fn next_id(&self) -> ProposalId {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        ProposalId::new(self.settings.local.clone(), sequence)
    }

    /// Apply a commit this node proposed. While a sync is collecting, the
    /// command is also buffered so it survives a snapshot install.
    fn apply_own_commit(&self, command: &Command) -> CoreResult<Option<ApplyOutcome>> {
        {
            let mut slot = self.sync.lock();
            if slot.collector.is_some() {
                slot.buffered.push(command.clone());
            }
        }
        self.apply_committed(command)
    }

    /// Apply a committed command once. `Ok(None)` means it was already applied.
    fn apply_committed(&self, command: &Command) -> CoreResult<Option<ApplyOutcome>> {
        let id = command.proposal_id();
        let outcome = {
            let mut window = self.committed.lock();
            if window.contains(id) {
                tracing::debug!(proposal = %id, "commit already applied, skipping");
                return Ok(None);
            }
            let outcome = self.state.apply(command);
            window.record(id);
            outcome
        };

        match &outcome {
            Ok(applied) => {
                tracing::info!(
                    proposal = %id,
                    actor = command.actor(),
                    op = %command.operation(),
                    kind = %command.kind(),
                    key = command.key(),
                    version = applied.version,
                    cascaded = applied.cascaded,
                    "command committed"
                );
                if self.settings.saving_immediately {
                    if let Some(persistence) = &self.persistence {
                        persistence.save(&self.state);
                    }
                }
            }
            Err(err) => {
                tracing::error!(proposal = %id, error = %err, "committed command failed to apply");
            }
        }
        outcome.map(Some)
    }

    /// Start buffering commits until [`Inner::finish_sync`].
    fn begin_sync(&self) -> mpsc::UnboundedReceiver<SyncReply> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sync.lock().collector = Some(tx);
        rx
    }

    /// Ask `peers` for their state and wait for all replies or the timeout.
    async fn collect_snapshots(
        &self,
        mut rx: mpsc::UnboundedReceiver<SyncReply>,
        peers: &[String],
        timeout: Duration,
    ) -> Vec<SyncReply> {
        self.broadcast(peers, PeerMessage::SyncRequest);

        let mut replies: Vec<SyncReply> = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        while replies.len() < peers.len() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(reply)) => {
                    if replies.iter().all(|r| r.from != reply.from) {
                        tracing::debug!(from = %reply.from, version = reply.snapshot.version, "sync reply received");
                        replies.push(reply);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        replies
    }

    /// Install the chosen snapshot, stop buffering and replay buffered commits.
    ///
    /// With `only_if_newer`, the snapshot replaces local state only when its
    /// version is higher. An installed snapshot brings its own applied-id
    /// window, so buffered commits it does not contain are replayed.
    fn finish_sync(&self, best: Option<SyncReply>, only_if_newer: bool) {
        let mut slot = self.sync.lock();
        slot.collector = None;

        if let Some(reply) = best {
            let local_version = self.state.version();
            if !only_if_newer || reply.snapshot.version > local_version {
                let mut window = self.committed.lock();
                window.replace(reply.recent.iter());
                self.state.load_from(reply.snapshot);
                drop(window);
                tracing::info!(
                    node = %self.settings.local,
                    from = %reply.from,
                    version = self.state.version(),
                    previous_version = local_version,
                    "installed peer snapshot"
                );
            }
        }

        let buffered = std::mem::take(&mut slot.buffered);
        if !buffered.is_empty() {
            tracing::info!(node = %self.settings.local, commits = buffered.len(), "replaying buffered commits");
        }
        for command in &buffered {
            let _ = self.apply_committed(command);
        }
    }

    fn handle(self: &Arc<Self>, envelope: Envelope) {
        let Envelope { from, message } = envelope;

        let changed = {
            let mut membership = self.membership.lock();
            if !membership.is_peer(&from) {
                tracing::debug!(from = %from, "ignoring message from unknown node");
                return;
            }
            membership.observe(&from, Instant::now())
        };
        if let Some(view) = changed {
            self.on_view_change(&view);
        }

        tracing::debug!(from = %from, kind = ?message.kind(), "peer message");
        match message {
            PeerMessage::Heartbeat { version, state } => {
                if state.is_serving() {
                    self.observe_peer_version(&from, version);
                }
            }
            PeerMessage::Propose { command } => {
                if self.current_state().is_serving() {
                    self.send(
                        &from,
                        PeerMessage::Ack {
                            proposal_id: command.proposal_id().clone(),
                        },
                    );
                }
            }
            PeerMessage::Ack { proposal_id } => {
                if let Some(waiter) = self.pending.lock().get(&proposal_id) {
                    let _ = waiter.send(from);
                }
            }
            PeerMessage::Commit { command } => {
                let mut slot = self.sync.lock();
                if slot.collector.is_some() {
                    slot.buffered.push(command);
                } else {
                    drop(slot);
                    let _ = self.apply_committed(&command);
                }
            }
            PeerMessage::SyncRequest => {
                if self.current_state().is_serving() {
                    // Same lock order as apply_committed, so the window matches the snapshot.
                    let (snapshot, recent) = {
                        let window = self.committed.lock();
                        (self.state.to_snapshot(), window.recent())
                    };
                    self.send(&from, PeerMessage::SyncResponse { snapshot, recent });
                }
            }
            PeerMessage::SyncResponse { snapshot, recent } => {
                let slot = self.sync.lock();
                if let Some(collector) = &slot.collector {
                    let _ = collector.send(SyncReply {
                        from,
                        snapshot,
                        recent,
                    });
                }
            }
        }
    }

    fn on_view_change(&self, view: &MembershipView) {
        tracing::info!(
            node = %self.settings.local,
            view_id = view.id,
            members = ?view.members,
            "view changed"
        );
        if self.current_state().is_serving() {
            self.refresh_node_statuses(view);
        }
    }

    /// Catch up when a peer stays ahead of local state for longer than a
    /// heartbeat interval, e.g. after a lost `Commit`.
    fn observe_peer_version(self: &Arc<Self>, peer: &str, peer_version: u64) {
        if self.current_state() != NodeState::Active {
            return;
        }
        let local_version = self.state.version();
        let now = Instant::now();
        let behind_for = {
            let mut lagging = self.lagging.lock();
            if let Some((target, _)) = *lagging {
                if target <= local_version {
                    *lagging = None;
                }
            }
            if peer_version <= local_version {
                return;
            }
            match *lagging {
                Some((_, since)) => now.duration_since(since),
                None => {
                    *lagging = Some((peer_version, now));
                    Duration::ZERO
                }
            }
        };
        if behind_for >= self.settings.heartbeat_interval {
            tracing::warn!(
                node = %self.settings.local,
                peer,
                peer_version,
                local_version,
                "behind peer state, re-synchronizing"
            );
            self.lagging.lock().take();
            self.start_resync();
        }
    }

    fn refresh_node_statuses(&self, view: &MembershipView) {
        let online: BTreeSet<String> = view.members.iter().map(|m| normalize_key(m)).collect();
        self.state
            .with_write_lock(|state| state.update_node_statuses(&online));
    }

    /// Periodic liveness work: heartbeats, expiry and the quorum check.
    fn tick(self: &Arc<Self>) {
        let state = self.current_state();
        if state == NodeState::Stopped {
            return;
        }

        let heartbeat = PeerMessage::Heartbeat {
            version: self.state.version(),
            state,
        };
        self.broadcast(&self.settings.peers, heartbeat);

        let changed = self.membership.lock().expire(Instant::now());
        if let Some(view) = changed {
            self.on_view_change(&view);
        }
        self.evaluate_quorum();
    }

    fn evaluate_quorum(self: &Arc<Self>) {
        let (view, full_size) = {
            let membership = self.membership.lock();
            (membership.current(), membership.full_size())
        };
        let majority = view.len() >= quorum_size(full_size);

        match self.current_state() {
            NodeState::Active if !majority => {
                tracing::warn!(
                    node = %self.settings.local,
                    view = view.len(),
                    full = full_size,
                    "quorum lost, rejecting proposals"
                );
                self.set_state(NodeState::Degraded);
            }
            NodeState::Degraded if majority => {
                tracing::info!(node = %self.settings.local, view = view.len(), "majority visible again");
                self.start_resync();
            }
            _ => {}
        }
    }

    /// Spawn one re-sync unless one is already running.
    fn start_resync(self: &Arc<Self>) {
        if self.resyncing.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.resync().await;
            inner.resyncing.store(false, Ordering::Release);
        });
    }

    /// Fetch state from the current view and install it if newer.
    ///
    /// An `Active` node stops serving while it catches up; a `Degraded` one
    /// stays degraded until a reply arrives.
    async fn resync(&self) {
        let resumed_from = self.current_state();
        if !resumed_from.is_serving() {
            return;
        }
        let view = self.membership.lock().current();
        let peers: Vec<String> = view
            .members
            .iter()
            .filter(|m| **m != self.settings.local)
            .cloned()
            .collect();
        tracing::info!(node = %self.settings.local, peers = peers.len(), from = %resumed_from, "re-synchronizing");

        let rx = self.begin_sync();
        if resumed_from == NodeState::Active {
            self.set_state(NodeState::Synchronizing);
        }
        let replies = self.collect_snapshots(rx, &peers, self.settings.sync_timeout).await;
        if replies.is_empty() {
            self.finish_sync(None, true);
            if self.current_state() == NodeState::Synchronizing {
                self.set_state(resumed_from);
            }
            tracing::warn!(node = %self.settings.local, state = %self.current_state(), "re-sync got no replies");
            return;
        }
        let best = replies.into_iter().max_by_key(|reply| reply.snapshot.version);
        self.finish_sync(best, true);

        if matches!(self.current_state(), NodeState::Degraded | NodeState::Synchronizing) {
            self.set_state(NodeState::Active);
            let view = self.membership.lock().current();
            self.refresh_node_statuses(&view);
        }
    }
}

async fn receive_loop(
    inner: Arc<Inner>,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            envelope = inbound.recv() => match envelope {
                Some(envelope) => inner.handle(envelope),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(node = %inner.settings.local, "receive loop exited");
}

async fn heartbeat_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.settings.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => inner.tick(),
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(node = %inner.settings.local, "heartbeat loop exited");
}
