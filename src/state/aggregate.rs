//! State aggregate: every repository behind one reader/writer lock.
//!
//! [`State`] is the plain data (one repository per entity kind plus an apply
//! counter). [`StateAggregate`] owns a `State` behind a task-fair
//! `parking_lot::RwLock` and only hands it out inside closures, so no
//! reference to repository contents can outlive a lock scope.
//!
//! # Lock discipline
//!
//! - Queries, scheduled transmissions and snapshot serialization take the read lock.
//! - Commits, cleaning, node status housekeeping and full reloads take the write lock.
//! - Closures must not re-enter the aggregate; the lock is not recursive.

use super::repository::{Repository, RepositoryEntries};
use crate::cluster::command::{Command, Operation};
use crate::core::error::{CoreError, CoreResult};
use crate::model::{
    normalize_key, refers_to, Activation, Call, CallSign, Entity, EntityKind, NewsList, Node,
    NodeStatus, Rubric, Transmitter, TransmitterGroup, User,
};
use crate::validation::AggregateLookup;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Expiry horizons applied by [`State::clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub call: Duration,
    pub news: Duration,
    pub activation: Duration,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            call: Duration::minutes(1440),
            news: Duration::minutes(1440),
            activation: Duration::minutes(1440),
        }
    }
}

/// Counts removed by one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub calls: usize,
    pub news: usize,
    pub activations: usize,
}

impl CleanReport {
    pub fn total(&self) -> usize {
        self.calls + self.news + self.activations
    }
}

/// Result of applying one committed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// State version after the apply.
    pub version: u64,
    /// Entities removed or rewritten by delete cascades.
    pub cascaded: usize,
}

/// All repositories of one logical database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StateRepr")]
pub struct State {
    /// Number of commands applied; used to pick the freshest peer.
    pub version: u64,
    pub users: Repository<User>,
    pub nodes: Repository<Node>,
    pub transmitters: Repository<Transmitter>,
    pub transmitter_groups: Repository<TransmitterGroup>,
    pub call_signs: Repository<CallSign>,
    pub rubrics: Repository<Rubric>,
    pub news: Repository<NewsList>,
    pub calls: Repository<Call>,
    pub activations: Repository<Activation>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: 0,
            users: Repository::new(EntityKind::User),
            nodes: Repository::new(EntityKind::Node),
            transmitters: Repository::new(EntityKind::Transmitter),
            transmitter_groups: Repository::new(EntityKind::TransmitterGroup),
            call_signs: Repository::new(EntityKind::CallSign),
            rubrics: Repository::new(EntityKind::Rubric),
            news: Repository::new(EntityKind::News),
            calls: Repository::new(EntityKind::Call),
            activations: Repository::new(EntityKind::Activation),
        }
    }
}

#[derive(Deserialize)]
struct StateRepr {
    version: u64,
    users: RepositoryEntries<User>,
    nodes: RepositoryEntries<Node>,
    transmitters: RepositoryEntries<Transmitter>,
    transmitter_groups: RepositoryEntries<TransmitterGroup>,
    call_signs: RepositoryEntries<CallSign>,
    rubrics: RepositoryEntries<Rubric>,
    news: RepositoryEntries<NewsList>,
    calls: RepositoryEntries<Call>,
    activations: RepositoryEntries<Activation>,
}

impl From<StateRepr> for State {
    fn from(repr: StateRepr) -> Self {
        Self {
            version: repr.version,
            users: repr.users.into_repository(EntityKind::User),
            nodes: repr.nodes.into_repository(EntityKind::Node),
            transmitters: repr.transmitters.into_repository(EntityKind::Transmitter),
            transmitter_groups: repr
                .transmitter_groups
                .into_repository(EntityKind::TransmitterGroup),
            call_signs: repr.call_signs.into_repository(EntityKind::CallSign),
            rubrics: repr.rubrics.into_repository(EntityKind::Rubric),
            news: repr.news.into_repository(EntityKind::News),
            calls: repr.calls.into_repository(EntityKind::Call),
            activations: repr.activations.into_repository(EntityKind::Activation),
        }
    }
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry count of the repository for `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::User => self.users.len(),
            EntityKind::Node => self.nodes.len(),
            EntityKind::Transmitter => self.transmitters.len(),
            EntityKind::TransmitterGroup => self.transmitter_groups.len(),
            EntityKind::CallSign => self.call_signs.len(),
            EntityKind::Rubric => self.rubrics.len(),
            EntityKind::News => self.news.len(),
            EntityKind::Call => self.calls.len(),
            EntityKind::Activation => self.activations.len(),
        }
    }

    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        match kind {
            EntityKind::User => self.users.contains_key(key),
            EntityKind::Node => self.nodes.contains_key(key),
            EntityKind::Transmitter => self.transmitters.contains_key(key),
            EntityKind::TransmitterGroup => self.transmitter_groups.contains_key(key),
            EntityKind::CallSign => self.call_signs.contains_key(key),
            EntityKind::Rubric => self.rubrics.contains_key(key),
            EntityKind::News => self.news.contains_key(key),
            EntityKind::Call => self.calls.contains_key(key),
            EntityKind::Activation => self.activations.contains_key(key),
        }
    }

    /// Apply one committed command and bump the version.
    ///
    /// Create is insert-only, update requires an existing key, delete
    /// cascades to every referrer (see [`State::delete`]).
    pub fn apply(&mut self, command: &Command) -> CoreResult<ApplyOutcome> {
        let cascaded = match command.operation() {
            Operation::Create => {
                let entity = command.payload().ok_or(CoreError::EmptyBody)?;
                self.insert_entity(entity.clone())?;
                0
            }
            Operation::Update => {
                let entity = command.payload().ok_or(CoreError::EmptyBody)?;
                if !self.contains(entity.kind(), &entity.key()) {
                    return Err(CoreError::NotFound {
                        kind: entity.kind(),
                        key: entity.key(),
                    });
                }
                self.put_entity(entity.clone());
                0
            }
            Operation::Delete => self.delete(command.kind(), command.key())?,
        };
        self.version += 1;
        Ok(ApplyOutcome {
            version: self.version,
            cascaded,
        })
    }

    fn insert_entity(&mut self, entity: Entity) -> CoreResult<()> {
        let key = entity.key();
        match entity {
            Entity::User(user) => self.users.insert(&key, user),
            Entity::Node(node) => self.nodes.insert(&key, node),
            Entity::Transmitter(transmitter) => self.transmitters.insert(&key, transmitter),
            Entity::TransmitterGroup(group) => self.transmitter_groups.insert(&key, group),
            Entity::CallSign(call_sign) => self.call_signs.insert(&key, call_sign),
            Entity::Rubric(rubric) => {
                self.rubrics.insert(&key, rubric)?;
                if !self.news.contains_key(&key) {
                    self.news.put(&key, NewsList::new());
                }
                Ok(())
            }
            Entity::News(_) => {
                self.put_entity(entity);
                Ok(())
            }
            Entity::Call(call) => self.calls.insert(&key, call),
            Entity::Activation(activation) => self.activations.insert(&key, activation),
        }
    }

    fn put_entity(&mut self, entity: Entity) {
        let key = entity.key();
        match entity {
            Entity::User(user) => {
                self.users.put(&key, user);
            }
            Entity::Node(node) => {
                self.nodes.put(&key, node);
            }
            Entity::Transmitter(transmitter) => {
                self.transmitters.put(&key, transmitter);
            }
            Entity::TransmitterGroup(group) => {
                self.transmitter_groups.put(&key, group);
            }
            Entity::CallSign(call_sign) => {
                self.call_signs.put(&key, call_sign);
            }
            Entity::Rubric(rubric) => {
                self.rubrics.put(&key, rubric);
                if !self.news.contains_key(&key) {
                    self.news.put(&key, NewsList::new());
                }
            }
            Entity::News(news) => match self.news.get_mut(&key) {
                Some(list) => list.post(news),
                None => {
                    let mut list = NewsList::new();
                    list.post(news);
                    self.news.put(&key, list);
                }
            },
            Entity::Call(call) => {
                self.calls.put(&key, call);
            }
            Entity::Activation(activation) => {
                self.activations.put(&key, activation);
            }
        }
    }

    /// Delete one entity and everything that can no longer stand without it.
    ///
    /// A referrer whose only reference in a list field was the deleted key is
    /// deleted in turn; otherwise the reference is stripped. Single-valued
    /// references always delete the referrer. Returns the number of other
    /// entities removed or rewritten.
    pub fn delete(&mut self, kind: EntityKind, key: &str) -> CoreResult<usize> {
        let key = normalize_key(key);
        match kind {
            EntityKind::User => self.delete_user(&key),
            EntityKind::Node => self.delete_node(&key),
            EntityKind::Transmitter => self.delete_transmitter(&key),
            EntityKind::TransmitterGroup => self.delete_transmitter_group(&key),
            EntityKind::CallSign => self.delete_call_sign(&key),
            EntityKind::Rubric => self.delete_rubric(&key),
            EntityKind::News => self.news.remove(&key).map(|_| 0),
            EntityKind::Call => self.calls.remove(&key).map(|_| 0),
            EntityKind::Activation => self.activations.remove(&key).map(|_| 0),
        }
    }

    fn delete_user(&mut self, key: &str) -> CoreResult<usize> {
        self.users.remove(key)?;
        let mut cascaded = 0;

        let (call_signs, stripped) = strip_reference(&mut self.call_signs, key, |c| &mut c.owner_names);
        cascaded += stripped;
        for name in call_signs {
            cascaded += self.delete_if_present(EntityKind::CallSign, &name)?;
        }

        cascaded += self.calls.retain(|call| !refers_to(&call.owner_name, key));
        cascaded += self
            .activations
            .retain(|activation| !refers_to(&activation.owner_name, key));

        let (rubrics, stripped) = strip_reference(&mut self.rubrics, key, |r| &mut r.owner_names);
        cascaded += stripped;
        for name in rubrics {
            cascaded += self.delete_if_present(EntityKind::Rubric, &name)?;
        }

        let (groups, stripped) =
            strip_reference(&mut self.transmitter_groups, key, |g| &mut g.owner_names);
        cascaded += stripped;
        for name in groups {
            cascaded += self.delete_if_present(EntityKind::TransmitterGroup, &name)?;
        }

        let (transmitters, stripped) =
            strip_reference(&mut self.transmitters, key, |t| &mut t.owner_names);
        cascaded += stripped;
        for name in transmitters {
            cascaded += self.delete_if_present(EntityKind::Transmitter, &name)?;
        }

        let (nodes, stripped) = strip_reference(&mut self.nodes, key, |n| &mut n.owner_names);
        cascaded += stripped;
        for name in nodes {
            cascaded += self.delete_if_present(EntityKind::Node, &name)?;
        }

        for list_key in self.news.keys().cloned().collect::<Vec<_>>() {
            if let Some(list) = self.news.get_mut(&list_key) {
                cascaded += list.remove_owned_by(key);
            }
        }

        Ok(cascaded)
    }

    fn delete_node(&mut self, key: &str) -> CoreResult<usize> {
        self.nodes.remove(key)?;
        let mut cascaded = 0;
        for name in self
            .transmitters
            .keys_where(|transmitter| refers_to(&transmitter.node_name, key))
        {
            cascaded += self.delete_if_present(EntityKind::Transmitter, &name)?;
        }
        Ok(cascaded)
    }

    fn delete_transmitter(&mut self, key: &str) -> CoreResult<usize> {
        self.transmitters.remove(key)?;
        let (groups, mut cascaded) =
            strip_reference(&mut self.transmitter_groups, key, |g| &mut g.transmitter_names);
        for name in groups {
            cascaded += self.delete_if_present(EntityKind::TransmitterGroup, &name)?;
        }
        Ok(cascaded)
    }

    fn delete_transmitter_group(&mut self, key: &str) -> CoreResult<usize> {
        self.transmitter_groups.remove(key)?;

        let (rubrics, mut cascaded) =
            strip_reference(&mut self.rubrics, key, |r| &mut r.transmitter_group_names);
        for name in rubrics {
            cascaded += self.delete_if_present(EntityKind::Rubric, &name)?;
        }

        let (calls, stripped) =
            strip_reference(&mut self.calls, key, |c| &mut c.transmitter_group_names);
        cascaded += stripped;
        for id in calls {
            cascaded += self.delete_if_present(EntityKind::Call, &id)?;
        }

        let (activations, stripped) =
            strip_reference(&mut self.activations, key, |a| &mut a.transmitter_group_names);
        cascaded += stripped;
        for id in activations {
            cascaded += self.delete_if_present(EntityKind::Activation, &id)?;
        }

        Ok(cascaded)
    }

    fn delete_call_sign(&mut self, key: &str) -> CoreResult<usize> {
        self.call_signs.remove(key)?;
        let (calls, mut cascaded) =
            strip_reference(&mut self.calls, key, |c| &mut c.call_sign_names);
        for id in calls {
            cascaded += self.delete_if_present(EntityKind::Call, &id)?;
        }
        Ok(cascaded)
    }

    fn delete_rubric(&mut self, key: &str) -> CoreResult<usize> {
        self.rubrics.remove(key)?;
        Ok(usize::from(self.news.remove(key).is_ok()))
    }

    /// Cascade step: the referrer may already be gone through another path.
    fn delete_if_present(&mut self, kind: EntityKind, key: &str) -> CoreResult<usize> {
        if self.contains(kind, key) {
            Ok(1 + self.delete(kind, key)?)
        } else {
            Ok(0)
        }
    }

    /// Remove expired calls, news and activations.
    pub fn clean(&mut self, now: DateTime<Utc>, policy: &ExpirationPolicy) -> CleanReport {
        let calls = self.calls.retain(|call| now <= call.timestamp + policy.call);
        let activations = self
            .activations
            .retain(|activation| now <= activation.timestamp + policy.activation);

        let mut news = 0;
        for key in self.news.keys().cloned().collect::<Vec<_>>() {
            if let Some(list) = self.news.get_mut(&key) {
                news += list.remove_expired(now, policy.news);
            }
        }

        CleanReport {
            calls,
            news,
            activations,
        }
    }

    /// Local housekeeping on a membership change.
    ///
    /// Nodes in `online` become online; nodes previously online but absent
    /// become unknown. Suspended nodes outside the view stay suspended.
    pub fn update_node_statuses(&mut self, online: &BTreeSet<String>) -> usize {
        let mut changed = 0;
        for key in self.nodes.keys().cloned().collect::<Vec<_>>() {
            if let Some(node) = self.nodes.get_mut(&key) {
                let next = if online.contains(&key) {
                    NodeStatus::Online
                } else if node.status == NodeStatus::Online {
                    NodeStatus::Unknown
                } else {
                    node.status
                };
                if next != node.status {
                    node.status = next;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Set the status of a single node, if present.
    pub fn set_node_status(&mut self, name: &str, status: NodeStatus) -> bool {
        match self.nodes.get_mut(name) {
            Some(node) => {
                node.status = status;
                true
            }
            None => false,
        }
    }
}

impl AggregateLookup for State {
    fn contains(&self, kind: EntityKind, key: &str) -> bool {
        State::contains(self, kind, key)
    }

    fn pager_owner(&self, number: u32) -> Option<String> {
        self.call_signs
            .iter()
            .find(|(_, call_sign)| call_sign.pagers.iter().any(|pager| pager.number == number))
            .map(|(key, _)| key.clone())
    }
}

/// Remove `key` from a list field on every entry of `repository`.
///
/// Returns the keys of entries whose list became empty (to be deleted by the
/// caller) and the number of entries that were only rewritten.
fn strip_reference<T>(
    repository: &mut Repository<T>,
    key: &str,
    field: impl Fn(&mut T) -> &mut Vec<String>,
) -> (Vec<String>, usize) {
    let mut emptied = Vec::new();
    let mut rewritten = 0;
    for entry_key in repository.keys().cloned().collect::<Vec<_>>() {
        let Some(entry) = repository.get_mut(&entry_key) else {
            continue;
        };
        let names = field(entry);
        let before = names.len();
        names.retain(|name| !refers_to(name, key));
        if names.len() == before {
            continue;
        }
        if names.is_empty() {
            emptied.push(entry_key);
        } else {
            rewritten += 1;
        }
    }
    (emptied, rewritten)
}

// ============================================================================
// Lock-guarded aggregate
// ============================================================================

/// The single lock-guarded state of one node.
#[derive(Debug, Default)]
pub struct StateAggregate {
    state: RwLock<State>,
}

impl StateAggregate {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregate from a loaded snapshot.
    pub fn from_state(state: State) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Run `f` with shared access. Multiple readers may hold the lock at once.
    pub fn with_read_lock<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let guard = self.state.read();
        f(&guard)
    }

    /// Run `f` with exclusive access.
    pub fn with_write_lock<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.write();
        f(&mut guard)
    }

    /// Apply a committed command under the write lock.
    pub fn apply(&self, command: &Command) -> CoreResult<ApplyOutcome> {
        self.with_write_lock(|state| state.apply(command))
    }

    /// Run a cleaning pass under the write lock.
    pub fn clean(&self, now: DateTime<Utc>, policy: &ExpirationPolicy) -> CleanReport {
        self.with_write_lock(|state| state.clean(now, policy))
    }

    /// Full copy of the current state.
    pub fn to_snapshot(&self) -> State {
        self.with_read_lock(State::clone)
    }

    /// Replace the whole state.
    pub fn load_from(&self, snapshot: State) {
        self.with_write_lock(|state| *state = snapshot);
    }

    pub fn version(&self) -> u64 {
        self.with_read_lock(|state| state.version)
    }
}
