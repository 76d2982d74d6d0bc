//! Membership view tracking.
//!
//! The view is the local node plus every configured peer heard from within
//! the peer timeout. Each change produces a new immutable [`MembershipView`]
//! with a higher id, published through a `watch` channel.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Lifecycle state of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Joining,
    Synchronizing,
    Active,
    Degraded,
    Stopped,
}

impl NodeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Joining => "joining",
            Self::Synchronizing => "synchronizing",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the node serves peers (acks, sync responses).
    pub const fn is_serving(self) -> bool {
        matches!(self, Self::Active | Self::Degraded)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict majority of `members`.
pub const fn quorum_size(members: usize) -> usize {
    members / 2 + 1
}

/// Immutable membership snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipView {
    pub id: u64,
    pub members: BTreeSet<String>,
}

impl MembershipView {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }
}

/// Liveness bookkeeping for the configured peers.
#[derive(Debug)]
pub struct Membership {
    local: String,
    peers: BTreeSet<String>,
    peer_timeout: Duration,
    last_seen: HashMap<String, Instant>,
    view_tx: watch::Sender<Arc<MembershipView>>,
}

impl Membership {
    /// Start with a view containing only the local node.
    pub fn new(
        local: impl Into<String>,
        peers: impl IntoIterator<Item = String>,
        peer_timeout: Duration,
    ) -> Self {
        let local = local.into();
        let view = MembershipView {
            id: 0,
            members: BTreeSet::from([local.clone()]),
        };
        let (view_tx, _) = watch::channel(Arc::new(view));
        Self {
            local,
            peers: peers.into_iter().collect(),
            peer_timeout,
            last_seen: HashMap::new(),
            view_tx,
        }
    }

    /// Local node plus every configured peer.
    pub fn full_size(&self) -> usize {
        self.peers.len() + 1
    }

    pub fn is_peer(&self, name: &str) -> bool {
        self.peers.contains(name)
    }

    pub fn current(&self) -> Arc<MembershipView> {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MembershipView>> {
        self.view_tx.subscribe()
    }

    /// Record traffic from a peer. Returns the new view if it changed.
    pub fn observe(&mut self, peer: &str, now: Instant) -> Option<Arc<MembershipView>> {
        if !self.peers.contains(peer) {
            return None;
        }
        self.last_seen.insert(peer.to_string(), now);
        self.publish_if_changed(now)
    }

    /// Drop peers silent for longer than the timeout. Returns the new view if it changed.
    pub fn expire(&mut self, now: Instant) -> Option<Arc<MembershipView>> {
        self.publish_if_changed(now)
    }

    fn publish_if_changed(&mut self, now: Instant) -> Option<Arc<MembershipView>> {
        let timeout = self.peer_timeout;
        let mut members: BTreeSet<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) <= timeout)
            .map(|(name, _)| name.clone())
            .collect();
        members.insert(self.local.clone());

        let current = self.current();
        if current.members == members {
            return None;
        }
        let view = Arc::new(MembershipView {
            id: current.id + 1,
            members,
        });
        self.view_tx.send_replace(view.clone());
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership() -> Membership {
        Membership::new(
            "a",
            ["b".to_string(), "c".to_string()],
            Duration::from_millis(100),
        )
    }

    #[test]
    fn quorum_sizes() {
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(2), 2);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
    }

    #[test]
    fn observe_and_expire_bump_view() {
        let mut membership = membership();
        let start = Instant::now();

        let view = membership.observe("b", start).unwrap();
        assert_eq!(view.id, 1);
        assert!(view.contains("b"));
        assert!(membership.observe("b", start).is_none());

        let view = membership.expire(start + Duration::from_millis(200)).unwrap();
        assert_eq!(view.id, 2);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn unknown_senders_are_ignored() {
        let mut membership = membership();
        assert!(membership.observe("stranger", Instant::now()).is_none());
        assert_eq!(membership.current().len(), 1);
        assert_eq!(membership.full_size(), 3);
    }
}
