//! Peer transports.
//!
//! A [`Transport`] delivers [`PeerMessage`]s to named peers on a best-effort
//! basis. Delivery failures are silent: the replication protocol tolerates
//! loss through timeouts and quorum, never through retries.
//!
//! [`ChannelNetwork`] is an in-process network with link-level fault
//! injection used by tests and local simulation. The TCP transport lives in
//! [`super::tcp`].

use super::protocol::{Envelope, MessageKind, PeerMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport failures visible to the sender.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("unknown peer '{0}'")]
    UnknownPeer(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound side of a peer connection set.
pub trait Transport: Send + Sync {
    /// Name of the local node; stamped on every envelope.
    fn local_name(&self) -> &str;

    /// Queue `message` for `peer`. Returns once queued, not once delivered.
    fn send(&self, peer: &str, message: PeerMessage) -> Result<(), TransportError>;

    /// Stop sending and release connections.
    fn close(&self);
}

// ============================================================================
// In-memory network
// ============================================================================

#[derive(Debug, Default)]
struct NetworkInner {
    mailboxes: HashMap<String, mpsc::UnboundedSender<Envelope>>,
    isolated: HashSet<String>,
    blocked: HashSet<(String, String)>,
    dropped: HashSet<(String, MessageKind)>,
}

impl NetworkInner {
    fn link_blocked(&self, from: &str, to: &str) -> bool {
        self.isolated.contains(from)
            || self.isolated.contains(to)
            || self.blocked.contains(&link(from, to))
    }
}

fn link(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Shared in-process network. Cloning yields another handle to the same network.
#[derive(Debug, Clone, Default)]
pub struct ChannelNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its transport and inbound queue.
    ///
    /// Reconnecting a name replaces its mailbox.
    pub fn connect(
        &self,
        name: &str,
    ) -> (ChannelTransport, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .mailboxes
            .insert(name.to_string(), tx.clone());
        let transport = ChannelTransport {
            local: name.to_string(),
            network: self.clone(),
            mailbox: tx,
            closed: AtomicBool::new(false),
        };
        (transport, rx)
    }

    /// Cut every link of `name`.
    pub fn isolate(&self, name: &str) {
        self.inner.lock().isolated.insert(name.to_string());
    }

    /// Restore the links of an isolated node.
    pub fn rejoin(&self, name: &str) {
        self.inner.lock().isolated.remove(name);
    }

    /// Cut the link between two nodes in both directions.
    pub fn block(&self, a: &str, b: &str) {
        self.inner.lock().blocked.insert(link(a, b));
    }

    /// Silently drop every message of `kind` addressed to `to`.
    pub fn drop_messages(&self, to: &str, kind: MessageKind) {
        self.inner.lock().dropped.insert((to.to_string(), kind));
    }

    /// Remove all injected faults.
    pub fn heal(&self) {
        let mut inner = self.inner.lock();
        inner.isolated.clear();
        inner.blocked.clear();
        inner.dropped.clear();
    }

    /// Hand an envelope straight to a node, bypassing fault injection.
    ///
    /// Returns false if the node is not connected.
    pub fn deliver(&self, to: &str, envelope: Envelope) -> bool {
        let inner = self.inner.lock();
        match inner.mailboxes.get(to) {
            Some(mailbox) => mailbox.send(envelope).is_ok(),
            None => false,
        }
    }

    fn route(&self, from: &str, to: &str, message: PeerMessage) {
        let inner = self.inner.lock();
        if inner.link_blocked(from, to) {
            tracing::trace!(from, to, kind = ?message.kind(), "link down, message lost");
            return;
        }
        if inner.dropped.contains(&(to.to_string(), message.kind())) {
            tracing::trace!(from, to, kind = ?message.kind(), "message dropped");
            return;
        }
        if let Some(mailbox) = inner.mailboxes.get(to) {
            let _ = mailbox.send(Envelope::new(from, message));
        }
    }

    fn disconnect(&self, name: &str, mailbox: &mpsc::UnboundedSender<Envelope>) {
        let mut inner = self.inner.lock();
        if inner
            .mailboxes
            .get(name)
            .is_some_and(|current| current.same_channel(mailbox))
        {
            inner.mailboxes.remove(name);
        }
    }
}

/// One node's handle on a [`ChannelNetwork`].
#[derive(Debug)]
pub struct ChannelTransport {
    local: String,
    network: ChannelNetwork,
    mailbox: mpsc::UnboundedSender<Envelope>,
    closed: AtomicBool,
}

impl Transport for ChannelTransport {
    fn local_name(&self) -> &str {
        &self.local
    }

    fn send(&self, peer: &str, message: PeerMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.network.route(&self.local, peer, message);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.network.disconnect(&self.local, &self.mailbox);
        }
    }
}
