//! Replication layer.
//!
//! - [`command`] - Replicated commands and proposal ids
//! - [`dedup`] - Bounded window of applied proposal ids
//! - [`protocol`] - Peer messages and frame codec
//! - [`membership`] - View tracking and quorum arithmetic
//! - [`transport`] - Transport trait and the in-memory network
//! - [`tcp`] - TCP transport
//! - [`manager`] - Proposal, commit and synchronization state machine
//!
//! # Invariants
//!
//! - A command is applied only after a strict majority of the configured
//!   membership acknowledged its proposal id.
//! - Peers never apply a proposal on receipt, only on the proposer's commit.
//! - Each proposal id is applied at most once per node.

pub mod command;
pub mod dedup;
pub mod manager;
pub mod membership;
pub mod protocol;
pub mod tcp;
pub mod transport;

pub use command::{Command, CommitResult, Operation, ProposalId};
pub use manager::{ClusterManager, ClusterSettings};
pub use membership::{quorum_size, MembershipView, NodeState};
pub use protocol::{Envelope, MessageKind, PeerMessage};
pub use tcp::TcpTransport;
pub use transport::{ChannelNetwork, ChannelTransport, Transport, TransportError};
