//! Pagenet - replicated state engine for a paging network.
//!
//! Every node holds the full network state: users, nodes, transmitters,
//! transmitter groups, call signs, rubrics with their news slots, calls and
//! activations. Mutations are validated locally, proposed to all peers and
//! applied once a majority of the cluster has acknowledged them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CLI / Runtime                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │       Cluster Manager        │   │          Scheduler           │
//! │  propose │ ack │ sync │ view │   │  broadcasts │ save │ clean   │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              State Aggregate (validation, cascades)             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Snapshot Persistence (JSON)                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::time`] - Clock abstraction
//! - [`core::error`] - Error types and the external error table
//!
//! ## Model
//! - [`model`] - Entity types, entity kinds and key normalization
//!
//! ## State
//! - [`state::repository`] - Keyed, insertion-ordered entity maps
//! - [`state::aggregate`] - The state aggregate, cascading deletes, cleaning
//! - [`state::persistence`] - Atomic JSON snapshots
//!
//! ## Validation
//! - [`validation::rules`] - Declarative per-field constraint table
//! - [`validation::checks`] - Field format checks
//!
//! ## Cluster
//! - [`cluster::manager`] - Proposal, acknowledgement and synchronization
//! - [`cluster::membership`] - Membership views and node states
//! - [`cluster::protocol`] - Peer messages and framing
//! - [`cluster::transport`] - Transport trait and in-memory network
//! - [`cluster::tcp`] - TCP peer transport
//!
//! ## Scheduler
//! - [`scheduler::jobs`] - Periodic broadcasts, saving and cleaning
//!
//! # Key Invariants
//!
//! - Every referenced key resolves to an existing entity after each commit.
//! - Deleting an entity removes or rewrites everything that referred to it.
//! - A mutation is applied only after a majority of the cluster acknowledged it.
//! - Snapshots are written atomically and always describe a committed state.

// Core infrastructure
pub mod core;

// Entity model
pub mod model;

// State aggregate and persistence
pub mod state;

// Entity validation
pub mod validation;

// Replication
pub mod cluster;

// Periodic jobs
pub mod scheduler;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime, time};
pub use cluster::{ClusterManager, Command, NodeState};
pub use model::{Entity, EntityKind};
pub use state::{Persistence, State, StateAggregate};
