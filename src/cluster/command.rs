//! Replicated commands.

use crate::model::{normalize_key, Entity, EntityKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Cluster-unique proposal identifier: originating node plus a local sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId {
    pub origin: String,
    pub sequence: u64,
}

impl ProposalId {
    pub fn new(origin: impl Into<String>, sequence: u64) -> Self {
        Self {
            origin: origin.into(),
            sequence,
        }
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.sequence)
    }
}

/// One mutation of one entity.
///
/// A command is immutable once built. Generated keys (calls, activations)
/// are derived from the proposal id, so every replica stores the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    proposal_id: ProposalId,
    operation: Operation,
    kind: EntityKind,
    key: String,
    payload: Option<Entity>,
    actor: String,
}

impl Command {
    /// Create a new entity.
    pub fn create(proposal_id: ProposalId, entity: Entity, actor: impl Into<String>) -> Self {
        let entity = entity.with_generated_id(&proposal_id.to_string());
        Self {
            proposal_id,
            operation: Operation::Create,
            kind: entity.kind(),
            key: entity.key(),
            payload: Some(entity),
            actor: actor.into(),
        }
    }

    /// Replace an existing entity.
    pub fn update(proposal_id: ProposalId, entity: Entity, actor: impl Into<String>) -> Self {
        Self {
            proposal_id,
            operation: Operation::Update,
            kind: entity.kind(),
            key: entity.key(),
            payload: Some(entity),
            actor: actor.into(),
        }
    }

    /// Delete an entity by key.
    pub fn delete(
        proposal_id: ProposalId,
        kind: EntityKind,
        key: &str,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            proposal_id,
            operation: Operation::Delete,
            kind,
            key: normalize_key(key),
            payload: None,
            actor: actor.into(),
        }
    }

    /// Build a command from raw parts without deriving the key from the payload.
    ///
    /// Used by request boundaries that receive the key and body separately;
    /// mismatches are rejected by validation.
    pub fn from_parts(
        proposal_id: ProposalId,
        operation: Operation,
        kind: EntityKind,
        key: &str,
        payload: Option<Entity>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            proposal_id,
            operation,
            kind,
            key: normalize_key(key),
            payload,
            actor: actor.into(),
        }
    }

    pub fn proposal_id(&self) -> &ProposalId {
        &self.proposal_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> Option<&Entity> {
        self.payload.as_ref()
    }

    /// Name of the user on whose behalf the command was issued.
    pub fn actor(&self) -> &str {
        &self.actor
    }
}

/// Outcome of a committed proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub proposal_id: ProposalId,
    /// Distinct nodes that acknowledged, including the proposer.
    pub acknowledgements: usize,
    /// Majority threshold in force when the proposal started.
    pub required: usize,
    /// Membership view the proposal was made against.
    pub view_id: u64,
    /// Local state version after the apply.
    pub version: u64,
}
