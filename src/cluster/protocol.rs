//! Peer messages and their wire framing.
//!
//! Frames are a big-endian `u32` length followed by a bincode-encoded
//! [`Envelope`].

use super::command::{Command, ProposalId};
use super::membership::NodeState;
use crate::state::State;
use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Length prefix size in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest accepted frame body. Full-state sync responses dominate.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Message exchanged between cluster members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    Heartbeat { version: u64, state: NodeState },
    Propose { command: Command },
    Ack { proposal_id: ProposalId },
    Commit { command: Command },
    SyncRequest,
    SyncResponse { snapshot: State, recent: Vec<ProposalId> },
}

/// Discriminant of a [`PeerMessage`], for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    Propose,
    Ack,
    Commit,
    SyncRequest,
    SyncResponse,
}

impl PeerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Heartbeat { .. } => MessageKind::Heartbeat,
            Self::Propose { .. } => MessageKind::Propose,
            Self::Ack { .. } => MessageKind::Ack,
            Self::Commit { .. } => MessageKind::Commit,
            Self::SyncRequest => MessageKind::SyncRequest,
            Self::SyncResponse { .. } => MessageKind::SyncResponse,
        }
    }
}

/// A message tagged with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub message: PeerMessage,
}

impl Envelope {
    pub fn new(from: impl Into<String>, message: PeerMessage) -> Self {
        Self {
            from: from.into(),
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("failed to encode peer envelope")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("failed to decode peer envelope")
    }
}

/// Append one length-prefixed frame to `buffer`.
pub fn encode_frame(envelope: &Envelope, buffer: &mut BytesMut) -> Result<()> {
    let body = envelope.encode()?;
    if body.len() > MAX_FRAME_LEN {
        bail!(
            "frame of {} bytes exceeds limit of {} bytes",
            body.len(),
            MAX_FRAME_LEN
        );
    }
    buffer.reserve(FRAME_HEADER_LEN + body.len());
    buffer.put_u32(body.len() as u32);
    buffer.put_slice(&body);
    Ok(())
}

/// Take one complete frame from `buffer`, if present.
///
/// Returns `Ok(None)` when more bytes are needed. An oversized length prefix
/// is an error; the connection should be dropped.
pub fn decode_frame(buffer: &mut BytesMut) -> Result<Option<Envelope>> {
    if buffer.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds limit of {} bytes", len, MAX_FRAME_LEN);
    }
    if buffer.len() < FRAME_HEADER_LEN + len {
        buffer.reserve(FRAME_HEADER_LEN + len - buffer.len());
        return Ok(None);
    }
    buffer.advance(FRAME_HEADER_LEN);
    let body = buffer.split_to(len);
    Envelope::decode(&body).map(Some)
}
