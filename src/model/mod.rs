//! Network object model.
//!
//! - [`entities`] - Entity structs and the [`Entity`] variant wrapper
//! - [`news`] - Per-rubric news slots
//!
//! All entity keys are case-insensitive; [`normalize_key`] is applied before
//! any repository access.

pub mod entities;
pub mod news;

pub use entities::{
    Activation, AntennaType, Call, CallSign, Entity, Node, NodeStatus, Pager, Rubric,
    Transmitter, TransmitterGroup, TransmitterStatus, TransmitterUsage, User, Validity,
};
pub use news::{News, NewsList, NEWS_SLOTS};

use serde::{Deserialize, Serialize};

/// Largest pager address representable in 21 bits.
pub const MAX_PAGER_ADDRESS: u32 = (1 << 21) - 1;

/// Entity type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Node,
    Transmitter,
    TransmitterGroup,
    CallSign,
    Rubric,
    News,
    Call,
    Activation,
}

impl EntityKind {
    /// Every kind, in repository declaration order.
    pub const ALL: [EntityKind; 9] = [
        EntityKind::User,
        EntityKind::Node,
        EntityKind::Transmitter,
        EntityKind::TransmitterGroup,
        EntityKind::CallSign,
        EntityKind::Rubric,
        EntityKind::News,
        EntityKind::Call,
        EntityKind::Activation,
    ];

    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Node => "node",
            Self::Transmitter => "transmitter",
            Self::TransmitterGroup => "transmitter_group",
            Self::CallSign => "call_sign",
            Self::Rubric => "rubric",
            Self::News => "news",
            Self::Call => "call",
            Self::Activation => "activation",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a natural key for storage and lookup.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Compare a reference against an already normalized key.
pub fn refers_to(reference: &str, normalized_key: &str) -> bool {
    normalize_key(reference) == normalized_key
}
