//! Entity structs.

use super::news::News;
use super::{normalize_key, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    /// Password hash, opaque to the engine.
    pub hash: String,
    pub mail: String,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// Create a non-admin user.
    pub fn new(name: impl Into<String>, hash: impl Into<String>, mail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            mail: mail.into(),
            admin: false,
        }
    }
}

/// Reachability of a cluster node as last observed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Suspended,
    Unknown,
}

/// Cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: String,
    pub longitude: String,
    pub latitude: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub owner_names: Vec<String>,
}

impl Node {
    /// Node record registered by the first member of a new cluster.
    pub fn bootstrap(
        name: impl Into<String>,
        address: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            longitude: "0".to_string(),
            latitude: "0".to_string(),
            status: NodeStatus::Online,
            owner_names: vec![owner.into()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmitterStatus {
    Offline,
    Online,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmitterUsage {
    Widerange,
    Personal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntennaType {
    Omni,
    Directional,
}

/// Paging transmitter attached to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmitter {
    pub name: String,
    pub auth_key: String,
    pub node_name: String,
    pub longitude: String,
    pub latitude: String,
    /// Output power in watts, as a decimal string.
    pub power: String,
    /// Hexadecimal time slots, strictly increasing (e.g. "0123").
    pub time_slot: String,
    pub owner_names: Vec<String>,
    pub status: TransmitterStatus,
    pub usage: TransmitterUsage,
    pub antenna_above_ground_level: i32,
    pub antenna_type: AntennaType,
    pub antenna_direction: i32,
    pub antenna_gain_dbi: f32,
    pub identification_address: u32,
    #[serde(default)]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected_since: Option<DateTime<Utc>>,
}

/// Named set of transmitters addressed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitterGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub transmitter_names: Vec<String>,
    pub owner_names: Vec<String>,
}

/// One pager registered under a call sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub number: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSign {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub numeric: bool,
    pub pagers: Vec<Pager>,
    pub owner_names: Vec<String>,
}

/// Broadcast channel for news.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub name: String,
    pub number: u32,
    pub label: String,
    pub transmitter_group_names: Vec<String>,
    pub owner_names: Vec<String>,
}

impl Rubric {
    /// Pager address the rubric is broadcast on.
    pub fn address(&self) -> u32 {
        1000 + self.number
    }
}

/// Optional time window during which an entity is relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Personal page to one or more call signs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Generated id; empty until the creating command assigns one.
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub call_sign_names: Vec<String>,
    pub transmitter_group_names: Vec<String>,
    #[serde(default)]
    pub emergency: bool,
    pub timestamp: DateTime<Utc>,
    pub owner_name: String,
}

/// Pager activation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    #[serde(default)]
    pub id: String,
    pub number: u32,
    pub transmitter_group_names: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub owner_name: String,
}

/// Any storable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    User(User),
    Node(Node),
    Transmitter(Transmitter),
    TransmitterGroup(TransmitterGroup),
    CallSign(CallSign),
    Rubric(Rubric),
    News(News),
    Call(Call),
    Activation(Activation),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Node(_) => EntityKind::Node,
            Self::Transmitter(_) => EntityKind::Transmitter,
            Self::TransmitterGroup(_) => EntityKind::TransmitterGroup,
            Self::CallSign(_) => EntityKind::CallSign,
            Self::Rubric(_) => EntityKind::Rubric,
            Self::News(_) => EntityKind::News,
            Self::Call(_) => EntityKind::Call,
            Self::Activation(_) => EntityKind::Activation,
        }
    }

    /// Normalized repository key. News is keyed by its rubric.
    pub fn key(&self) -> String {
        let raw = match self {
            Self::User(user) => &user.name,
            Self::Node(node) => &node.name,
            Self::Transmitter(transmitter) => &transmitter.name,
            Self::TransmitterGroup(group) => &group.name,
            Self::CallSign(call_sign) => &call_sign.name,
            Self::Rubric(rubric) => &rubric.name,
            Self::News(news) => &news.rubric_name,
            Self::Call(call) => &call.id,
            Self::Activation(activation) => &activation.id,
        };
        normalize_key(raw)
    }

    /// Fill in a generated id if this kind uses one and none is set yet.
    pub fn with_generated_id(mut self, id: &str) -> Self {
        match &mut self {
            Self::Call(call) if call.id.trim().is_empty() => call.id = id.to_string(),
            Self::Activation(activation) if activation.id.trim().is_empty() => {
                activation.id = id.to_string()
            }
            _ => {}
        }
        self
    }
}

macro_rules! entity_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

entity_from!(
    User,
    Node,
    Transmitter,
    TransmitterGroup,
    CallSign,
    Rubric,
    News,
    Call,
    Activation,
);
