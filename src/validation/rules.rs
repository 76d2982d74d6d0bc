//! Static validation rule table.
//!
//! One row per `{entity kind, field, check, code, message}`. Rows for the
//! same field run in table order; the first failing row for a field ends the
//! checks for that field.

use crate::model::{Entity, EntityKind, Pager, Validity};

/// Closed set of checks a rule can run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Check {
    /// Text must not be blank.
    Required,
    /// Character count for text, element count for lists.
    Length { min: usize, max: usize },
    /// Lower bound for numbers and decimal strings.
    Min(f64),
    /// Upper bound for numbers and decimal strings.
    Max(f64),
    /// Decimal string digit limits.
    Digits { integer: usize, fraction: usize },
    /// Strictly increasing hexadecimal slots.
    TimeSlot,
    Email,
    /// Integer or every pager number fits in 21 bits.
    PagerAddress,
    /// Every pager name has a bounded length.
    PagerNameLength { min: usize, max: usize },
    /// No pager number is registered under another call sign.
    UniquePagerAddress,
    /// Validity start precedes end when both are set.
    ValidityWindow,
    /// Single reference must exist.
    Exists(EntityKind),
    /// Every reference in a list must exist.
    AllExist(EntityKind),
}

/// One row of the rule table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub kind: EntityKind,
    pub field: &'static str,
    pub check: Check,
    pub code: u32,
    pub message: &'static str,
}

/// Borrowed view of one entity field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Names(&'a [String]),
    Integer(i64),
    Float(f64),
    Pagers(&'a [Pager]),
    Validity(Option<&'a Validity>),
}

impl FieldValue<'_> {
    /// Rendering used for the `value` of a violation.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some((*text).to_string()),
            Self::Names(names) => Some(names.join(",")),
            Self::Integer(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Pagers(pagers) => Some(
                pagers
                    .iter()
                    .map(|pager| pager.number.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Validity(None) => None,
            Self::Validity(Some(validity)) => Some(format!(
                "{}..{}",
                validity.start.map(|t| t.to_rfc3339()).unwrap_or_default(),
                validity.end.map(|t| t.to_rfc3339()).unwrap_or_default()
            )),
        }
    }
}

/// Extract a named field from an entity.
pub fn field_value<'a>(entity: &'a Entity, field: &str) -> Option<FieldValue<'a>> {
    use FieldValue as V;

    let value = match (entity, field) {
        (Entity::User(u), "name") => V::Text(&u.name),
        (Entity::User(u), "hash") => V::Text(&u.hash),
        (Entity::User(u), "mail") => V::Text(&u.mail),

        (Entity::Node(n), "name") => V::Text(&n.name),
        (Entity::Node(n), "address") => V::Text(&n.address),
        (Entity::Node(n), "longitude") => V::Text(&n.longitude),
        (Entity::Node(n), "latitude") => V::Text(&n.latitude),
        (Entity::Node(n), "owner_names") => V::Names(&n.owner_names),

        (Entity::Transmitter(t), "name") => V::Text(&t.name),
        (Entity::Transmitter(t), "auth_key") => V::Text(&t.auth_key),
        (Entity::Transmitter(t), "node_name") => V::Text(&t.node_name),
        (Entity::Transmitter(t), "longitude") => V::Text(&t.longitude),
        (Entity::Transmitter(t), "latitude") => V::Text(&t.latitude),
        (Entity::Transmitter(t), "power") => V::Text(&t.power),
        (Entity::Transmitter(t), "time_slot") => V::Text(&t.time_slot),
        (Entity::Transmitter(t), "owner_names") => V::Names(&t.owner_names),
        (Entity::Transmitter(t), "antenna_above_ground_level") => {
            V::Integer(i64::from(t.antenna_above_ground_level))
        }
        (Entity::Transmitter(t), "antenna_direction") => V::Integer(i64::from(t.antenna_direction)),
        (Entity::Transmitter(t), "antenna_gain_dbi") => V::Float(f64::from(t.antenna_gain_dbi)),
        (Entity::Transmitter(t), "identification_address") => {
            V::Integer(i64::from(t.identification_address))
        }

        (Entity::TransmitterGroup(g), "name") => V::Text(&g.name),
        (Entity::TransmitterGroup(g), "description") => V::Text(&g.description),
        (Entity::TransmitterGroup(g), "transmitter_names") => V::Names(&g.transmitter_names),
        (Entity::TransmitterGroup(g), "owner_names") => V::Names(&g.owner_names),

        (Entity::CallSign(c), "name") => V::Text(&c.name),
        (Entity::CallSign(c), "description") => V::Text(&c.description),
        (Entity::CallSign(c), "pagers") => V::Pagers(&c.pagers),
        (Entity::CallSign(c), "owner_names") => V::Names(&c.owner_names),

        (Entity::Rubric(r), "name") => V::Text(&r.name),
        (Entity::Rubric(r), "number") => V::Integer(i64::from(r.number)),
        (Entity::Rubric(r), "label") => V::Text(&r.label),
        (Entity::Rubric(r), "transmitter_group_names") => V::Names(&r.transmitter_group_names),
        (Entity::Rubric(r), "owner_names") => V::Names(&r.owner_names),

        (Entity::News(n), "text") => V::Text(&n.text),
        (Entity::News(n), "rubric_name") => V::Text(&n.rubric_name),
        (Entity::News(n), "number") => V::Integer(i64::from(n.number)),
        (Entity::News(n), "owner_name") => V::Text(&n.owner_name),
        (Entity::News(n), "validity") => V::Validity(n.validity.as_ref()),

        (Entity::Call(c), "text") => V::Text(&c.text),
        (Entity::Call(c), "call_sign_names") => V::Names(&c.call_sign_names),
        (Entity::Call(c), "transmitter_group_names") => V::Names(&c.transmitter_group_names),
        (Entity::Call(c), "owner_name") => V::Text(&c.owner_name),

        (Entity::Activation(a), "number") => V::Integer(i64::from(a.number)),
        (Entity::Activation(a), "transmitter_group_names") => V::Names(&a.transmitter_group_names),
        (Entity::Activation(a), "owner_name") => V::Text(&a.owner_name),

        _ => return None,
    };
    Some(value)
}

/// Rows for one entity kind, in table order.
pub fn rules_for(kind: EntityKind) -> impl Iterator<Item = &'static Rule> {
    RULES.iter().filter(move |rule| rule.kind == kind)
}

const fn rule(
    kind: EntityKind,
    field: &'static str,
    check: Check,
    code: u32,
    message: &'static str,
) -> Rule {
    Rule {
        kind,
        field,
        check,
        code,
        message,
    }
}

pub const NOT_NULL: u32 = 6001;
pub const SIZE: u32 = 6002;
pub const MIN: u32 = 6003;
pub const MAX: u32 = 6004;
pub const DIGITS: u32 = 6005;
pub const TIME_SLOT: u32 = 6101;
pub const EMAIL: u32 = 6102;
pub const PAGER_ADDRESS: u32 = 6103;
pub const DUPLICATE_PAGER: u32 = 6104;
pub const VALIDITY_WINDOW: u32 = 6105;
pub const OWNER_NAME: u32 = 6201;
pub const OWNER_NAMES: u32 = 6202;
pub const TRANSMITTER_GROUP_NAMES: u32 = 6203;
pub const CALL_SIGN_NAMES: u32 = 6204;
pub const RUBRIC_NAME: u32 = 6205;
pub const NODE_NAME: u32 = 6206;
pub const TRANSMITTER_NAMES: u32 = 6207;

use Check::*;
use EntityKind as K;

const UNBOUNDED: usize = usize::MAX;

/// The rule table.
#[rustfmt::skip]
pub static RULES: &[Rule] = &[
    // user
    rule(K::User, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::User, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::User, "hash", Required, NOT_NULL, "must not be blank"),
    rule(K::User, "mail", Required, NOT_NULL, "must not be blank"),
    rule(K::User, "mail", Email, EMAIL, "not a well-formed e-mail address"),
    // node
    rule(K::Node, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::Node, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::Node, "address", Required, NOT_NULL, "must not be blank"),
    rule(K::Node, "longitude", Required, NOT_NULL, "must not be blank"),
    rule(K::Node, "longitude", Digits { integer: 3, fraction: 8 }, DIGITS, "numeric value out of bounds (<3 digits>.<8 digits> expected)"),
    rule(K::Node, "longitude", Min(-180.0), MIN, "must be greater than or equal to -180"),
    rule(K::Node, "longitude", Max(180.0), MAX, "must be less than or equal to 180"),
    rule(K::Node, "latitude", Required, NOT_NULL, "must not be blank"),
    rule(K::Node, "latitude", Digits { integer: 3, fraction: 8 }, DIGITS, "numeric value out of bounds (<3 digits>.<8 digits> expected)"),
    rule(K::Node, "latitude", Min(-90.0), MIN, "must be greater than or equal to -90"),
    rule(K::Node, "latitude", Max(90.0), MAX, "must be less than or equal to 90"),
    rule(K::Node, "owner_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one owner"),
    rule(K::Node, "owner_names", AllExist(K::User), OWNER_NAMES, "owner does not exist"),
    // transmitter
    rule(K::Transmitter, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::Transmitter, "auth_key", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "auth_key", Length { min: 1, max: 64 }, SIZE, "length must be between 1 and 64"),
    rule(K::Transmitter, "node_name", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "node_name", Exists(K::Node), NODE_NAME, "node does not exist"),
    rule(K::Transmitter, "longitude", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "longitude", Digits { integer: 3, fraction: 8 }, DIGITS, "numeric value out of bounds (<3 digits>.<8 digits> expected)"),
    rule(K::Transmitter, "longitude", Min(-180.0), MIN, "must be greater than or equal to -180"),
    rule(K::Transmitter, "longitude", Max(180.0), MAX, "must be less than or equal to 180"),
    rule(K::Transmitter, "latitude", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "latitude", Digits { integer: 3, fraction: 8 }, DIGITS, "numeric value out of bounds (<3 digits>.<8 digits> expected)"),
    rule(K::Transmitter, "latitude", Min(-90.0), MIN, "must be greater than or equal to -90"),
    rule(K::Transmitter, "latitude", Max(90.0), MAX, "must be less than or equal to 90"),
    rule(K::Transmitter, "power", Required, NOT_NULL, "must not be blank"),
    rule(K::Transmitter, "power", Digits { integer: 3, fraction: 3 }, DIGITS, "numeric value out of bounds (<3 digits>.<3 digits> expected)"),
    rule(K::Transmitter, "power", Min(0.0), MIN, "must be greater than or equal to 0"),
    rule(K::Transmitter, "power", Max(200.0), MAX, "must be less than or equal to 200"),
    rule(K::Transmitter, "time_slot", TimeSlot, TIME_SLOT, "time slots must be increasing hexadecimal digits"),
    rule(K::Transmitter, "owner_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one owner"),
    rule(K::Transmitter, "owner_names", AllExist(K::User), OWNER_NAMES, "owner does not exist"),
    rule(K::Transmitter, "antenna_above_ground_level", Min(0.0), MIN, "must be greater than or equal to 0"),
    rule(K::Transmitter, "antenna_above_ground_level", Max(1000.0), MAX, "must be less than or equal to 1000"),
    rule(K::Transmitter, "antenna_direction", Min(0.0), MIN, "must be greater than or equal to 0"),
    rule(K::Transmitter, "antenna_direction", Max(359.0), MAX, "must be less than or equal to 359"),
    rule(K::Transmitter, "antenna_gain_dbi", Min(-50.0), MIN, "must be greater than or equal to -50"),
    rule(K::Transmitter, "antenna_gain_dbi", Max(80.0), MAX, "must be less than or equal to 80"),
    rule(K::Transmitter, "identification_address", PagerAddress, PAGER_ADDRESS, "pager address must be between 0 and 2097151"),
    // transmitter group
    rule(K::TransmitterGroup, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::TransmitterGroup, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::TransmitterGroup, "description", Length { min: 0, max: 60 }, SIZE, "length must be at most 60"),
    rule(K::TransmitterGroup, "transmitter_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one transmitter"),
    rule(K::TransmitterGroup, "transmitter_names", AllExist(K::Transmitter), TRANSMITTER_NAMES, "transmitter does not exist"),
    rule(K::TransmitterGroup, "owner_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one owner"),
    rule(K::TransmitterGroup, "owner_names", AllExist(K::User), OWNER_NAMES, "owner does not exist"),
    // call sign
    rule(K::CallSign, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::CallSign, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::CallSign, "description", Length { min: 0, max: 60 }, SIZE, "length must be at most 60"),
    rule(K::CallSign, "pagers", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one pager"),
    rule(K::CallSign, "pagers", PagerAddress, PAGER_ADDRESS, "pager address must be between 0 and 2097151"),
    rule(K::CallSign, "pagers", PagerNameLength { min: 3, max: 20 }, SIZE, "pager name length must be between 3 and 20"),
    rule(K::CallSign, "pagers", UniquePagerAddress, DUPLICATE_PAGER, "pager address is already registered"),
    rule(K::CallSign, "owner_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one owner"),
    rule(K::CallSign, "owner_names", AllExist(K::User), OWNER_NAMES, "owner does not exist"),
    // rubric
    rule(K::Rubric, "name", Required, NOT_NULL, "must not be blank"),
    rule(K::Rubric, "name", Length { min: 3, max: 20 }, SIZE, "length must be between 3 and 20"),
    rule(K::Rubric, "number", Min(1.0), MIN, "must be greater than or equal to 1"),
    rule(K::Rubric, "number", Max(95.0), MAX, "must be less than or equal to 95"),
    rule(K::Rubric, "label", Required, NOT_NULL, "must not be blank"),
    rule(K::Rubric, "label", Length { min: 1, max: 11 }, SIZE, "length must be between 1 and 11"),
    rule(K::Rubric, "transmitter_group_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one transmitter group"),
    rule(K::Rubric, "transmitter_group_names", AllExist(K::TransmitterGroup), TRANSMITTER_GROUP_NAMES, "transmitter group does not exist"),
    rule(K::Rubric, "owner_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one owner"),
    rule(K::Rubric, "owner_names", AllExist(K::User), OWNER_NAMES, "owner does not exist"),
    // news
    rule(K::News, "text", Required, NOT_NULL, "must not be blank"),
    rule(K::News, "text", Length { min: 1, max: 80 }, SIZE, "length must be between 1 and 80"),
    rule(K::News, "rubric_name", Required, NOT_NULL, "must not be blank"),
    rule(K::News, "rubric_name", Exists(K::Rubric), RUBRIC_NAME, "rubric does not exist"),
    rule(K::News, "number", Min(0.0), MIN, "must be greater than or equal to 0"),
    rule(K::News, "number", Max(10.0), MAX, "must be less than or equal to 10"),
    rule(K::News, "owner_name", Required, NOT_NULL, "must not be blank"),
    rule(K::News, "owner_name", Exists(K::User), OWNER_NAME, "owner does not exist"),
    rule(K::News, "validity", ValidityWindow, VALIDITY_WINDOW, "validity start must precede its end"),
    // call
    rule(K::Call, "text", Required, NOT_NULL, "must not be blank"),
    rule(K::Call, "text", Length { min: 1, max: 80 }, SIZE, "length must be between 1 and 80"),
    rule(K::Call, "call_sign_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one call sign"),
    rule(K::Call, "call_sign_names", AllExist(K::CallSign), CALL_SIGN_NAMES, "call sign does not exist"),
    rule(K::Call, "transmitter_group_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one transmitter group"),
    rule(K::Call, "transmitter_group_names", AllExist(K::TransmitterGroup), TRANSMITTER_GROUP_NAMES, "transmitter group does not exist"),
    rule(K::Call, "owner_name", Required, NOT_NULL, "must not be blank"),
    rule(K::Call, "owner_name", Exists(K::User), OWNER_NAME, "owner does not exist"),
    // activation
    rule(K::Activation, "number", PagerAddress, PAGER_ADDRESS, "pager address must be between 0 and 2097151"),
    rule(K::Activation, "transmitter_group_names", Length { min: 1, max: UNBOUNDED }, SIZE, "must contain at least one transmitter group"),
    rule(K::Activation, "transmitter_group_names", AllExist(K::TransmitterGroup), TRANSMITTER_GROUP_NAMES, "transmitter group does not exist"),
    rule(K::Activation, "owner_name", Required, NOT_NULL, "must not be blank"),
    rule(K::Activation, "owner_name", Exists(K::User), OWNER_NAME, "owner does not exist"),
];
