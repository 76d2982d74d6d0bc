//! Entity validation.
//!
//! Validation runs on the proposing node only, against the local state as it
//! stands under a read lock. A command that fails here is never proposed.
//!
//! - [`rules`] - Static rule table and field extraction
//! - [`checks`] - Pure field checks

pub mod checks;
pub mod rules;

use crate::cluster::command::{Command, Operation};
use crate::core::error::{CoreError, CoreResult};
use crate::model::{normalize_key, Entity, EntityKind};
use rules::{Check, FieldValue, Rule};
use serde::Serialize;
use std::collections::HashSet;

/// Read-only view of the aggregate used by reference checks.
pub trait AggregateLookup {
    /// Whether an entity of `kind` with `key` exists.
    fn contains(&self, kind: EntityKind, key: &str) -> bool;

    /// Key of the call sign that registered pager `number`, if any.
    fn pager_owner(&self, number: u32) -> Option<String>;
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub code: u32,
    pub field: String,
    pub value: Option<String>,
    pub message: String,
}

impl Violation {
    fn new(rule: &Rule, field: impl Into<String>, value: Option<String>) -> Self {
        Self {
            code: rule.code,
            field: field.into(),
            value,
            message: rule.message.to_string(),
        }
    }
}

/// Switches that change which rules apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Reject pager numbers already registered under another call sign.
    pub check_duplicate_pagers: bool,
}

/// Run every rule for the entity's kind and collect violations in table order.
pub fn validate(
    entity: &Entity,
    lookup: &dyn AggregateLookup,
    options: &ValidationOptions,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut failed_fields: HashSet<&'static str> = HashSet::new();

    for rule in rules::rules_for(entity.kind()) {
        if failed_fields.contains(rule.field) {
            continue;
        }
        let Some(value) = rules::field_value(entity, rule.field) else {
            continue;
        };
        let before = violations.len();
        evaluate(rule, entity, value, lookup, options, &mut violations);
        if violations.len() > before {
            failed_fields.insert(rule.field);
        }
    }

    violations
}

fn evaluate(
    rule: &Rule,
    entity: &Entity,
    value: FieldValue<'_>,
    lookup: &dyn AggregateLookup,
    options: &ValidationOptions,
    out: &mut Vec<Violation>,
) {
    let field = rule.field;
    let passed = match (rule.check, value) {
        (Check::Required, FieldValue::Text(text)) => checks::is_present(text),
        (Check::Length { min, max }, FieldValue::Text(text)) => {
            checks::length_within(text, min, max)
        }
        (Check::Length { min, max }, FieldValue::Names(names)) => {
            (min..=max).contains(&names.len())
        }
        (Check::Length { min, max }, FieldValue::Pagers(pagers)) => {
            (min..=max).contains(&pagers.len())
        }
        (Check::Min(bound), value) => numeric(value).map_or(true, |v| v >= bound),
        (Check::Max(bound), value) => numeric(value).map_or(true, |v| v <= bound),
        (Check::Digits { integer, fraction }, FieldValue::Text(text)) => {
            checks::has_digits(text.trim(), integer, fraction)
        }
        (Check::TimeSlot, FieldValue::Text(text)) => checks::is_valid_time_slot(text),
        (Check::Email, FieldValue::Text(text)) => checks::is_valid_email(text),
        (Check::PagerAddress, FieldValue::Integer(number)) => {
            checks::is_valid_pager_address(number)
        }
        (Check::PagerAddress, FieldValue::Pagers(pagers)) => {
            for (index, pager) in pagers.iter().enumerate() {
                if !checks::is_valid_pager_address(i64::from(pager.number)) {
                    out.push(Violation::new(
                        rule,
                        format!("{}[{}].number", field, index),
                        Some(pager.number.to_string()),
                    ));
                }
            }
            return;
        }
        (Check::PagerNameLength { min, max }, FieldValue::Pagers(pagers)) => {
            for (index, pager) in pagers.iter().enumerate() {
                if !checks::length_within(&pager.name, min, max) {
                    out.push(Violation::new(
                        rule,
                        format!("{}[{}].name", field, index),
                        Some(pager.name.clone()),
                    ));
                }
            }
            return;
        }
        (Check::UniquePagerAddress, FieldValue::Pagers(pagers)) => {
            if !options.check_duplicate_pagers {
                return;
            }
            let own_key = entity.key();
            for (index, pager) in pagers.iter().enumerate() {
                let taken = lookup
                    .pager_owner(pager.number)
                    .is_some_and(|owner| owner != own_key);
                if taken {
                    out.push(Violation::new(
                        rule,
                        format!("{}[{}].number", field, index),
                        Some(pager.number.to_string()),
                    ));
                }
            }
            return;
        }
        (Check::ValidityWindow, FieldValue::Validity(validity)) => match validity {
            Some(window) => match (window.start, window.end) {
                (Some(start), Some(end)) => start < end,
                _ => true,
            },
            None => true,
        },
        (Check::Exists(kind), FieldValue::Text(name)) => lookup.contains(kind, name),
        (Check::AllExist(kind), FieldValue::Names(names)) => {
            for (index, name) in names.iter().enumerate() {
                if !lookup.contains(kind, name) {
                    out.push(Violation::new(
                        rule,
                        format!("{}[{}]", field, index),
                        Some(name.clone()),
                    ));
                }
            }
            return;
        }
        (check, value) => {
            tracing::debug!(?check, ?value, field, "rule does not apply to field type");
            true
        }
    };

    if !passed {
        out.push(Violation::new(rule, field, value.render()));
    }
}

fn numeric(value: FieldValue<'_>) -> Option<f64> {
    match value {
        FieldValue::Integer(v) => Some(v as f64),
        FieldValue::Float(v) => Some(v),
        FieldValue::Text(text) => checks::parse_decimal(text),
        _ => None,
    }
}

/// Full pre-proposal check of a command against the local state.
///
/// Key conflicts surface as [`CoreError::DuplicateKey`] or
/// [`CoreError::NotFound`] before any field rule runs.
pub fn validate_command(
    lookup: &dyn AggregateLookup,
    command: &Command,
    options: &ValidationOptions,
) -> CoreResult<()> {
    let kind = command.kind();
    let key = command.key();

    if let Some(entity) = command.payload() {
        if entity.kind() != kind {
            return Err(CoreError::bad_request(format!(
                "payload is a {} but the command targets {}",
                entity.kind(),
                kind
            )));
        }
        if entity.key() != normalize_key(key) {
            return Err(CoreError::bad_request(format!(
                "payload key '{}' does not match command key '{}'",
                entity.key(),
                key
            )));
        }
    }

    match command.operation() {
        Operation::Create | Operation::Update if command.payload().is_none() => {
            return Err(CoreError::EmptyBody);
        }
        Operation::Create if kind != EntityKind::News && lookup.contains(kind, key) => {
            return Err(CoreError::DuplicateKey {
                kind,
                key: normalize_key(key),
            });
        }
        Operation::Update | Operation::Delete if !lookup.contains(kind, key) => {
            return Err(CoreError::NotFound {
                kind,
                key: normalize_key(key),
            });
        }
        _ => {}
    }

    if let Some(entity) = command.payload() {
        let violations = validate(entity, lookup, options);
        if !violations.is_empty() {
            return Err(CoreError::Validation { violations });
        }
    }

    Ok(())
}
