//! Entity and command validation tests.

mod common;

use common::{
    call, call_sign, epoch, group, minutes, news, node, populated_state, proposal_id, rubric,
    transmitter, user,
};
use pagenet::cluster::{Command, Operation};
use pagenet::core::error::CoreError;
use pagenet::model::{Entity, EntityKind, Pager, Validity};
use pagenet::validation::rules::{
    CALL_SIGN_NAMES, DIGITS, DUPLICATE_PAGER, EMAIL, MAX, MIN, NODE_NAME, NOT_NULL, OWNER_NAME,
    OWNER_NAMES, PAGER_ADDRESS, RUBRIC_NAME, SIZE, TIME_SLOT, TRANSMITTER_GROUP_NAMES,
    TRANSMITTER_NAMES, VALIDITY_WINDOW,
};
use pagenet::validation::{validate, validate_command, ValidationOptions, Violation};

fn violations(entity: impl Into<Entity>) -> Vec<Violation> {
    let state = populated_state();
    validate(&entity.into(), &state, &ValidationOptions::default())
}

fn codes(violations: &[Violation]) -> Vec<(u32, &str)> {
    violations
        .iter()
        .map(|v| (v.code, v.field.as_str()))
        .collect()
}

// ============================================================================
// Field rules
// ============================================================================

#[test]
fn valid_fixtures_pass() {
    let state = populated_state();
    let options = ValidationOptions::default();
    let entities: Vec<Entity> = vec![
        user("bob").into(),
        node("node-b", "admin").into(),
        transmitter("tx-hamburg", "node-a", "admin").into(),
        group("hamburg", &["tx-berlin"], &["admin"]).into(),
        call_sign("DL1XYZ", 200, &["admin"]).into(),
        rubric("sports", 2, &["berlin"], &["admin"]).into(),
        news("weather", "Cloudy", "admin", epoch()).into(),
        call("Hi", &["db0abc"], &["berlin"], "admin", epoch()).into(),
    ];
    for entity in entities {
        assert_eq!(validate(&entity, &state, &options), Vec::new(), "{:?}", entity);
    }
}

#[test]
fn blank_name_reports_only_first_failure() {
    let result = violations(user(""));
    assert_eq!(codes(&result), [(NOT_NULL, "name")]);
    assert_eq!(result[0].message, "must not be blank");
}

#[test]
fn user_name_length_and_mail() {
    let mut bob = user("bo");
    bob.mail = "bob at example".to_string();
    let result = violations(bob);
    assert_eq!(codes(&result), [(SIZE, "name"), (EMAIL, "mail")]);
    assert_eq!(result[1].value.as_deref(), Some("bob at example"));
}

#[test]
fn node_coordinates() {
    let mut station = node("node-b", "admin");
    station.longitude = "181".to_string();
    station.latitude = "45.123456789".to_string();
    let result = violations(station);
    assert_eq!(codes(&result), [(MAX, "longitude"), (DIGITS, "latitude")]);

    let mut station = node("node-b", "admin");
    station.latitude = "-90.5".to_string();
    assert_eq!(codes(&violations(station)), [(MIN, "latitude")]);
}

#[test]
fn node_owners_must_exist() {
    let mut station = node("node-b", "admin");
    station.owner_names = vec!["admin".to_string(), "ghost".to_string()];
    let result = violations(station);
    assert_eq!(codes(&result), [(OWNER_NAMES, "owner_names[1]")]);
    assert_eq!(result[0].value.as_deref(), Some("ghost"));

    let mut station = node("node-b", "admin");
    station.owner_names.clear();
    assert_eq!(codes(&violations(station)), [(SIZE, "owner_names")]);
}

#[test]
fn transmitter_fields() {
    let mut tx = transmitter("tx-hamburg", "node-z", "admin");
    tx.time_slot = "33".to_string();
    tx.power = "250".to_string();
    tx.antenna_direction = 360;
    tx.identification_address = 2_097_152;
    let result = violations(tx);
    assert_eq!(
        codes(&result),
        [
            (NODE_NAME, "node_name"),
            (MAX, "power"),
            (TIME_SLOT, "time_slot"),
            (MAX, "antenna_direction"),
            (PAGER_ADDRESS, "identification_address"),
        ]
    );
}

#[test]
fn transmitter_power_digits() {
    let mut tx = transmitter("tx-hamburg", "node-a", "admin");
    tx.power = "12.3456".to_string();
    assert_eq!(codes(&violations(tx)), [(DIGITS, "power")]);
}

#[test]
fn group_members_must_exist() {
    let result = violations(group("hamburg", &["tx-berlin", "tx-nowhere"], &["admin"]));
    assert_eq!(codes(&result), [(TRANSMITTER_NAMES, "transmitter_names[1]")]);

    let mut hamburg = group("hamburg", &["tx-berlin"], &["admin"]);
    hamburg.description = "x".repeat(61);
    assert_eq!(codes(&violations(hamburg)), [(SIZE, "description")]);
}

#[test]
fn call_sign_pagers() {
    let result = violations(call_sign("DL1XYZ", 2_097_152, &["admin"]));
    assert_eq!(codes(&result), [(PAGER_ADDRESS, "pagers[0].number")]);
    assert_eq!(result[0].value.as_deref(), Some("2097152"));

    let mut sign = call_sign("DL1XYZ", 200, &["admin"]);
    sign.pagers.push(Pager {
        number: 300,
        name: "ab".to_string(),
    });
    assert_eq!(codes(&violations(sign)), [(SIZE, "pagers[1].name")]);

    let mut sign = call_sign("DL1XYZ", 200, &["admin"]);
    sign.pagers.clear();
    assert_eq!(codes(&violations(sign)), [(SIZE, "pagers")]);
}

#[test]
fn duplicate_pagers_only_checked_when_enabled() {
    let state = populated_state();
    let taken: Entity = call_sign("DL1XYZ", 100, &["admin"]).into();

    let relaxed = validate(&taken, &state, &ValidationOptions::default());
    assert!(relaxed.is_empty());

    let strict = ValidationOptions {
        check_duplicate_pagers: true,
    };
    let result = validate(&taken, &state, &strict);
    assert_eq!(codes(&result), [(DUPLICATE_PAGER, "pagers[0].number")]);

    // Re-registering under the owning call sign is not a duplicate.
    let own: Entity = call_sign("DB0ABC", 100, &["admin"]).into();
    assert!(validate(&own, &state, &strict).is_empty());
}

#[test]
fn rubric_number_and_label() {
    let mut sports = rubric("sports", 96, &["berlin"], &["admin"]);
    sports.label = "Sports and more".to_string();
    let result = violations(sports);
    assert_eq!(codes(&result), [(MAX, "number"), (SIZE, "label")]);

    let result = violations(rubric("sports", 0, &["nowhere"], &["admin"]));
    assert_eq!(
        codes(&result),
        [(MIN, "number"), (TRANSMITTER_GROUP_NAMES, "transmitter_group_names[0]")]
    );
}

#[test]
fn news_references_and_validity() {
    let mut item = news("sports", "Kick-off", "ghost", epoch());
    item.number = 11;
    item.validity = Some(Validity {
        start: Some(epoch() + minutes(10)),
        end: Some(epoch()),
    });
    let result = violations(item);
    assert_eq!(
        codes(&result),
        [
            (RUBRIC_NAME, "rubric_name"),
            (MAX, "number"),
            (OWNER_NAME, "owner_name"),
            (VALIDITY_WINDOW, "validity"),
        ]
    );
}

#[test]
fn open_validity_windows_are_fine() {
    let mut item = news("weather", "Until further notice", "admin", epoch());
    item.validity = Some(Validity {
        start: Some(epoch()),
        end: None,
    });
    assert!(violations(item).is_empty());
}

#[test]
fn call_text_and_call_signs() {
    let result = violations(call(&"x".repeat(81), &["nobody"], &["berlin"], "admin", epoch()));
    assert_eq!(
        codes(&result),
        [(SIZE, "text"), (CALL_SIGN_NAMES, "call_sign_names[0]")]
    );
}

// ============================================================================
// Command checks
// ============================================================================

#[test]
fn command_duplicate_key_before_field_rules() {
    let state = populated_state();
    let mut admin = user("ADMIN");
    admin.mail = "broken".to_string();
    let command = Command::create(proposal_id(), admin.into(), "admin");
    let err = validate_command(&state, &command, &ValidationOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { kind: EntityKind::User, ref key } if key == "admin"));
}

#[test]
fn command_update_and_delete_need_existing_key() {
    let state = populated_state();
    let options = ValidationOptions::default();

    let command = Command::update(proposal_id(), user("bob").into(), "admin");
    assert!(matches!(
        validate_command(&state, &command, &options),
        Err(CoreError::NotFound { .. })
    ));

    let command = Command::delete(proposal_id(), EntityKind::CallSign, "DL1XYZ", "admin");
    assert!(matches!(
        validate_command(&state, &command, &options),
        Err(CoreError::NotFound { .. })
    ));

    let command = Command::delete(proposal_id(), EntityKind::CallSign, "DB0ABC", "admin");
    assert!(validate_command(&state, &command, &options).is_ok());
}

#[test]
fn command_without_payload_is_empty_body() {
    let state = populated_state();
    let command = Command::from_parts(
        proposal_id(),
        Operation::Create,
        EntityKind::User,
        "bob",
        None,
        "admin",
    );
    assert!(matches!(
        validate_command(&state, &command, &ValidationOptions::default()),
        Err(CoreError::EmptyBody)
    ));
}

#[test]
fn command_key_must_match_payload() {
    let state = populated_state();
    let command = Command::from_parts(
        proposal_id(),
        Operation::Update,
        EntityKind::User,
        "admin",
        Some(user("bob").into()),
        "admin",
    );
    assert!(matches!(
        validate_command(&state, &command, &ValidationOptions::default()),
        Err(CoreError::BadRequest { .. })
    ));

    let command = Command::from_parts(
        proposal_id(),
        Operation::Create,
        EntityKind::Node,
        "bob",
        Some(user("bob").into()),
        "admin",
    );
    assert!(matches!(
        validate_command(&state, &command, &ValidationOptions::default()),
        Err(CoreError::BadRequest { .. })
    ));
}

#[test]
fn command_collects_violations() {
    let state = populated_state();
    let command = Command::create(
        proposal_id(),
        rubric("sports", 2, &["berlin"], &["ghost"]).into(),
        "admin",
    );
    match validate_command(&state, &command, &ValidationOptions::default()) {
        Err(CoreError::Validation { violations }) => {
            assert_eq!(codes(&violations), [(OWNER_NAMES, "owner_names[0]")]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn news_create_for_existing_rubric_is_not_duplicate() {
    let state = populated_state();
    let command = Command::create(
        proposal_id(),
        news("weather", "Fog", "admin", epoch()).into(),
        "admin",
    );
    assert!(validate_command(&state, &command, &ValidationOptions::default()).is_ok());
}
