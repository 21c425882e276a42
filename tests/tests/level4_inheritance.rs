//! Level 4 - inheritance scenarios.
//!
//! `User` extends `Account`, so every request against `User` exercises the
//! flattened field lists and the ancestor-stable storage paths the
//! enrichment computed.

use graft_mutation::MutationError;
use graft_schema::enrich_schema;
use graft_tests::prelude::*;

#[tokio::test]
async fn test_create_writes_inherited_fields_to_ancestor_storage() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    client
        .mutate(&json!({
            "$entity": "User", "id": "u1", "name": "Ann", "email": "ann@example.org"
        }))
        .await
        .unwrap();

    let insert = driver.writes()[0].insert.clone().unwrap();
    assert!(insert.contains("has contact_email \"ann@example.org\""));
    assert!(!insert.contains("has email "));
}

#[tokio::test]
async fn test_inherited_validation_rules_still_apply() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({
            "$entity": "User", "id": "u1", "name": "Ann", "email": "not-an-address"
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::PatternViolation { field, .. }) if field == "email"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_parent_thing_remains_addressable() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "email|as:email|card:one|justid:f|idadded:f|scalar:t": "root@example.org",
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "a1",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .query(&json!({"$entity": "Account", "$id": "a1"}))
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({"$thing": "Account", "$id": "a1", "email": "root@example.org"})
    );
    assert!(driver.reads()[0].contains("$v0 isa Account;"));
}

#[tokio::test]
async fn test_inherited_id_field_folds_into_the_filter() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let client = fixture_client(driver.clone());

    client
        .query(&json!({"$entity": "User", "$id": "u1"}))
        .await
        .unwrap();

    // The id field comes from Account; the match still binds it directly.
    assert!(driver.reads()[0].contains("$v0 has id \"u1\";"));
}

#[test]
fn test_fixture_enrichment_is_idempotent() {
    let once = fixture_schema();
    let twice = enrich_schema(once.clone()).unwrap();

    for (name, thing) in &once.things {
        let again = twice.thing(name).unwrap();
        assert_eq!(thing.all_extends, again.all_extends);
        assert_eq!(thing.data_fields, again.data_fields);
        for (path, field) in &thing.link_fields {
            assert_eq!(
                field.opposite_players,
                again.link_field(path).unwrap().opposite_players
            );
        }
    }
}
