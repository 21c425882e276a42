//! Level 2 - basic mutation scenarios.
//!
//! Creates, updates and deletes against the fixture schema: enrichment
//! infers operations and applies schema defaults and validation rules, the
//! reconciled plan renders into at most one delete and one insert
//! statement, and the response reports per-write outcomes.

use graft_mutation::MutationError;
use graft_tests::prelude::*;

#[tokio::test]
async fn test_create_applies_defaults_and_writes_once() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({
            "$entity": "User", "id": "u1", "name": "Ann", "email": "ann@example.org"
        }))
        .await
        .unwrap();

    // A pure create runs no pre-query.
    assert!(driver.reads().is_empty());
    let writes = driver.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].delete.is_none());
    let insert = writes[0].insert.as_deref().unwrap();
    assert!(insert.contains(
        "$n0 isa User, has contact_email \"ann@example.org\", has id \"u1\", has name \"Ann\", has role \"member\";"
    ));

    assert_eq!(result[0]["$op"], json!("create"));
    assert_eq!(result[0]["$id"], json!("u1"));
    assert_eq!(result[0]["role"], json!("member"));
    assert!(result[0].get("$error").is_none());
}

#[tokio::test]
async fn test_create_without_required_field_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({"$entity": "User", "id": "u1"}))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::MissingRequired { field, .. }) if field == "name"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_value_outside_the_allowed_set_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({"$entity": "User", "id": "u1", "name": "Ann", "role": "root"}))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::NotAllowedValue { field, .. }) if field == "role"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_json_field_rides_as_a_serialized_string() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    client
        .mutate(&json!({
            "$entity": "User", "id": "u1", "name": "Ann",
            "prefs": {"theme": "dark"}
        }))
        .await
        .unwrap();

    let insert = driver.writes()[0].insert.clone().unwrap();
    assert!(insert.contains(r#"has prefs "{\"theme\":\"dark\"}""#));
}

#[tokio::test]
async fn test_update_rewrites_the_changed_attribute() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({"$entity": "User", "$id": "u1", "name": "Zed"}))
        .await
        .unwrap();

    assert_eq!(driver.reads().len(), 1);
    let writes = driver.writes();
    let delete = writes[0].delete.as_deref().unwrap();
    assert!(delete.contains("$n0 isa User, has id \"u1\";"));
    assert!(delete.ends_with("delete\n$n0 has name $n0_name;"));
    let insert = writes[0].insert.as_deref().unwrap();
    assert!(insert.contains("$n0 has name \"Zed\";"));
    assert_eq!(result[0]["$op"], json!("update"));
}

#[tokio::test]
async fn test_update_of_a_missing_instance_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({"$entity": "User", "$id": "ghost", "name": "Zed"}))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::MissingTarget { id, .. }) if id == "ghost"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_missing_instance_is_ignored_when_configured() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let config = Config {
        mutation: MutationConfig {
            ignore_nonexisting_things: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = GraftClient::new(fixture_schema(), driver.clone(), config);

    let result = client
        .mutate(&json!({"$entity": "User", "$id": "ghost", "name": "Zed"}))
        .await
        .unwrap();

    assert_eq!(result[0]["$op"], json!("update"));
}

#[tokio::test]
async fn test_delete_removes_the_instance_and_inserts_nothing() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({"$entity": "User", "$op": "delete", "$id": "u1"}))
        .await
        .unwrap();

    let writes = driver.writes();
    let delete = writes[0].delete.as_deref().unwrap();
    assert!(delete.contains("$n0 isa User, has id \"u1\";"));
    assert!(delete.ends_with("delete\n$n0 isa User;"));
    assert!(writes[0].insert.is_none());
    // Deletions get no positive confirmation, so no $error either.
    assert_eq!(result[0]["$op"], json!("delete"));
    assert!(result[0].get("$error").is_none());
}

#[tokio::test]
async fn test_create_with_nested_link_emits_the_relation() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({
            "$entity": "User", "id": "u1", "name": "Ann",
            "spaces": ["s1"]
        }))
        .await
        .unwrap();

    let insert = driver.writes()[0].insert.clone().unwrap();
    assert!(insert.contains("match\n$n0 isa Space, has id \"s1\";"));
    assert!(insert.contains("(users: $n1, spaces: $n0) isa Space-User;"));

    let entries = result.as_array().unwrap();
    let edge = entries
        .iter()
        .find(|entry| entry.get("$relation").is_some())
        .unwrap();
    assert_eq!(edge["$op"], json!("create"));
    assert_eq!(edge["users"], json!(["u1"]));
    assert_eq!(edge["spaces"], json!(["s1"]));
}

#[tokio::test]
async fn test_unconfirmed_create_reports_an_error() {
    let driver = Arc::new(FakeDriver::new());
    // A scripted empty outcome: the transaction confirmed nothing.
    driver.stage_write(WriteOutcome::default());
    let client = fixture_client(driver);

    let result = client
        .mutate(&json!({"$entity": "User", "id": "u1", "name": "Ann"}))
        .await
        .unwrap();

    assert_eq!(
        result[0]["$error"],
        json!("not confirmed by the transaction")
    );
}
