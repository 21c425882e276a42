//! Level 3 - reconciliation scenarios.
//!
//! The diffing heart of the mutation pipeline: the pre-query reads current
//! linkage, and link/unlink/replace intents reconcile against it into a
//! minimal set of edge operations, validated before any write statement is
//! built.

use graft_mutation::MutationError;
use graft_tests::prelude::*;

fn user_with_spaces(ids: &[&str]) -> serde_json::Value {
    let spaces: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            json!({
                "spaces.name|as:name|card:one|justid:f|idadded:f|scalar:t": format!("Space {id}"),
                "spaces.id|as:id|card:one|justid:f|idadded:t|scalar:t": id,
            })
        })
        .collect();
    json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
        "spaces|as:spaces|card:many|justid:f|idadded:f|scalar:f": spaces,
    })
}

#[tokio::test]
async fn test_replace_diffs_to_minimal_operations() {
    // Currently linked to {a, b}; replace with {b, c} must link c, unlink
    // a, and touch nothing for b.
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&["a", "b"])]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "spaces": [
                {"$op": "replace", "$id": "b"},
                {"$op": "replace", "$id": "c"},
            ]
        }))
        .await
        .unwrap();

    let writes = driver.writes();
    assert_eq!(writes.len(), 1);
    let delete = writes[0].delete.as_deref().unwrap();
    let insert = writes[0].insert.as_deref().unwrap();
    assert!(delete.contains("has id \"a\""));
    assert!(insert.contains("has id \"c\""));
    assert!(!delete.contains("has id \"b\""));
    assert!(!insert.contains("has id \"b\""));

    let entries = result.as_array().unwrap();
    let link = entries
        .iter()
        .find(|e| e["$op"] == json!("create") && e.get("$relation").is_some())
        .unwrap();
    assert_eq!(link["spaces"], json!(["c"]));
    let unlink = entries.iter().find(|e| e["$op"] == json!("unlink")).unwrap();
    assert_eq!(unlink["spaces"], json!(["a"]));
}

#[tokio::test]
async fn test_linking_an_already_linked_id_is_zero_operations() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&["s1"])]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "spaces": [{"$op": "link", "$id": "s1"}]
        }))
        .await
        .unwrap();

    assert!(driver.writes().is_empty());
    assert_eq!(result, json!([]));
}

#[tokio::test]
async fn test_occupied_cardinality_one_slot_is_rejected_before_the_write() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
        "home|as:home|card:one|justid:f|idadded:f|scalar:f": [{
            "home.address|as:address|card:one|justid:f|idadded:f|scalar:t": "1 Main St",
            "home.id|as:id|card:one|justid:f|idadded:t|scalar:t": "h1",
        }],
    })]);
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "home": [{"$op": "link", "$id": "h2"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::OccupiedSlot { current, .. }) if current == "h1"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_unlinking_a_missing_target_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&[])]);
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "spaces": [{"$op": "unlink", "$id": "s9"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::MissingTarget { id, .. }) if id == "s9"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_orphan_temp_id_fails_before_any_write() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&[])]);
    let client = fixture_client(driver.clone());

    let error = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "spaces": [{"$tempId": "x"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::OrphanTempId(temp)) if temp == "x"
    ));
    assert!(driver.writes().is_empty());
}

#[tokio::test]
async fn test_temp_id_links_resolve_to_the_created_instance() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&[])]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!([
            {"$entity": "Space", "id": "s9", "name": "Den", "$tempId": "room"},
            {"$entity": "User", "$id": "u1", "spaces": [{"$tempId": "room"}]}
        ]))
        .await
        .unwrap();

    let entries = result.as_array().unwrap();
    let created = entries
        .iter()
        .find(|e| e["$tempId"] == json!("room") && e["$op"] == json!("create"))
        .unwrap();
    assert_eq!(created["$id"], json!("s9"));
    let link = entries.iter().find(|e| e.get("$relation").is_some()).unwrap();
    assert_eq!(link["spaces"], json!(["s9"]));
    assert_eq!(link["users"], json!(["u1"]));
}

#[tokio::test]
async fn test_null_unlinks_everything_currently_in_the_slot() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![user_with_spaces(&["s1", "s2"])]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({"$entity": "User", "$id": "u1", "spaces": null}))
        .await
        .unwrap();

    let writes = driver.writes();
    let delete = writes[0].delete.as_deref().unwrap();
    assert!(delete.contains("has id \"s1\""));
    assert!(delete.contains("has id \"s2\""));
    assert!(writes[0].insert.is_none());

    let entries = result.as_array().unwrap();
    let unlink = entries.iter().find(|e| e["$op"] == json!("unlink")).unwrap();
    assert_eq!(unlink["spaces"], json!(["s1", "s2"]));
}

#[tokio::test]
async fn test_id_array_updates_split_into_one_write_per_instance() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u2",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .mutate(&json!({"$entity": "User", "$id": ["u1", "u2"], "name": "Team"}))
        .await
        .unwrap();

    // One pre-query per split root, one write for both.
    assert_eq!(driver.reads().len(), 2);
    let entries = result.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["$id"], json!("u1"));
    assert_eq!(entries[1]["$id"], json!("u2"));
    assert!(entries.iter().all(|e| e["$op"] == json!("update")));
}

#[tokio::test]
async fn test_replace_without_prequery_is_rejected_outright() {
    let driver = Arc::new(FakeDriver::new());
    let config = Config {
        mutation: MutationConfig {
            pre_query: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = GraftClient::new(fixture_schema(), driver.clone(), config);

    let error = client
        .mutate(&json!({
            "$entity": "User", "$id": "u1",
            "spaces": [{"$op": "replace", "$id": "s1"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        GraftError::Mutation(MutationError::ReplaceWithoutPreQuery)
    ));
    assert!(driver.reads().is_empty());
    assert!(driver.writes().is_empty());
}
