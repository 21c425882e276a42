//! Level 1 - query pipeline scenarios.
//!
//! End-to-end reads against the fixture schema: the client compiles one
//! match/fetch statement per selector, the scripted driver replays canned
//! rows, and the parsed tree must come back in the requested nested shape.

use graft_tests::prelude::*;

#[tokio::test]
async fn test_round_trip_returns_metadata_and_computed_fields() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "name|as:name|card:one|justid:f|idadded:f|scalar:t": "Ann",
        "role|as:role|card:one|justid:f|idadded:f|scalar:t": "member",
        "email|as:email|card:one|justid:f|idadded:f|scalar:t": "ann@example.org",
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .query(&json!({"$entity": "User", "$id": "u1"}))
        .await
        .unwrap();

    // Scalar $id collapses the result to one object; the auto-added id
    // surfaces as $id metadata only, and the virtual greeting is computed
    // from the row's own values.
    assert_eq!(
        result,
        json!({
            "$thing": "User",
            "$id": "u1",
            "name": "Ann",
            "role": "member",
            "email": "ann@example.org",
            "greeting": "Hello, Ann",
        })
    );
}

#[tokio::test]
async fn test_inherited_field_fetches_from_ancestor_storage() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let client = fixture_client(driver.clone());

    client
        .query(&json!({"$entity": "User", "$fields": ["email"]}))
        .await
        .unwrap();

    // `email` is declared on Account with a custom storage path; the child
    // keeps it.
    let reads = driver.reads();
    assert!(reads[0].contains(
        "\"email|as:email|card:one|justid:f|idadded:f|scalar:t\": $v0.contact_email;"
    ));
}

#[tokio::test]
async fn test_missing_selector_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    let client = fixture_client(driver.clone());

    let error = client.query(&json!({"$fields": ["name"]})).await.unwrap_err();
    assert!(matches!(error, GraftError::Query(_)));
    assert!(driver.reads().is_empty());
}

#[tokio::test]
async fn test_cardinality_one_link_yields_scalar() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
        "home|as:home|card:one|justid:f|idadded:f|scalar:f": [{
            "home.address|as:address|card:one|justid:f|idadded:f|scalar:t": "1 Main St",
            "home.id|as:id|card:one|justid:f|idadded:t|scalar:t": "h1",
        }],
    })]);
    let client = fixture_client(driver);

    let result = client
        .query(&json!({
            "$entity": "User", "$id": "u1",
            "$fields": [{"$path": "home", "$fields": ["address"]}]
        }))
        .await
        .unwrap();

    // Never a single-element array.
    assert_eq!(
        result["home"],
        json!({"$thing": "House", "$id": "h1", "address": "1 Main St"})
    );
}

#[tokio::test]
async fn test_empty_unique_result_is_null() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let client = fixture_client(driver);

    let result = client
        .query(&json!({"$entity": "User", "$id": "nobody"}))
        .await
        .unwrap();

    assert_eq!(result, json!(null));
}

#[tokio::test]
async fn test_batch_correlates_results_by_index() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "s1",
    })]);
    let client = fixture_client(driver.clone());

    let result = client
        .query(&json!([
            {"$entity": "User", "$id": "u1", "$fields": []},
            {"$entity": "Space", "$id": "s1", "$fields": []}
        ]))
        .await
        .unwrap();

    assert_eq!(result[0], json!({"$thing": "User", "$id": "u1"}));
    assert_eq!(result[1], json!({"$thing": "Space", "$id": "s1"}));
    assert_eq!(driver.reads().len(), 2);
}

#[tokio::test]
async fn test_just_id_children_come_back_as_bare_ids() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
        "spaces|as:spaces|card:many|justid:t|idadded:f|scalar:f": [
            {"spaces.id|as:id|card:one|justid:f|idadded:t|scalar:t": "s1"},
            {"spaces.id|as:id|card:one|justid:f|idadded:t|scalar:t": "s2"},
        ],
    })]);
    let client = fixture_client(driver);

    let result = client
        .query(&json!({
            "$entity": "User", "$id": "u1",
            "$fields": [{"$path": "spaces", "$justId": true}]
        }))
        .await
        .unwrap();

    assert_eq!(result["spaces"], json!(["s1", "s2"]));
}

#[tokio::test]
async fn test_filter_sort_and_window_compile_into_the_statement() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![]);
    let client = fixture_client(driver.clone());

    client
        .query(&json!({
            "$entity": "User",
            "$filter": {"role": "admin"},
            "$sort": [{"field": "name", "desc": true}],
            "$offset": 4,
            "$limit": 2,
        }))
        .await
        .unwrap();

    let statement = &driver.reads()[0];
    assert!(statement.contains("$v0 isa User;"));
    assert!(statement.contains("$v0 has role \"admin\";"));
    // The anti-join picks the minimal value; missing names sort last via
    // the maximal sentinel.
    assert!(statement.contains("not { $v0 has name"));
    assert!(statement.contains("sort $v1 desc;"));
    assert!(statement.contains("offset 4;"));
    assert!(statement.contains("limit 2;"));
}

#[tokio::test]
async fn test_no_metadata_strips_dollar_keys() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "name|as:name|card:one|justid:f|idadded:f|scalar:t": "Ann",
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let config = Config {
        query: QueryConfig {
            no_metadata: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = GraftClient::new(fixture_schema(), driver, config);

    let result = client
        .query(&json!({"$entity": "User", "$id": "u1", "$fields": ["name"]}))
        .await
        .unwrap();

    assert_eq!(result, json!({"name": "Ann"}));
}

#[tokio::test]
async fn test_return_nulls_keeps_requested_but_absent_fields() {
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let config = Config {
        query: QueryConfig {
            return_nulls: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = GraftClient::new(fixture_schema(), driver, config);

    let result = client
        .query(&json!({"$entity": "User", "$id": "u1", "$fields": ["name"]}))
        .await
        .unwrap();

    assert_eq!(result["name"], json!(null));

    // And without the flag the null is dropped.
    let driver = Arc::new(FakeDriver::new());
    driver.stage_read(vec![json!({
        "id|as:id|card:one|justid:f|idadded:t|scalar:t": "u1",
    })]);
    let client = fixture_client(driver);
    let result = client
        .query(&json!({"$entity": "User", "$id": "u1", "$fields": ["name"]}))
        .await
        .unwrap();
    assert!(result.get("name").is_none());
}
