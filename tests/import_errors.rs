#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use serde_json::json;

use catalogd::{import_batch, FailurePolicy};

#[tokio::test]
async fn non_array_payload_is_rejected_up_front() {
    let pool = util::temp_pool().await;

    let result = import_batch(
        &pool,
        &json!({"Product": {"id": 1, "nazev": "ne"}}),
        FailurePolicy::RevertAll,
    )
    .await
    .unwrap();

    assert!(!result.is_success());
    assert_eq!(
        result.errors,
        vec!["a list of inserts and/or updates is required".to_string()]
    );
    assert_eq!(util::count_rows(&pool, "products").await, 0);
}

#[tokio::test]
async fn unknown_entity_type_is_a_structural_error() {
    let pool = util::temp_pool().await;

    let result = import_batch(
        &pool,
        &json!([{"Widget": {"id": 1, "nazev": "neexistuje"}}]),
        FailurePolicy::RevertAll,
    )
    .await
    .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("known entity type"));
    assert!(result.errors[0].contains("item 0, Widget"));
}

#[tokio::test]
async fn missing_id_is_a_structural_error() {
    let pool = util::temp_pool().await;

    let result = import_batch(
        &pool,
        &json!([{"Product": {"nazev": "bez id"}}]),
        FailurePolicy::RevertAll,
    )
    .await
    .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("must contain the value 'id'"));
    assert!(result.errors[0].contains("Product"));
}

#[tokio::test]
async fn non_integer_id_is_reported_as_such() {
    let pool = util::temp_pool().await;

    let result = import_batch(
        &pool,
        &json!([{"Product": {"id": "abc", "nazev": "spatne id"}}]),
        FailurePolicy::RevertAll,
    )
    .await
    .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("'id' must be an integer"));
    assert!(result.errors[0].contains("Product"));
}

#[tokio::test]
async fn missing_foreign_key_target_fails_validation() {
    let pool = util::temp_pool().await;

    // Both references point at rows that do not exist; the batch fails
    // validation before anything reaches the store.
    let result = import_batch(
        &pool,
        &json!([{"ProductAttributes": {"id": 1, "attribute": 999, "product": 999}}]),
        FailurePolicy::StopAndKeep,
    )
    .await
    .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("references a missing row in attributes (id 999)"));
    assert!(result.errors[0].contains("references a missing row in products (id 999)"));
    assert_eq!(result.inserted, 0);
    assert_eq!(util::count_rows(&pool, "product_attributes").await, 0);
}

#[tokio::test]
async fn multi_key_and_non_object_items_are_structural_errors() {
    let pool = util::temp_pool().await;

    let payload = json!([
        {"Product": {"id": 1}, "Image": {"id": 1}},
        "not an object",
        {"Product": []},
    ]);
    let result = import_batch(&pool, &payload, FailurePolicy::RevertAll)
        .await
        .unwrap();

    assert_eq!(result.errors.len(), 3);
    assert!(result.errors[0].contains("item 0"));
    assert!(result.errors[1].contains("item 1"));
    assert!(result.errors[2].contains("mapping of fields"));
}

#[tokio::test]
async fn any_structural_error_blocks_the_valid_items_too() {
    let pool = util::temp_pool().await;

    // The first item would import fine on its own; the malformed second
    // item keeps the whole batch out of the store under either policy.
    let payload = json!([
        util::product_item(1, "platny"),
        {"Bogus": {"id": 2}},
    ]);

    for policy in [FailurePolicy::StopAndKeep, FailurePolicy::RevertAll] {
        let result = import_batch(&pool, &payload, policy).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.inserted, 0);
        assert_eq!(util::count_rows(&pool, "products").await, 0);
    }
}

#[tokio::test]
async fn structural_errors_keep_batch_order() {
    let pool = util::temp_pool().await;

    let payload = json!([
        {"Bogus": {"id": 1}},
        util::product_item(1, "ok"),
        {"Image": {"nazev": "bez id"}},
    ]);
    let result = import_batch(&pool, &payload, FailurePolicy::RevertAll)
        .await
        .unwrap();

    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].contains("item 0"));
    assert!(result.errors[1].contains("item 2"));
}
