#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use serde_json::json;

use catalogd::{import_batch, FailurePolicy};

#[tokio::test]
async fn catalog_is_written_after_its_product_regardless_of_input_order() {
    let pool = util::temp_pool().await;

    // Catalog (rank 7) comes first in the batch but references an Image
    // and a Product that only appear later; the sorter must write them
    // first or the FK validation would fail.
    let payload = json!([
        {"Catalog": {"id": 1, "nazev": "katalog", "obrazek_id": 1, "products_ids": [1]}},
        util::image_item(1, "obal"),
        util::product_item(1, "produkt"),
    ]);

    let result = import_batch(&pool, &payload, FailurePolicy::RevertAll)
        .await
        .unwrap();
    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.inserted, 3);

    let members: Vec<i64> =
        sqlx::query_scalar("SELECT product_id FROM catalog_products WHERE catalog_id = 1")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(members, vec![1]);
}

#[tokio::test]
async fn whole_dependency_chain_imports_from_shuffled_input() {
    let pool = util::temp_pool().await;

    let payload = json!([
        {"ProductAttributes": {"id": 1, "attribute": 1, "product": 1}},
        {"Attribute": {"id": 1, "nazev_atributu_id": 1, "hodnota_atributu_id": 1}},
        {"Catalog": {"id": 1, "nazev": "vse", "obrazek_id": 1, "attributes_ids": [1]}},
        {"AttributeValue": {"id": 1, "hodnota": "zelena"}},
        {"ProductImage": {"id": 1, "product": 1, "obrazek_id": 1, "nazev": "hlavni"}},
        {"AttributeName": {"id": 1, "nazev": "barva"}},
        util::image_item(1, "foto"),
        util::product_item(1, "tricko"),
    ]);

    let result = import_batch(&pool, &payload, FailurePolicy::RevertAll)
        .await
        .unwrap();
    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.inserted, 8);

    for table in [
        "attribute_names",
        "attribute_values",
        "attributes",
        "products",
        "product_attributes",
        "images",
        "product_images",
        "catalogs",
    ] {
        assert_eq!(util::count_rows(&pool, table).await, 1, "table {table}");
    }
}

#[tokio::test]
async fn same_rank_mutations_apply_in_batch_order() {
    let pool = util::temp_pool().await;

    // With AUTOINCREMENT the store hands out 1 then 2; only the batch
    // order X(id 1), Y(id 2) satisfies the requested ids. An unstable or
    // re-ordered apply would trip the id integrity check.
    let payload = json!([
        util::product_item(1, "X"),
        util::product_item(2, "Y"),
    ]);

    let result = import_batch(&pool, &payload, FailurePolicy::RevertAll)
        .await
        .unwrap();
    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.inserted, 2);

    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, nazev FROM products ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows, vec![(1, "X".into()), (2, "Y".into())]);
}
