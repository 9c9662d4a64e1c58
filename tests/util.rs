#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    catalogd::migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    pool
}

pub fn product_item(id: i64, nazev: &str) -> Value {
    json!({
        "Product": {
            "id": id,
            "nazev": nazev,
            "description": "popis",
            "cena": "100.00",
        }
    })
}

pub fn image_item(id: i64, nazev: &str) -> Value {
    json!({
        "Image": {
            "id": id,
            "nazev": nazev,
            "obrazek": format!("https://img.example.com/{id}.png"),
        }
    })
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql).fetch_one(pool).await.unwrap()
}
