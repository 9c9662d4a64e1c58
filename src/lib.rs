use serde_json::Value;
use sqlx::SqlitePool;

pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod registry;
pub mod repo;
mod time;

pub use error::{AppError, AppResult};
pub use import::{FailurePolicy, ImportResult};

/// Run one import batch: normalize, sort by dependency rank, then apply
/// inside a single transaction under the given failure policy.
///
/// This is the operation a transport layer would call with the decoded
/// request body. A non-array payload or any structural error in the
/// batch yields a result carrying only errors; nothing is persisted in
/// that case.
pub async fn import_batch(
    pool: &SqlitePool,
    payload: &Value,
    policy: FailurePolicy,
) -> AppResult<ImportResult> {
    let Some(items) = payload.as_array() else {
        let result = ImportResult::from_errors(vec![
            "a list of inserts and/or updates is required".to_string(),
        ]);
        log_import(&result);
        return Ok(result);
    };

    let mut conn = pool.acquire().await.map_err(AppError::from)?;
    let normalized = import::normalize_batch(conn.as_mut(), items)
        .await
        .map_err(AppError::from)?;
    drop(conn);

    if !normalized.errors.is_empty() {
        let result = ImportResult::from_errors(normalized.errors);
        log_import(&result);
        return Ok(result);
    }

    let mut mutations = normalized.mutations;
    import::sort_mutations(&mut mutations);

    let result = import::apply_mutations(pool, &mutations, policy)
        .await
        .map_err(AppError::from)?;
    log_import(&result);
    Ok(result)
}

fn log_import(result: &ImportResult) {
    if result.errors.is_empty() {
        tracing::info!(
            target = "catalogd",
            event = "import_done",
            inserted = result.inserted,
            updated = result.updated
        );
    } else {
        tracing::error!(
            target = "catalogd",
            event = "import_failed",
            inserted = result.inserted,
            updated = result.updated,
            errors = result.errors.len()
        );
        for err in &result.errors {
            tracing::warn!(target = "catalogd", event = "import_error", msg = %err);
        }
    }
}
