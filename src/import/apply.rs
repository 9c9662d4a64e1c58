use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use super::normalize::PendingMutation;
use super::report::ImportResult;
use crate::registry::{EntityDescriptor, FieldKind};
use crate::repo;

/// What happens to rows persisted before the first failure.
///
/// Threaded in at call time so concurrent callers and tests can vary it;
/// never process-global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Commit the batch as-is: everything persisted before the failure
    /// stays durable, counts reflect only what was persisted.
    StopAndKeep,
    /// Roll the whole transaction back: nothing from the batch is
    /// durable and counts are reported as zero.
    RevertAll,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ImportError> for crate::error::AppError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::Database(err) => Self::from(err),
        }
    }
}

enum Persisted {
    Inserted,
    Updated,
    /// Every supplied value already matched the stored row.
    Unchanged,
    /// The store assigned a different id than the batch requested.
    IdMismatch { assigned: i64 },
}

/// Apply sorted mutations inside a single transaction.
///
/// Every mutation is validated even after a failure, so the caller gets
/// the full error list; persistence stops at the first failure. The
/// failure policy only decides whether the transaction commits or rolls
/// back once the loop finishes.
pub async fn apply_mutations(
    pool: &SqlitePool,
    mutations: &[PendingMutation],
    policy: FailurePolicy,
) -> Result<ImportResult, ImportError> {
    let mut tx = pool.begin().await?;

    let mut inserted = 0_u64;
    let mut updated = 0_u64;
    let mut errors: Vec<String> = Vec::new();
    let mut failed = false;

    for mutation in mutations {
        let validated = match mutation
            .entity
            .validate(&mutation.fields, tx.as_mut(), mutation.is_insert)
            .await
        {
            Ok(v) => v,
            Err(field_errors) => {
                failed = true;
                errors.push(format!(
                    "data aren't valid: {} {} ({})",
                    mutation.entity.type_name,
                    payload(mutation),
                    field_errors.join("; ")
                ));
                continue;
            }
        };

        if failed {
            // Once failed we only keep validating for error reporting.
            continue;
        }

        match persist(&mut tx, mutation, &validated).await {
            Ok(Persisted::Inserted) => inserted += 1,
            Ok(Persisted::Updated) => updated += 1,
            Ok(Persisted::Unchanged) => {}
            Ok(Persisted::IdMismatch { assigned }) => {
                failed = true;
                if policy == FailurePolicy::StopAndKeep {
                    // The commit must keep prior rows but not this
                    // corrupted one.
                    repo::delete_row(tx.as_mut(), mutation.entity, assigned).await?;
                }
                errors.push(format!(
                    "id mismatch, different id expected, {} {} but id {assigned} received",
                    mutation.entity.type_name,
                    payload(mutation)
                ));
            }
            Err(sqlx::Error::Database(db_err)) => {
                failed = true;
                errors.push(format!(
                    "cannot update database (integrity error), {} {}: {}",
                    mutation.entity.type_name,
                    payload(mutation),
                    db_err.message()
                ));
            }
            Err(other) => return Err(other.into()),
        }
    }

    if failed && policy == FailurePolicy::RevertAll {
        tx.rollback().await?;
        tracing::warn!(target = "catalogd", event = "import_reverted", errors = errors.len());
        return Ok(ImportResult::from_errors(errors));
    }

    tx.commit().await?;
    Ok(ImportResult {
        inserted,
        updated,
        errors,
    })
}

fn payload(mutation: &PendingMutation) -> String {
    serde_json::to_string(&mutation.fields).unwrap_or_else(|_| "<payload>".into())
}

async fn persist(
    tx: &mut Transaction<'_, Sqlite>,
    mutation: &PendingMutation,
    validated: &Map<String, Value>,
) -> Result<Persisted, sqlx::Error> {
    if mutation.is_insert {
        let assigned = repo::insert_row(tx.as_mut(), mutation.entity, validated).await?;
        for spec in mutation.entity.fields {
            if let FieldKind::IdSet {
                link_table,
                owner_column,
                member_column,
                ..
            } = spec.kind
            {
                if let Some(Value::Array(items)) = validated.get(spec.name) {
                    let ids: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
                    repo::write_id_set(
                        tx.as_mut(),
                        link_table,
                        owner_column,
                        member_column,
                        assigned,
                        &ids,
                    )
                    .await?;
                }
            }
        }
        if assigned != mutation.id {
            return Ok(Persisted::IdMismatch { assigned });
        }
        return Ok(Persisted::Inserted);
    }

    let existing = match &mutation.existing {
        Some(row) => row,
        None => unreachable!("update mutation carries a snapshot"),
    };

    let (changed, set_changes) = diff_fields(mutation.entity, validated, existing);

    repo::update_row(tx.as_mut(), mutation.entity, mutation.id, &changed).await?;
    let wrote_sets = !set_changes.is_empty();
    for (link_table, owner_column, member_column, ids) in set_changes {
        repo::write_id_set(
            tx.as_mut(),
            link_table,
            owner_column,
            member_column,
            mutation.id,
            &ids,
        )
        .await?;
    }

    if changed.is_empty() && !wrote_sets {
        Ok(Persisted::Unchanged)
    } else {
        Ok(Persisted::Updated)
    }
}

type SetChange = (&'static str, &'static str, &'static str, Vec<i64>);

/// Pure diff of validated fields against the stored snapshot.
///
/// Scalar fields are kept only when their value actually differs; id-set
/// fields compare as sets and are skipped entirely when equal, so a
/// same-content update never touches the link table.
fn diff_fields(
    entity: &EntityDescriptor,
    validated: &Map<String, Value>,
    existing: &Map<String, Value>,
) -> (Map<String, Value>, Vec<SetChange>) {
    let mut changed = Map::new();
    let mut set_changes = Vec::new();

    for spec in entity.fields {
        let Some(new_value) = validated.get(spec.name) else {
            continue;
        };
        match spec.kind {
            FieldKind::IdSet {
                link_table,
                owner_column,
                member_column,
                ..
            } => {
                let new_set: BTreeSet<i64> = new_value
                    .as_array()
                    .map(|items| items.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default();
                let current_set: BTreeSet<i64> = existing
                    .get(spec.name)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default();
                if new_set != current_set {
                    set_changes.push((
                        link_table,
                        owner_column,
                        member_column,
                        new_set.into_iter().collect(),
                    ));
                }
            }
            _ => {
                if existing.get(spec.name) != Some(new_value) {
                    changed.insert(spec.name.to_string(), new_value.clone());
                }
            }
        }
    }

    (changed, set_changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn diff_skips_identical_scalars() {
        let entity = registry::resolve("Product").unwrap();
        let validated = map(json!({"nazev": "A", "cena": "100"}));
        let existing = map(json!({"id": 1, "nazev": "A", "cena": "99"}));
        let (changed, sets) = diff_fields(entity, &validated, &existing);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("cena"), Some(&json!("100")));
        assert!(sets.is_empty());
    }

    #[test]
    fn diff_treats_equal_id_sets_as_unchanged() {
        let entity = registry::resolve("Catalog").unwrap();
        let validated = map(json!({"products_ids": [3, 1, 2]}));
        let existing = map(json!({"id": 9, "products_ids": [1, 2, 3]}));
        let (changed, sets) = diff_fields(entity, &validated, &existing);
        assert!(changed.is_empty());
        assert!(sets.is_empty());
    }

    #[test]
    fn diff_reports_changed_id_sets() {
        let entity = registry::resolve("Catalog").unwrap();
        let validated = map(json!({"products_ids": [1, 4]}));
        let existing = map(json!({"id": 9, "products_ids": [1, 2]}));
        let (_, sets) = diff_fields(entity, &validated, &existing);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].3, vec![1, 4]);
    }
}
