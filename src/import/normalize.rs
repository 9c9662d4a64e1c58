use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use super::apply::ImportError;
use crate::registry::{self, EntityDescriptor};
use crate::repo;

/// The normalized, deduplicated unit of work for one entity identity.
///
/// Insert vs update is decided once, at first encounter, by probing the
/// store; later batch items targeting the same identity only merge their
/// fields in and never change the classification.
#[derive(Debug)]
pub struct PendingMutation {
    pub entity: &'static EntityDescriptor,
    pub id: i64,
    pub fields: Map<String, Value>,
    /// Snapshot of the stored row when the mutation is an update.
    pub existing: Option<Map<String, Value>>,
    pub is_insert: bool,
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Mutations in first-seen batch order.
    pub mutations: Vec<PendingMutation>,
    /// Structural errors; any entry here means nothing may be persisted.
    pub errors: Vec<String>,
    /// How many identities probed as not-yet-existing. Informational; the
    /// authoritative counts come from the applier.
    pub provisional_inserts: u64,
}

/// Scan the raw batch in order, collecting structural errors without
/// aborting, and fold repeated `(entity, id)` items into one pending
/// mutation each (later fields win on conflict).
pub async fn normalize_batch(
    conn: &mut SqliteConnection,
    batch: &[Value],
) -> Result<NormalizedBatch, ImportError> {
    let mut out = NormalizedBatch::default();
    let mut index: HashMap<(&'static str, i64), usize> = HashMap::new();

    for (i, item) in batch.iter().enumerate() {
        let Some(entry) = item.as_object() else {
            out.errors.push(format!(
                "each item must contain 1 key (entity type) and 1 value (inserted or updated fields), which fails for: item {i}"
            ));
            continue;
        };
        if entry.len() != 1 {
            out.errors.push(format!(
                "each item must contain 1 key (entity type) and 1 value (inserted or updated fields), which fails for: item {i}"
            ));
            continue;
        }
        let (key, values) = entry.iter().next().expect("len checked above");

        let Some(entity) = registry::resolve(key) else {
            out.errors.push(format!(
                "each item must contain 1 key which must be a known entity type, which fails for: item {i}, {key}"
            ));
            continue;
        };

        let Some(values) = values.as_object() else {
            out.errors.push(format!(
                "each item's value must be a mapping of fields, which fails for: item {i}, {}",
                entity.type_name
            ));
            continue;
        };

        let Some(id_value) = values.get("id") else {
            out.errors.push(format!(
                "each item must contain the value 'id', which fails for: item {i}, {}",
                entity.type_name
            ));
            continue;
        };
        let Some(id) = id_value.as_i64() else {
            out.errors.push(format!(
                "the value 'id' must be an integer, which fails for: item {i}, {}",
                entity.type_name
            ));
            continue;
        };

        match index.get(&(entity.type_name, id)) {
            None => {
                // First sight of this identity: probe once, classify once.
                let existing = repo::fetch_row(conn, entity, id).await?;
                let is_insert = existing.is_none();
                if is_insert {
                    out.provisional_inserts += 1;
                }
                index.insert((entity.type_name, id), out.mutations.len());
                out.mutations.push(PendingMutation {
                    entity,
                    id,
                    fields: values.clone(),
                    existing,
                    is_insert,
                });
            }
            Some(&pos) => {
                // Merge: the later item's fields win on conflict.
                let pending = &mut out.mutations[pos];
                for (k, v) in values {
                    pending.fields.insert(k.clone(), v.clone());
                }
            }
        }
    }

    tracing::debug!(
        target = "catalogd",
        event = "import_normalized",
        mutations = out.mutations.len(),
        structural_errors = out.errors.len(),
        provisional_inserts = out.provisional_inserts
    );

    Ok(out)
}
