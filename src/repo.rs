use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqliteConnection, SqlitePool, TypeInfo, ValueRef};

use crate::error::{AppError, AppResult};
use crate::registry::{self, EntityDescriptor, FieldKind};

fn descriptor(type_name: &str) -> AppResult<&'static EntityDescriptor> {
    registry::resolve(type_name).ok_or_else(|| {
        AppError::new("REPO/UNKNOWN_ENTITY", "Unknown entity type")
            .with_context("type_name", type_name.to_string())
    })
}

fn row_to_map(row: &SqliteRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let v = row.try_get_raw(idx).ok();
        let val = match v {
            Some(raw) => {
                if raw.is_null() {
                    Value::Null
                } else {
                    match raw.type_info().name() {
                        "INTEGER" => row
                            .try_get::<i64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        "REAL" => row
                            .try_get::<f64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        _ => row
                            .try_get::<String, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    }
                }
            }
            None => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    map
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    v: &Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match v {
        Value::Null => q.bind(Option::<i64>::None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(Option::<i64>::None)
            }
        }
        Value::Bool(b) => q.bind(i64::from(*b)),
        Value::String(s) => q.bind(s.clone()),
        _ => q.bind(v.to_string()),
    }
}

/// All row identifiers for a type, in id order.
pub async fn list_ids(pool: &SqlitePool, type_name: &str) -> AppResult<Vec<i64>> {
    let entity = descriptor(type_name)?;
    let sql = format!("SELECT id FROM {} ORDER BY id", entity.table);
    let ids = sqlx::query_scalar::<_, i64>(&sql)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    Ok(ids)
}

/// Full field mapping for one row, id-set fields included for catalogs.
pub async fn get_detail(pool: &SqlitePool, type_name: &str, id: i64) -> AppResult<Option<Value>> {
    let entity = descriptor(type_name)?;
    let mut conn = pool.acquire().await.map_err(AppError::from)?;
    let row = fetch_row(conn.as_mut(), entity, id)
        .await
        .map_err(AppError::from)?;
    Ok(row.map(Value::Object))
}

/// One row as a JSON map, or `None`. Id-set fields are loaded from their
/// link tables so the snapshot carries the current sets.
pub(crate) async fn fetch_row(
    conn: &mut SqliteConnection,
    entity: &EntityDescriptor,
    id: i64,
) -> Result<Option<Map<String, Value>>, sqlx::Error> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", entity.table);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut map = row_to_map(&row);

    for spec in entity.fields {
        if let FieldKind::IdSet {
            link_table,
            owner_column,
            member_column,
            ..
        } = spec.kind
        {
            let ids = load_id_set(conn, link_table, owner_column, member_column, id).await?;
            map.insert(
                spec.name.to_string(),
                Value::Array(ids.into_iter().map(Value::from).collect()),
            );
        }
    }

    Ok(Some(map))
}

pub(crate) async fn load_id_set(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    member_column: &str,
    owner_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    let sql = format!(
        "SELECT {member_column} FROM {link_table} WHERE {owner_column} = ? ORDER BY {member_column}"
    );
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await
}

/// Insert the scalar columns of `fields`, letting SQLite assign the id.
/// Id-set fields are skipped here; the caller writes the link rows once
/// the owner id is known.
pub(crate) async fn insert_row(
    conn: &mut SqliteConnection,
    entity: &EntityDescriptor,
    fields: &Map<String, Value>,
) -> Result<i64, sqlx::Error> {
    let cols: Vec<&str> = entity
        .fields
        .iter()
        .filter(|spec| !matches!(spec.kind, FieldKind::IdSet { .. }))
        .filter(|spec| fields.contains_key(spec.name))
        .map(|spec| spec.name)
        .collect();
    let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity.table,
        cols.join(","),
        placeholders.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        query = bind_value(query, &fields[*c]);
    }
    let result = query.execute(&mut *conn).await?;
    Ok(result.last_insert_rowid())
}

/// Partial update: only the given scalar columns are touched.
pub(crate) async fn update_row(
    conn: &mut SqliteConnection,
    entity: &EntityDescriptor,
    id: i64,
    changed: &Map<String, Value>,
) -> Result<(), sqlx::Error> {
    if changed.is_empty() {
        return Ok(());
    }
    let cols: Vec<&String> = changed.keys().collect();
    let set_clause: Vec<String> = cols.iter().map(|c| format!("{c} = ?")).collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        entity.table,
        set_clause.join(",")
    );
    let mut query = sqlx::query(&sql);
    for c in &cols {
        query = bind_value(query, &changed[c.as_str()]);
    }
    query = query.bind(id);
    query.execute(&mut *conn).await?;
    Ok(())
}

/// Replace the link rows behind an id-set field.
pub(crate) async fn write_id_set(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    member_column: &str,
    owner_id: i64,
    member_ids: &[i64],
) -> Result<(), sqlx::Error> {
    let delete_sql = format!("DELETE FROM {link_table} WHERE {owner_column} = ?");
    sqlx::query(&delete_sql)
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;
    let insert_sql =
        format!("INSERT INTO {link_table} ({owner_column}, {member_column}) VALUES (?, ?)");
    for member in member_ids {
        sqlx::query(&insert_sql)
            .bind(owner_id)
            .bind(member)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn delete_row(
    conn: &mut SqliteConnection,
    entity: &EntityDescriptor,
    id: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?", entity.table);
    sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(())
}
