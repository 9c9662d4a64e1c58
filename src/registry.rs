use chrono::{DateTime, FixedOffset, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::SqliteConnection;
use std::str::FromStr;

/// How a field is typed, validated and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Decimal,
    DateTime,
    Url,
    Currency,
    /// Integer id that must exist in `table` at apply time.
    ForeignKey { table: &'static str },
    /// Set of integer ids persisted through a link table rather than a column.
    IdSet {
        link_table: &'static str,
        owner_column: &'static str,
        member_column: &'static str,
        target_table: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Applied on insert when the field is absent.
    pub default: Option<&'static str>,
}

/// One entity type known to the import engine.
///
/// `rank` orders writes so that referenced entities land before their
/// dependents: an entity holding a foreign key always has a strictly
/// greater rank than the entity it points at.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub type_name: &'static str,
    pub table: &'static str,
    pub rank: u16,
    pub fields: &'static [FieldSpec],
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        default: None,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        default: None,
    }
}

const fn defaulted(name: &'static str, kind: FieldKind, default: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        default: Some(default),
    }
}

pub static ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor {
        type_name: "AttributeName",
        table: "attribute_names",
        rank: 0,
        fields: &[
            required("nazev", FieldKind::Text),
            optional("kod", FieldKind::Text),
            defaulted("zobrazit", FieldKind::Bool, "false"),
        ],
    },
    EntityDescriptor {
        type_name: "AttributeValue",
        table: "attribute_values",
        rank: 1,
        fields: &[required("hodnota", FieldKind::Text)],
    },
    EntityDescriptor {
        type_name: "Attribute",
        table: "attributes",
        rank: 2,
        fields: &[
            required(
                "nazev_atributu_id",
                FieldKind::ForeignKey {
                    table: "attribute_names",
                },
            ),
            required(
                "hodnota_atributu_id",
                FieldKind::ForeignKey {
                    table: "attribute_values",
                },
            ),
        ],
    },
    EntityDescriptor {
        type_name: "Product",
        table: "products",
        rank: 3,
        fields: &[
            required("nazev", FieldKind::Text),
            required("description", FieldKind::Text),
            required("cena", FieldKind::Decimal),
            defaulted("mena", FieldKind::Currency, "CZK"),
            optional("published_on", FieldKind::DateTime),
            defaulted("is_published", FieldKind::Bool, "false"),
        ],
    },
    EntityDescriptor {
        type_name: "ProductAttributes",
        table: "product_attributes",
        rank: 4,
        fields: &[
            required(
                "attribute",
                FieldKind::ForeignKey {
                    table: "attributes",
                },
            ),
            required(
                "product",
                FieldKind::ForeignKey { table: "products" },
            ),
        ],
    },
    EntityDescriptor {
        type_name: "Image",
        table: "images",
        rank: 5,
        fields: &[
            optional("nazev", FieldKind::Text),
            required("obrazek", FieldKind::Url),
        ],
    },
    EntityDescriptor {
        type_name: "ProductImage",
        table: "product_images",
        rank: 6,
        fields: &[
            required(
                "product",
                FieldKind::ForeignKey { table: "products" },
            ),
            required(
                "obrazek_id",
                FieldKind::ForeignKey { table: "images" },
            ),
            required("nazev", FieldKind::Text),
        ],
    },
    EntityDescriptor {
        type_name: "Catalog",
        table: "catalogs",
        rank: 7,
        fields: &[
            required("nazev", FieldKind::Text),
            required(
                "obrazek_id",
                FieldKind::ForeignKey { table: "images" },
            ),
            optional(
                "products_ids",
                FieldKind::IdSet {
                    link_table: "catalog_products",
                    owner_column: "catalog_id",
                    member_column: "product_id",
                    target_table: "products",
                },
            ),
            optional(
                "attributes_ids",
                FieldKind::IdSet {
                    link_table: "catalog_attributes",
                    owner_column: "catalog_id",
                    member_column: "attribute_id",
                    target_table: "attributes",
                },
            ),
        ],
    },
];

/// Case-insensitive lookup of a type name, e.g. "product" or "Product".
pub fn resolve(type_name: &str) -> Option<&'static EntityDescriptor> {
    ENTITIES
        .iter()
        .find(|e| e.type_name.eq_ignore_ascii_case(type_name))
}

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").expect("valid url regex"));

const CURRENCIES: &[&str] = &["CZK", "EUR"];

impl EntityDescriptor {
    /// Validate and normalize a field map for this entity.
    ///
    /// Returns the normalized column values ready to bind (id-set fields
    /// stay as integer arrays; they never map to a column on the main
    /// table). Errors come back as `field : message` strings so the
    /// applier can report them all at once. Defaults are filled in on
    /// insert only; on update absent fields stay absent (partial update).
    pub async fn validate(
        &self,
        fields: &Map<String, Value>,
        conn: &mut SqliteConnection,
        is_insert: bool,
    ) -> Result<Map<String, Value>, Vec<String>> {
        let mut normalized = Map::new();
        let mut errors: Vec<String> = Vec::new();

        for spec in self.fields {
            let value = fields.get(spec.name);
            let value = match value {
                None => {
                    if is_insert {
                        if let Some(default) = spec.default {
                            normalized.insert(spec.name.to_string(), default_value(spec, default));
                        } else if spec.required {
                            errors.push(format!("{} : this field is required", spec.name));
                        }
                    }
                    continue;
                }
                Some(Value::Null) => {
                    if spec.required {
                        errors.push(format!("{} : this field may not be null", spec.name));
                    } else {
                        normalized.insert(spec.name.to_string(), Value::Null);
                    }
                    continue;
                }
                Some(v) => v,
            };

            match check_field(spec, value, conn).await {
                Ok(v) => {
                    normalized.insert(spec.name.to_string(), v);
                }
                Err(msg) => errors.push(format!("{} : {}", spec.name, msg)),
            }
        }

        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(errors)
        }
    }
}

fn default_value(spec: &FieldSpec, default: &str) -> Value {
    match spec.kind {
        FieldKind::Bool => Value::from(i64::from(default == "true")),
        _ => Value::from(default.to_string()),
    }
}

async fn check_field(
    spec: &FieldSpec,
    value: &Value,
    conn: &mut SqliteConnection,
) -> Result<Value, String> {
    match spec.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Value::from(s.clone())),
            _ => Err("must be a string".into()),
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => {
                Ok(Value::from(n.as_i64().unwrap_or(0)))
            }
            _ => Err("must be a boolean".into()),
        },
        FieldKind::Decimal => {
            let parsed = match value {
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
                _ => None,
            };
            match parsed {
                // Canonical string form so a re-import of the same price
                // compares equal to the stored value.
                Some(d) => Ok(Value::from(d.normalize().to_string())),
                None => Err("must be a decimal number".into()),
            }
        }
        FieldKind::DateTime => match value {
            Value::String(s) => match DateTime::<FixedOffset>::parse_from_rfc3339(s) {
                Ok(dt) => Ok(Value::from(dt.to_rfc3339_opts(SecondsFormat::Secs, true))),
                Err(_) => Err("must be an RFC 3339 datetime".into()),
            },
            _ => Err("must be an RFC 3339 datetime".into()),
        },
        FieldKind::Url => match value {
            Value::String(s) if URL_RE.is_match(s) => Ok(Value::from(s.clone())),
            _ => Err("must be a valid http(s) URL".into()),
        },
        FieldKind::Currency => match value {
            Value::String(s) if CURRENCIES.contains(&s.as_str()) => Ok(Value::from(s.clone())),
            _ => Err(format!("must be one of {}", CURRENCIES.join(", "))),
        },
        FieldKind::ForeignKey { table } => {
            let id = value.as_i64().ok_or("must be an integer id")?;
            if row_exists(conn, table, id).await? {
                Ok(Value::from(id))
            } else {
                Err(format!("references a missing row in {table} (id {id})"))
            }
        }
        FieldKind::IdSet { target_table, .. } => {
            let items = value.as_array().ok_or("must be a list of integer ids")?;
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let id = item.as_i64().ok_or("must be a list of integer ids")?;
                if !row_exists(conn, target_table, id).await? {
                    return Err(format!(
                        "references a missing row in {target_table} (id {id})"
                    ));
                }
                ids.push(Value::from(id));
            }
            Ok(Value::Array(ids))
        }
    }
}

async fn row_exists(conn: &mut SqliteConnection, table: &str, id: i64) -> Result<bool, String> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?");
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map(|row| row.is_some())
        .map_err(|e| format!("lookup failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(resolve("product").unwrap().type_name, "Product");
        assert_eq!(resolve("PRODUCT").unwrap().type_name, "Product");
        assert_eq!(
            resolve("attributename").unwrap().table,
            "attribute_names"
        );
        assert!(resolve("bogus").is_none());
    }

    #[test]
    fn ranks_respect_foreign_keys() {
        for entity in ENTITIES {
            for spec in entity.fields {
                if let FieldKind::ForeignKey { table } = spec.kind {
                    let referenced = ENTITIES
                        .iter()
                        .find(|e| e.table == table)
                        .expect("fk target registered");
                    assert!(
                        referenced.rank < entity.rank,
                        "{} must outrank {}",
                        entity.type_name,
                        referenced.type_name
                    );
                }
            }
        }
    }

    #[test]
    fn url_regex_accepts_http_and_rejects_garbage() {
        assert!(URL_RE.is_match("https://example.com/img.png"));
        assert!(URL_RE.is_match("http://cdn.example.com/a?b=c"));
        assert!(!URL_RE.is_match("not a url"));
        assert!(!URL_RE.is_match("ftp://example.com/x"));
    }
}
