//! Typed indexing store: validates every write against the user schema
//! before it reaches the physical `IndexingStore` backend, and tags each
//! write with the checkpoint of the event that produced it.

use std::sync::Arc;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::{Column, ColumnType, Scalar, Schema, Table};
use ponder_storage::indexing::{FindManyQuery, IndexingStore, Page, Row};

/// Wraps a physical [`IndexingStore`] with schema-aware validation.
///
/// `table` values passed to `TypedStore`'s methods are logical schema
/// table names (`"Pet"`), not the physical, build-scoped table names the
/// backend stores rows under — the caller (generated handler code) maps
/// one to the other before reaching this far down, so `TypedStore` just
/// forwards the name through unchanged.
pub struct TypedStore {
    backend: Arc<dyn IndexingStore>,
    schema: Arc<Schema>,
}

impl TypedStore {
    pub fn new(backend: Arc<dyn IndexingStore>, schema: Arc<Schema>) -> Self {
        Self { backend, schema }
    }

    fn table(&self, name: &str) -> Result<&Table, PonderError> {
        self.schema.tables.get(name).ok_or_else(|| PonderError::SchemaViolation {
            table: name.to_string(),
            reason: "no such table in schema".to_string(),
        })
    }

    pub async fn create(&self, table: &str, id: String, data: serde_json::Value, checkpoint: Checkpoint) -> Result<(), PonderError> {
        let t = self.table(table)?;
        validate_row(t, &self.schema, &id, &data)?;
        self.backend.create(table, Row { id, data, checkpoint }).await
    }

    pub async fn create_many(&self, table: &str, rows: Vec<(String, serde_json::Value, Checkpoint)>) -> Result<(), PonderError> {
        let t = self.table(table)?;
        let mut out = Vec::with_capacity(rows.len());
        for (id, data, checkpoint) in rows {
            validate_row(t, &self.schema, &id, &data)?;
            out.push(Row { id, data, checkpoint });
        }
        self.backend.create_many(table, out).await
    }

    pub async fn update(&self, table: &str, id: &str, data: serde_json::Value, checkpoint: Checkpoint) -> Result<(), PonderError> {
        let t = self.table(table)?;
        validate_row(t, &self.schema, id, &data)?;
        self.backend.update(table, id, data, checkpoint).await
    }

    pub async fn upsert(&self, table: &str, id: String, data: serde_json::Value, checkpoint: Checkpoint) -> Result<(), PonderError> {
        let t = self.table(table)?;
        validate_row(t, &self.schema, &id, &data)?;
        self.backend.upsert(table, Row { id, data, checkpoint }).await
    }

    pub async fn delete(&self, table: &str, id: &str) -> Result<bool, PonderError> {
        self.table(table)?;
        self.backend.delete(table, id).await
    }

    pub async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Row>, PonderError> {
        self.table(table)?;
        self.backend.find_unique(table, id).await
    }

    pub async fn find_many(&self, table: &str, query: FindManyQuery) -> Result<Page, PonderError> {
        self.table(table)?;
        self.backend.find_many(table, query).await
    }

    pub async fn revert(&self, to_checkpoint: Checkpoint) -> Result<(), PonderError> {
        self.backend.revert(to_checkpoint).await
    }
}

/// Validate `data` against `table`'s columns: presence of required
/// (non-optional) fields, scalar type match, list-ness, and enum
/// membership. Reference existence is deliberately unchecked (no
/// cross-table lookup), matching the schema's decision to leave
/// referential integrity to the host.
fn validate_row(table: &Table, schema: &Schema, id: &str, data: &serde_json::Value) -> Result<(), PonderError> {
    let obj = data.as_object().ok_or_else(|| violation(table, "row data must be a JSON object"))?;

    for column in &table.columns {
        if column.name == "id" {
            continue;
        }
        match obj.get(&column.name) {
            None | Some(serde_json::Value::Null) => {
                if !column.optional {
                    return Err(violation(table, &format!("column '{}' is required", column.name)));
                }
            }
            Some(value) => validate_column(table, schema, column, value)?,
        }
    }

    let id_column = table.id_column().ok_or_else(|| violation(table, "missing id column"))?;
    validate_scalar(table, id_column, &serde_json::Value::String(id.to_string()))?;

    Ok(())
}

fn validate_column(table: &Table, schema: &Schema, column: &Column, value: &serde_json::Value) -> Result<(), PonderError> {
    if column.list {
        let items = value.as_array().ok_or_else(|| violation(table, &format!("column '{}' must be a list", column.name)))?;
        for item in items {
            validate_scalar_or_enum(table, schema, column, item)?;
        }
        return Ok(());
    }
    validate_scalar_or_enum(table, schema, column, value)
}

fn validate_scalar_or_enum(table: &Table, schema: &Schema, column: &Column, value: &serde_json::Value) -> Result<(), PonderError> {
    match &column.column_type {
        ColumnType::Scalar(scalar) => validate_scalar_value(table, column, *scalar, value),
        ColumnType::TableRef(_) => {
            if value.as_str().is_none() {
                return Err(violation(table, &format!("column '{}' reference value must be a string id", column.name)));
            }
            Ok(())
        }
        ColumnType::EnumRef(enum_name) => {
            let member = value.as_str().ok_or_else(|| violation(table, &format!("column '{}' enum value must be a string", column.name)))?;
            let def = schema.enums.get(enum_name).ok_or_else(|| violation(table, &format!("column '{}' references unknown enum '{enum_name}'", column.name)))?;
            if !def.members.iter().any(|m| m == member) {
                return Err(violation(table, &format!("column '{}' value '{member}' is not a member of enum '{enum_name}'", column.name)));
            }
            Ok(())
        }
    }
}

fn validate_scalar(table: &Table, column: &Column, value: &serde_json::Value) -> Result<(), PonderError> {
    let scalar = match column.column_type {
        ColumnType::Scalar(s) => s,
        _ => return Err(violation(table, &format!("column '{}' must be scalar", column.name))),
    };
    validate_scalar_value(table, column, scalar, value)
}

/// `BigInt` values travel as decimal strings (see `ponder_core::bigint`),
/// not JSON numbers, so both `BigInt` and `String` expect `Value::String`.
fn validate_scalar_value(table: &Table, column: &Column, scalar: Scalar, value: &serde_json::Value) -> Result<(), PonderError> {
    let ok = match scalar {
        Scalar::String | Scalar::BigInt | Scalar::Bytes => value.is_string(),
        Scalar::Int => value.is_i64() || value.is_u64(),
        Scalar::Float => value.is_number(),
        Scalar::Boolean => value.is_boolean(),
    };
    if !ok {
        return Err(violation(table, &format!("column '{}' expected {scalar:?}, got {value}", column.name)));
    }
    Ok(())
}

fn violation(table: &Table, reason: &str) -> PonderError {
    PonderError::SchemaViolation { table: table.name.clone(), reason: reason.to_string() }
}
