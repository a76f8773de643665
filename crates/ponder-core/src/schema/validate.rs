use thiserror::Error;

use super::{ColumnType, Scalar, Schema};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid name '{0}': names must match ^[A-Za-z0-9]+$")]
    InvalidName(String),

    #[error("table '{0}' is missing a mandatory 'id' column")]
    MissingId(String),

    #[error("table '{table}' column 'id' must not be optional, list, or a reference")]
    InvalidId { table: String },

    #[error("table '{table}' column '{column}' combines list with reference, which is not allowed")]
    ListReference { table: String, column: String },

    #[error("table '{table}' column '{column}' references unknown table '{target}'")]
    UnknownTableRef {
        table: String,
        column: String,
        target: String,
    },

    #[error("table '{table}' column '{column}' references unknown enum '{target}'")]
    UnknownEnumRef {
        table: String,
        column: String,
        target: String,
    },

    #[error("enum '{0}' has no members")]
    EmptyEnum(String),

    #[error("enum '{enum_name}' has duplicate member '{member}'")]
    DuplicateEnumMember { enum_name: String, member: String },
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

pub(super) fn validate_schema(schema: &Schema) -> Result<(), SchemaError> {
    for e in schema.enums.values() {
        if !is_valid_name(&e.name) {
            return Err(SchemaError::InvalidName(e.name.clone()));
        }
        if e.members.is_empty() {
            return Err(SchemaError::EmptyEnum(e.name.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for member in &e.members {
            if !seen.insert(member) {
                return Err(SchemaError::DuplicateEnumMember {
                    enum_name: e.name.clone(),
                    member: member.clone(),
                });
            }
        }
    }

    for table in schema.tables.values() {
        if !is_valid_name(&table.name) {
            return Err(SchemaError::InvalidName(table.name.clone()));
        }

        let id = table
            .id_column()
            .ok_or_else(|| SchemaError::MissingId(table.name.clone()))?;
        let id_is_valid_scalar = matches!(
            id.column_type,
            ColumnType::Scalar(Scalar::String | Scalar::BigInt | Scalar::Int | Scalar::Bytes)
        );
        if id.optional || id.list || !id_is_valid_scalar {
            return Err(SchemaError::InvalidId {
                table: table.name.clone(),
            });
        }

        for column in &table.columns {
            if !is_valid_name(&column.name) {
                return Err(SchemaError::InvalidName(column.name.clone()));
            }

            let is_reference = matches!(column.column_type, ColumnType::TableRef(_));
            if column.list && is_reference {
                return Err(SchemaError::ListReference {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }

            match &column.column_type {
                ColumnType::TableRef(target) => {
                    if !schema.tables.contains_key(target) {
                        return Err(SchemaError::UnknownTableRef {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            target: target.clone(),
                        });
                    }
                }
                ColumnType::EnumRef(target) => {
                    if !schema.enums.contains_key(target) {
                        return Err(SchemaError::UnknownEnumRef {
                            table: table.name.clone(),
                            column: column.name.clone(),
                            target: target.clone(),
                        });
                    }
                }
                ColumnType::Scalar(_) => {}
            }
        }
    }

    Ok(())
}
