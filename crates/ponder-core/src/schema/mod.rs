//! The user schema model: tables, enums, columns, and the filter
//! metadata a contract subscription is built from.

mod filter;
mod validate;

pub use filter::{ChildAddressLocation, FactoryFilter, LogFilter};
pub use validate::SchemaError;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar column types the engine understands natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    String,
    BigInt,
    Int,
    Float,
    Boolean,
    Bytes,
}

/// A column's type: a scalar, a reference to another table's `id`, or an
/// enum member, with `optional`/`list` modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnType {
    Scalar(Scalar),
    EnumRef(String),
    TableRef(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub list: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn id_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == "id")
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<String>,
}

/// The full parsed and validated user schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: BTreeMap<String, Table>,
    pub enums: BTreeMap<String, EnumDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_enum(mut self, e: EnumDef) -> Self {
        self.enums.insert(e.name.clone(), e);
        self
    }

    /// Validate name patterns, the mandatory non-list/non-reference/
    /// non-optional `id` column, the `list + reference` prohibition, and
    /// that every reference/enum column names something that exists.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate::validate_schema(self)
    }
}
