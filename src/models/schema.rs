use serde::{Deserialize, Serialize};

use crate::errors::DbError;

pub const NULLABLE_YES: &str = "YES";
pub const NULLABLE_NO: &str = "NO";
pub const PRIMARY_KEY_MARKER: &str = "PRI";

/// Structure of one table as extracted by an adapter.
///
/// Columns keep the engine's ordinal order. Indexes, foreign keys and
/// primary keys are compared as sets, so their order only matters for display.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub indexes: Vec<IndexSchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Marks `column_name` as part of the primary key, both in `primary_keys`
    /// and in the column's `key` marker.
    pub fn mark_primary_key(&mut self, column_name: &str) {
        if !self.primary_keys.iter().any(|pk| pk == column_name) {
            self.primary_keys.push(column_name.to_string());
        }
        for column in self.columns.iter_mut().filter(|c| c.name == column_name) {
            column.key = PRIMARY_KEY_MARKER.to_string();
        }
    }

    /// Every primary-key name must reference an extracted column.
    pub fn validate(&self) -> Result<(), DbError> {
        match self
            .primary_keys
            .iter()
            .find(|pk| self.column(pk).is_none())
        {
            Some(pk) => Err(DbError::Schema(format!(
                "primary key '{}' of table '{}' is not one of its columns",
                pk, self.name
            ))),
            None => Ok(()),
        }
    }
}

/// One column. `nullable` holds the raw `"YES"`/`"NO"` marker rather than a
/// bool so that reports show exactly what the engine returned.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: String,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: nullable_marker(nullable).to_string(),
            ..Self::default()
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable == NULLABLE_YES
    }
}

pub fn nullable_marker(nullable: bool) -> &'static str {
    if nullable {
        NULLABLE_YES
    } else {
        NULLABLE_NO
    }
}

/// One (index, column) pair. A composite index yields one entry per column,
/// all sharing `name`.
///
/// `non_unique` follows MySQL's polarity: 0 is unique, 1 is non-unique.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct IndexSchema {
    pub name: String,
    pub column_name: String,
    pub non_unique: i32,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, column_name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            non_unique: if unique { 0 } else { 1 },
        }
    }

    pub fn is_unique(&self) -> bool {
        self.non_unique == 0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeySchema {
    pub name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}
