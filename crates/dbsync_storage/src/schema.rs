//! Table schemas and row normalization.

use crate::error::{StorageError, StorageResult};
use crate::value::{Row, RowKey, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Signed integer.
    Integer,
    /// Floating point.
    Real,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// Maps a declared SQL type name to a storage class by affinity.
    ///
    /// `INT` anywhere in the name gives integer; `CHAR`, `CLOB` or `TEXT`
    /// give text; `REAL`, `FLOA` or `DOUB` give real; anything else is text.
    #[must_use]
    pub fn from_declared(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }

    /// Coerces a value into this column type, if it fits.
    fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ColumnType::Integer, v @ Value::Integer(_)) => Some(v),
            (ColumnType::Real, v @ Value::Real(_)) => Some(v),
            #[allow(clippy::cast_precision_loss)]
            (ColumnType::Real, Value::Integer(i)) => Some(Value::Real(i as f64)),
            (ColumnType::Text, v @ Value::Text(_)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::Real => write!(f, "REAL"),
            ColumnType::Text => write!(f, "TEXT"),
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage class.
    pub column_type: ColumnType,
    /// Whether `NULL` is rejected.
    #[serde(default)]
    pub not_null: bool,
    /// Value used when a row omits the column.
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDef {
    /// Creates a nullable column with no default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            default: None,
        }
    }

    /// Value stored when a row omits this column.
    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .and_then(|d| self.column_type.coerce(d))
            .unwrap_or(Value::Null)
    }
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Primary-key column names, in key order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Creates a schema. An empty `primary_key` makes every column part of the key.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Self {
        let primary_key = if primary_key.is_empty() {
            columns.iter().map(|c| c.name.clone()).collect()
        } else {
            primary_key
        };
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the column is part of the primary key.
    #[must_use]
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Extracts the primary key of a row. Missing key columns read as `NULL`.
    #[must_use]
    pub fn key_of(&self, row: &Row) -> RowKey {
        RowKey(
            self.primary_key
                .iter()
                .map(|k| row.get_or_null(k).clone())
                .collect(),
        )
    }

    /// Extracts and type-checks the primary key of a caller-supplied row.
    ///
    /// Unlike [`TableSchema::key_of`], every key column must be present and
    /// non-`NULL`, and values are coerced the way [`TableSchema::normalize`]
    /// coerces them. Non-key columns are only checked for existence.
    pub fn key_from(&self, row: &Row) -> StorageResult<RowKey> {
        self.check_columns(row)?;
        let mut values = Vec::with_capacity(self.primary_key.len());
        for name in &self.primary_key {
            let column = self
                .column(name)
                .ok_or_else(|| StorageError::unknown_column(&self.name, name))?;
            let value = row.get_or_null(name);
            if value.is_null() {
                return Err(StorageError::MissingPrimaryKey {
                    table: self.name.clone(),
                    column: name.clone(),
                });
            }
            let value = column.column_type.coerce(value.clone()).ok_or_else(|| {
                StorageError::TypeMismatch {
                    table: self.name.clone(),
                    column: name.clone(),
                    expected: column.column_type.to_string(),
                }
            })?;
            values.push(value);
        }
        Ok(RowKey(values))
    }

    /// Fails if the row names a column the table does not have.
    pub fn check_columns(&self, row: &Row) -> StorageResult<()> {
        match row.columns().find(|c| self.column(c).is_none()) {
            Some(column) => Err(StorageError::unknown_column(&self.name, column)),
            None => Ok(()),
        }
    }

    /// Validates a row against the schema and returns its stored form.
    ///
    /// Every declared column is present in the result: omitted columns take
    /// their default or `NULL`. Integers are widened for real columns.
    pub fn normalize(&self, row: &Row) -> StorageResult<Row> {
        self.check_columns(row)?;

        let mut stored = Row::new();
        for column in &self.columns {
            let value = match row.get(&column.name) {
                Some(v) => column.column_type.coerce(v.clone()).ok_or_else(|| {
                    StorageError::TypeMismatch {
                        table: self.name.clone(),
                        column: column.name.clone(),
                        expected: column.column_type.to_string(),
                    }
                })?,
                None => column.default_value(),
            };

            if value.is_null() {
                if self.is_key_column(&column.name) {
                    return Err(StorageError::MissingPrimaryKey {
                        table: self.name.clone(),
                        column: column.name.clone(),
                    });
                }
                if column.not_null {
                    return Err(StorageError::TypeMismatch {
                        table: self.name.clone(),
                        column: column.name.clone(),
                        expected: format!("{} NOT NULL", column.column_type),
                    });
                }
            }
            stored.insert(column.name.clone(), value);
        }
        Ok(stored)
    }

    /// Adds a column. Existing rows read it as its default.
    pub fn add_column(&mut self, column: ColumnDef) -> StorageResult<()> {
        if self.column(&column.name).is_some() {
            return Err(StorageError::Corrupted(format!(
                "duplicate column {} in table {}",
                column.name, self.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }
}
