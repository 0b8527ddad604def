//! Result events handed to callbacks.

use dbsync_storage::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// The row was not stored before.
    Inserted,
    /// The row existed with different values.
    Modified,
    /// The row is gone (or, from `get_deleted`, about to go).
    Deleted,
    /// The row was refused because its table is full.
    MaxRows,
    /// The row matched a select query.
    Selected,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Inserted => "INSERTED",
            Operation::Modified => "MODIFIED",
            Operation::Deleted => "DELETED",
            Operation::MaxRows => "MAX_ROWS",
            Operation::Selected => "SELECTED",
        };
        f.write_str(name)
    }
}

/// One result row.
///
/// Serializes as `{"table": ..., "operation": ..., "data": {...}}`, with an
/// extra `"old"` row on [`Operation::Modified`] events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Table the row belongs to.
    pub table: String,
    /// What happened.
    pub operation: Operation,
    /// The row as now stored (as it was, for deletions).
    pub data: Row,
    /// The replaced row, for modifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
}

impl SyncEvent {
    fn new(table: &str, operation: Operation, data: Row) -> Self {
        Self {
            table: table.to_string(),
            operation,
            data,
            old: None,
        }
    }

    /// Creates an `INSERTED` event.
    #[must_use]
    pub fn inserted(table: &str, data: Row) -> Self {
        Self::new(table, Operation::Inserted, data)
    }

    /// Creates a `MODIFIED` event.
    #[must_use]
    pub fn modified(table: &str, data: Row, old: Row) -> Self {
        Self {
            old: Some(old),
            ..Self::new(table, Operation::Modified, data)
        }
    }

    /// Creates a `DELETED` event.
    #[must_use]
    pub fn deleted(table: &str, data: Row) -> Self {
        Self::new(table, Operation::Deleted, data)
    }

    /// Creates a `MAX_ROWS` event.
    #[must_use]
    pub fn max_rows(table: &str, data: Row) -> Self {
        Self::new(table, Operation::MaxRows, data)
    }

    /// Creates a `SELECTED` event.
    #[must_use]
    pub fn selected(table: &str, data: Row) -> Self {
        Self::new(table, Operation::Selected, data)
    }
}
