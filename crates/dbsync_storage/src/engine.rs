//! Storage engine trait definition.

use crate::ddl::{parse_statements, Statement};
use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, Query};
use crate::schema::{ColumnDef, TableSchema};
use crate::value::{Row, RowKey};

/// What an engine does when an insert would exceed a table's row cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxRowsPolicy {
    /// Fail the insert with [`StorageError::MaxRowsExceeded`].
    #[default]
    Reject,
    /// Evict the oldest-inserted row to make room.
    EvictOldest,
}

/// Result of [`StorageEngine::update_or_insert_row`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpsertOutcome {
    /// The row previously stored under the same key, if any.
    pub previous: Option<Row>,
    /// The row as stored (normalized against the schema).
    pub stored: Row,
    /// Rows evicted to respect the table's row cap.
    pub evicted: Vec<Row>,
}

impl UpsertOutcome {
    /// Returns true if the stored row differs from the previous one, or
    /// there was no previous row.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous.as_ref() != Some(&self.stored)
    }
}

/// A table store used by the synchronization layer.
///
/// Engines execute primitive table operations against one physical database.
/// They know nothing about snapshots, transactions or row status: the
/// synchronization layer builds all of that on top of this trait.
///
/// # Invariants
///
/// - Rows are stored in normalized form: every declared column present,
///   values coerced to the column type.
/// - Rows are keyed by primary key; at most one row per key.
/// - Iteration order (select, keys, delete results) is primary-key order.
/// - Engines are `Send + Sync` and synchronize internally: several readers
///   and writers may call in concurrently.
///
/// # Implementors
///
/// - [`super::InMemoryEngine`] - For tests and volatile state
/// - [`super::FileEngine`] - Persisted to a single file
pub trait StorageEngine: Send + Sync {
    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableExists`] if the name is taken.
    fn create_table(&self, schema: TableSchema) -> StorageResult<()>;

    /// Adds a column to an existing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or already has the column.
    fn add_column(&self, table: &str, column: ColumnDef) -> StorageResult<()>;

    /// Returns a table's schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn table_schema(&self, table: &str) -> StorageResult<TableSchema>;

    /// Returns the names of all tables.
    fn table_names(&self) -> Vec<String>;

    /// Inserts rows unconditionally, replacing rows with the same key.
    ///
    /// Either every row is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if any row does not fit the schema, or (under
    /// [`MaxRowsPolicy::Reject`]) if the cap would be exceeded.
    fn bulk_insert(&self, table: &str, rows: &[Row]) -> StorageResult<usize>;

    /// Stores one row, replacing the row with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not fit the schema, or
    /// [`StorageError::MaxRowsExceeded`] when inserting a new key into a full
    /// table under [`MaxRowsPolicy::Reject`].
    fn update_or_insert_row(&self, table: &str, row: &Row) -> StorageResult<UpsertOutcome>;

    /// Fetches one row by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn get_row(&self, table: &str, key: &RowKey) -> StorageResult<Option<Row>>;

    /// Returns the primary keys of every row, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn keys(&self, table: &str) -> StorageResult<Vec<RowKey>>;

    /// Runs a select query.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a referenced column does not exist.
    fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Row>>;

    /// Deletes rows matching a filter, returning them in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or a referenced column does not exist.
    fn delete_rows(&self, table: &str, filter: &Filter) -> StorageResult<Vec<Row>>;

    /// Deletes rows by primary key, returning the rows that existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn delete_keys(&self, table: &str, keys: &[RowKey]) -> StorageResult<Vec<Row>>;

    /// Returns the number of rows in a table.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn count_rows(&self, table: &str) -> StorageResult<usize>;

    /// Caps a table's row count; `None` removes the cap.
    ///
    /// Rows already beyond a new cap are kept; the cap applies to later
    /// inserts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] for unknown tables.
    fn set_max_rows(&self, table: &str, limit: Option<usize>) -> StorageResult<()>;

    /// Returns the stored schema version.
    fn schema_version(&self) -> u32;

    /// Records the schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be persisted.
    fn set_schema_version(&self, version: u32) -> StorageResult<()>;

    /// Makes all previous writes durable. A no-op for volatile engines.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn flush(&self) -> StorageResult<()>;
}

/// Parses a schema script and executes it against an engine.
///
/// `CREATE TABLE IF NOT EXISTS` is skipped for existing tables. Returns the
/// number of statements executed.
///
/// # Errors
///
/// Returns a parse error, or the first error reported by the engine.
pub fn execute_script(engine: &dyn StorageEngine, script: &str) -> StorageResult<usize> {
    let mut executed = 0;
    for statement in parse_statements(script)? {
        match statement {
            Statement::CreateTable {
                schema,
                if_not_exists,
            } => match engine.create_table(schema) {
                Err(StorageError::TableExists(_)) if if_not_exists => continue,
                other => other?,
            },
            Statement::AddColumn { table, column } => engine.add_column(&table, column)?,
        }
        executed += 1;
    }
    Ok(executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEngine;

    #[test]
    fn execute_script_creates_tables() {
        let engine = InMemoryEngine::new();
        let n = execute_script(
            &engine,
            "CREATE TABLE a (x INTEGER PRIMARY KEY); CREATE TABLE b (y TEXT);",
        )
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(engine.table_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn execute_script_honours_if_not_exists() {
        let engine = InMemoryEngine::new();
        execute_script(&engine, "CREATE TABLE a (x INTEGER)").unwrap();
        let n = execute_script(&engine, "CREATE TABLE IF NOT EXISTS a (x INTEGER)").unwrap();
        assert_eq!(n, 0);
        assert!(execute_script(&engine, "CREATE TABLE a (x INTEGER)").is_err());
    }

    #[test]
    fn upsert_outcome_changed() {
        let row = Row::new().with("a", 1);
        let unchanged = UpsertOutcome {
            previous: Some(row.clone()),
            stored: row.clone(),
            evicted: Vec::new(),
        };
        assert!(!unchanged.changed());
        let inserted = UpsertOutcome {
            previous: None,
            stored: row,
            evicted: Vec::new(),
        };
        assert!(inserted.changed());
    }
}
