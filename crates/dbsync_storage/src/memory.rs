//! In-memory storage engine.

use crate::engine::{MaxRowsPolicy, StorageEngine, UpsertOutcome};
use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, Query};
use crate::schema::{ColumnDef, TableSchema};
use crate::value::{Row, RowKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredRow {
    /// Insertion sequence number, used to find the oldest row.
    seq: u64,
    row: Row,
}

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowKey, StoredRow>,
    next_seq: u64,
    max_rows: Option<usize>,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_seq: 0,
            max_rows: None,
        }
    }

    /// Stores an already normalized row.
    fn store(&mut self, row: Row, policy: MaxRowsPolicy) -> StorageResult<UpsertOutcome> {
        let key = self.schema.key_of(&row);

        if let Some(existing) = self.rows.get_mut(&key) {
            let previous = std::mem::replace(&mut existing.row, row.clone());
            return Ok(UpsertOutcome {
                previous: Some(previous),
                stored: row,
                evicted: Vec::new(),
            });
        }

        let mut evicted = Vec::new();
        if let Some(limit) = self.max_rows {
            while self.rows.len() >= limit {
                if policy == MaxRowsPolicy::Reject {
                    return Err(StorageError::MaxRowsExceeded {
                        table: self.schema.name.clone(),
                        limit,
                    });
                }
                match self.evict_oldest() {
                    Some(row) => evicted.push(row),
                    None => break,
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(
            key,
            StoredRow {
                seq,
                row: row.clone(),
            },
        );
        Ok(UpsertOutcome {
            previous: None,
            stored: row,
            evicted,
        })
    }

    fn evict_oldest(&mut self) -> Option<Row> {
        let key = self
            .rows
            .iter()
            .min_by_key(|(_, stored)| stored.seq)
            .map(|(key, _)| key.clone())?;
        self.rows.remove(&key).map(|stored| stored.row)
    }

    fn matching(&self, filter: &Filter) -> impl Iterator<Item = (&RowKey, &Row)> + '_ {
        let filter = filter.clone();
        self.rows
            .iter()
            .filter(move |(_, stored)| filter.matches(&stored.row))
            .map(|(key, stored)| (key, &stored.row))
    }

    /// Rows in insertion order.
    fn rows_by_age(&self) -> Vec<Row> {
        let mut stored: Vec<&StoredRow> = self.rows.values().collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.row.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    version: u32,
}

impl State {
    fn table(&self, name: &str) -> StorageResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }
}

/// Serializable form of an engine's contents.
///
/// Rows are listed per table in insertion order, so reloading an image
/// preserves which rows are the oldest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Image {
    version: u32,
    tables: Vec<TableImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableImage {
    schema: TableSchema,
    #[serde(default)]
    max_rows: Option<usize>,
    rows: Vec<Row>,
}

/// An in-memory storage engine.
///
/// This engine keeps every table in memory and is suitable for:
/// - Unit tests
/// - Volatile synchronization state that is rebuilt on every start
///
/// It is also the working set of [`crate::FileEngine`], which persists its
/// contents on flush.
///
/// # Thread Safety
///
/// All state sits behind one `RwLock`; reads run concurrently.
///
/// # Example
///
/// ```rust
/// use dbsync_storage::{execute_script, InMemoryEngine, Query, Row, StorageEngine};
///
/// let engine = InMemoryEngine::new();
/// execute_script(&engine, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
/// engine
///     .update_or_insert_row("t", &Row::new().with("id", 1).with("name", "a"))
///     .unwrap();
/// assert_eq!(engine.select("t", &Query::all()).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: RwLock<State>,
    policy: MaxRowsPolicy,
}

impl InMemoryEngine {
    /// Creates an empty engine that rejects inserts beyond a table's cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine with the given row-cap policy.
    #[must_use]
    pub fn with_policy(policy: MaxRowsPolicy) -> Self {
        Self {
            state: RwLock::default(),
            policy,
        }
    }

    /// Returns the row-cap policy.
    #[must_use]
    pub fn policy(&self) -> MaxRowsPolicy {
        self.policy
    }

    /// Drops every table and resets the schema version.
    pub fn clear(&self) {
        *self.state.write() = State::default();
    }

    pub(crate) fn to_image(&self) -> Image {
        let state = self.state.read();
        Image {
            version: state.version,
            tables: state
                .tables
                .values()
                .map(|table| TableImage {
                    schema: table.schema.clone(),
                    max_rows: table.max_rows,
                    rows: table.rows_by_age(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_image(image: Image, policy: MaxRowsPolicy) -> StorageResult<Self> {
        let mut state = State {
            tables: BTreeMap::new(),
            version: image.version,
        };
        for table_image in image.tables {
            let name = table_image.schema.name.clone();
            let mut table = Table::new(table_image.schema);
            for row in &table_image.rows {
                let row = table
                    .schema
                    .normalize(row)
                    .map_err(|e| StorageError::Corrupted(format!("table {name}: {e}")))?;
                // The cap is restored afterwards so reloading never evicts.
                table.store(row, MaxRowsPolicy::Reject)?;
            }
            table.max_rows = table_image.max_rows;
            if state.tables.insert(name.clone(), table).is_some() {
                return Err(StorageError::Corrupted(format!("duplicate table {name}")));
            }
        }
        Ok(Self {
            state: RwLock::new(state),
            policy,
        })
    }
}

impl StorageEngine for InMemoryEngine {
    fn create_table(&self, schema: TableSchema) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.tables.contains_key(&schema.name) {
            return Err(StorageError::TableExists(schema.name));
        }
        debug!(table = %schema.name, columns = schema.columns.len(), "created table");
        state.tables.insert(schema.name.clone(), Table::new(schema));
        Ok(())
    }

    fn add_column(&self, table: &str, column: ColumnDef) -> StorageResult<()> {
        let mut state = self.state.write();
        let table = state.table_mut(table)?;
        let fill = column.default_value();
        let name = column.name.clone();
        table.schema.add_column(column)?;
        for stored in table.rows.values_mut() {
            stored.row.insert(name.clone(), fill.clone());
        }
        Ok(())
    }

    fn table_schema(&self, table: &str) -> StorageResult<TableSchema> {
        Ok(self.state.read().table(table)?.schema.clone())
    }

    fn table_names(&self) -> Vec<String> {
        self.state.read().tables.keys().cloned().collect()
    }

    fn bulk_insert(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        let mut state = self.state.write();
        let table = state.table_mut(table)?;

        let normalized = rows
            .iter()
            .map(|row| table.schema.normalize(row))
            .collect::<StorageResult<Vec<_>>>()?;

        if let (Some(limit), MaxRowsPolicy::Reject) = (table.max_rows, self.policy) {
            let mut new_keys = HashSet::new();
            for row in &normalized {
                let key = table.schema.key_of(row);
                if !table.rows.contains_key(&key) {
                    new_keys.insert(key);
                }
            }
            if table.rows.len() + new_keys.len() > limit {
                return Err(StorageError::MaxRowsExceeded {
                    table: table.schema.name.clone(),
                    limit,
                });
            }
        }

        let count = normalized.len();
        let mut evicted = 0;
        for row in normalized {
            evicted += table.store(row, self.policy)?.evicted.len();
        }
        if evicted > 0 {
            debug!(table = %table.schema.name, evicted, "bulk insert evicted rows");
        }
        Ok(count)
    }

    fn update_or_insert_row(&self, table: &str, row: &Row) -> StorageResult<UpsertOutcome> {
        let mut state = self.state.write();
        let table = state.table_mut(table)?;
        let row = table.schema.normalize(row)?;
        table.store(row, self.policy)
    }

    fn get_row(&self, table: &str, key: &RowKey) -> StorageResult<Option<Row>> {
        let state = self.state.read();
        Ok(state
            .table(table)?
            .rows
            .get(key)
            .map(|stored| stored.row.clone()))
    }

    fn keys(&self, table: &str) -> StorageResult<Vec<RowKey>> {
        Ok(self.state.read().table(table)?.rows.keys().cloned().collect())
    }

    fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Row>> {
        let state = self.state.read();
        let table = state.table(table)?;
        query.check(&table.schema)?;
        let rows = table
            .matching(&query.filter)
            .map(|(_, row)| row.clone())
            .collect();
        Ok(query.finish(rows))
    }

    fn delete_rows(&self, table: &str, filter: &Filter) -> StorageResult<Vec<Row>> {
        let mut state = self.state.write();
        let table = state.table_mut(table)?;
        filter.check(&table.schema)?;
        let keys: Vec<RowKey> = table
            .matching(filter)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(keys
            .iter()
            .filter_map(|key| table.rows.remove(key).map(|stored| stored.row))
            .collect())
    }

    fn delete_keys(&self, table: &str, keys: &[RowKey]) -> StorageResult<Vec<Row>> {
        let mut state = self.state.write();
        let table = state.table_mut(table)?;
        Ok(keys
            .iter()
            .filter_map(|key| table.rows.remove(key).map(|stored| stored.row))
            .collect())
    }

    fn count_rows(&self, table: &str) -> StorageResult<usize> {
        Ok(self.state.read().table(table)?.rows.len())
    }

    fn set_max_rows(&self, table: &str, limit: Option<usize>) -> StorageResult<()> {
        let mut state = self.state.write();
        state.table_mut(table)?.max_rows = limit.filter(|&n| n > 0);
        Ok(())
    }

    fn schema_version(&self) -> u32 {
        self.state.read().version
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        self.state.write().version = version;
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing to make durable
        Ok(())
    }
}
