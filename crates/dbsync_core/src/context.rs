//! Engine context: one open synchronization session.
//!
//! A context owns a storage engine, the session's read/write lock and the
//! bookkeeping the storage engine knows nothing about: status tags, open
//! transactions and relationships. All of that bookkeeping sits behind one
//! short-lived mutex, which is never held while a callback runs.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::lock::{ExclusiveLocking, SharedLocking};
use crate::relationship::{Cascade, Relationships};
use crate::request::{
    BulkInsertRequest, DeleteQuery, DeleteRequest, RelationshipRequest, Request, SelectRequest,
    SnapshotRequest, SyncRequest,
};
use crate::status::{RowStatus, StatusTags};
use crate::transaction::TransactionContext;
use crate::types::{DbManagement, EngineType, HostType};
use dbsync_storage::{
    execute_script, FileEngine, InMemoryEngine, Row, RowKey, StorageEngine, StorageError,
    StorageResult, TableSchema,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Callback receiving result rows.
pub(crate) type Emit<'a> = &'a mut dyn FnMut(SyncEvent);

/// Mutable bookkeeping of a session.
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub(crate) tags: StatusTags,
    pub(crate) transactions: HashMap<u64, TransactionContext>,
    pub(crate) relationships: Relationships,
    pub(crate) next_txn: u64,
}

/// One open session.
pub(crate) struct EngineContext {
    host_type: HostType,
    engine_type: EngineType,
    pub(crate) engine: Box<dyn StorageEngine>,
    pub(crate) lock: RwLock<()>,
    pub(crate) state: Mutex<SyncState>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("host_type", &self.host_type)
            .field("engine_type", &self.engine_type)
            .field("tables", &self.engine.table_names())
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Opens the storage engine described by `config` and brings its schema
    /// up to date.
    pub(crate) fn open(config: &EngineConfig) -> SyncResult<Self> {
        let engine = create_engine(config).map_err(|e| {
            SyncError::engine_creation(format!("cannot open {}: {e}", config.path.display()))
        })?;
        initialize_schema(engine.as_ref(), config)
            .map_err(|e| SyncError::engine_creation(format!("schema setup failed: {e}")))?;

        Ok(Self {
            host_type: config.host_type,
            engine_type: config.engine_type,
            engine,
            lock: RwLock::new(()),
            state: Mutex::new(SyncState::default()),
        })
    }

    pub(crate) fn host_type(&self) -> HostType {
        self.host_type
    }

    pub(crate) fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    pub(crate) fn insert_bulk(&self, request: &BulkInsertRequest) -> SyncResult<usize> {
        let _lock = ExclusiveLocking::new(&self.lock);
        let count = self.engine.bulk_insert(&request.table, &request.data)?;
        self.engine.flush()?;
        debug!(table = %request.table, rows = count, "bulk insert");
        Ok(count)
    }

    pub(crate) fn sync_rows(&self, request: &SyncRequest, emit: Emit<'_>) -> SyncResult<()> {
        let _lock = SharedLocking::new(&self.lock);
        self.apply_rows(&request.table, &request.data, emit)?;
        self.engine.flush()?;
        Ok(())
    }

    /// One-shot mark/sweep of a single table.
    pub(crate) fn refresh(&self, request: &SnapshotRequest, emit: Emit<'_>) -> SyncResult<()> {
        let _lock = SharedLocking::new(&self.lock);
        let table = request.table.as_str();

        let mut unseen: BTreeSet<RowKey> = self.engine.keys(table)?.into_iter().collect();
        for key in self.apply_rows(table, &request.data, emit)? {
            unseen.remove(&key);
        }

        let stale: Vec<RowKey> = unseen.into_iter().collect();
        let deleted = self.engine.delete_keys(table, &stale)?;
        let removed = self.sweep(table, deleted, emit)?;
        self.engine.flush()?;

        debug!(table, rows = request.data.len(), removed, "refreshed snapshot");
        Ok(())
    }

    pub(crate) fn select(&self, request: &SelectRequest, emit: Emit<'_>) -> SyncResult<usize> {
        let _lock = SharedLocking::new(&self.lock);
        let rows = self.engine.select(&request.table, &request.query)?;
        let count = rows.len();
        for row in rows {
            emit(SyncEvent::selected(&request.table, row));
        }
        Ok(count)
    }

    pub(crate) fn delete_rows(&self, request: &DeleteRequest) -> SyncResult<usize> {
        let _lock = ExclusiveLocking::new(&self.lock);
        let table = request.table.as_str();

        let deleted = match &request.query {
            DeleteQuery::Rows { data } => {
                let schema = self.engine.table_schema(table)?;
                let keys = data
                    .iter()
                    .map(|row| schema.key_from(row))
                    .collect::<StorageResult<Vec<_>>>()?;
                self.engine.delete_keys(table, &keys)?
            }
            DeleteQuery::Filter { filter } => self.engine.delete_rows(table, filter)?,
        };
        let removed = self.sweep(table, deleted, &mut |_| {})?;
        self.engine.flush()?;

        debug!(table, removed, "deleted rows");
        Ok(removed)
    }

    pub(crate) fn add_relationship(&self, request: &RelationshipRequest) -> SyncResult<()> {
        request.validate()?;
        let _lock = ExclusiveLocking::new(&self.lock);

        let base = self.engine.table_schema(&request.base_table)?;
        for related in &request.relationed_tables {
            let child = self.engine.table_schema(&related.table)?;
            for (parent_column, child_column) in &related.field_match {
                require_column(&base, parent_column)?;
                require_column(&child, child_column)?;
            }
        }

        self.state.lock().relationships.add(request);
        info!(
            base_table = %request.base_table,
            children = request.relationed_tables.len(),
            "added table relationship"
        );
        Ok(())
    }

    pub(crate) fn set_max_rows(&self, table: &str, limit: usize) -> SyncResult<()> {
        let _lock = ExclusiveLocking::new(&self.lock);
        self.engine.set_max_rows(table, (limit > 0).then_some(limit))?;
        self.engine.flush()?;
        debug!(table, limit, "set max rows");
        Ok(())
    }

    pub(crate) fn row_status(&self, table: &str, key: &RowKey) -> SyncResult<RowStatus> {
        let _lock = SharedLocking::new(&self.lock);
        self.engine.table_schema(table)?;
        Ok(self.state.lock().tags.status(table, key))
    }

    /// Applies rows by primary key and reports what changed.
    ///
    /// Every row is validated before the first one is stored. Rows refused
    /// because the table is full are reported as `MAX_ROWS` and skipped.
    /// Returns the keys of the rows that were stored.
    pub(crate) fn apply_rows(
        &self,
        table: &str,
        rows: &[Row],
        emit: Emit<'_>,
    ) -> SyncResult<Vec<RowKey>> {
        let schema = self.engine.table_schema(table)?;
        for row in rows {
            schema.normalize(row)?;
        }

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let outcome = match self.engine.update_or_insert_row(table, row) {
                Ok(outcome) => outcome,
                Err(StorageError::MaxRowsExceeded { limit, .. }) => {
                    warn!(table, limit, "row rejected, table is full");
                    emit(SyncEvent::max_rows(table, row.clone()));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let key = schema.key_of(&outcome.stored);
            {
                let mut state = self.state.lock();
                for evicted in &outcome.evicted {
                    state.tags.remove(table, &schema.key_of(evicted));
                }
                state.tags.mark_current(table, key.clone());
            }

            for evicted in outcome.evicted {
                emit(SyncEvent::deleted(table, evicted));
            }
            match outcome.previous {
                None => emit(SyncEvent::inserted(table, outcome.stored)),
                Some(previous) if previous != outcome.stored => {
                    emit(SyncEvent::modified(table, outcome.stored, previous));
                }
                Some(_) => {}
            }
            stored.push(key);
        }
        Ok(stored)
    }

    /// Finishes the removal of rows already deleted from `table`: deletes
    /// their dependents, forgets their tags and reports all of them.
    ///
    /// Returns the number of rows removed, dependents included.
    pub(crate) fn sweep(
        &self,
        table: &str,
        deleted: Vec<Row>,
        emit: Emit<'_>,
    ) -> SyncResult<usize> {
        let relationships = self.state.lock().relationships.clone();
        let cascaded =
            relationships.cascade(self.engine.as_ref(), table, &deleted, Cascade::Delete)?;

        let removed: Vec<(String, Row)> = deleted
            .into_iter()
            .map(|row| (table.to_string(), row))
            .chain(cascaded)
            .collect();

        let mut schemas: HashMap<String, TableSchema> = HashMap::new();
        let mut keys = Vec::with_capacity(removed.len());
        for (name, row) in &removed {
            if !schemas.contains_key(name) {
                schemas.insert(name.clone(), self.engine.table_schema(name)?);
            }
            if let Some(schema) = schemas.get(name) {
                keys.push(schema.key_of(row));
            }
        }
        {
            let mut state = self.state.lock();
            for ((name, _), key) in removed.iter().zip(&keys) {
                state.tags.remove(name, key);
            }
        }

        let count = removed.len();
        for (name, row) in removed {
            emit(SyncEvent::deleted(&name, row));
        }
        Ok(count)
    }
}

fn require_column(schema: &TableSchema, column: &str) -> SyncResult<()> {
    match schema.column(column) {
        Some(_) => Ok(()),
        None => Err(StorageError::unknown_column(&schema.name, column).into()),
    }
}

fn create_engine(config: &EngineConfig) -> StorageResult<Box<dyn StorageEngine>> {
    let policy = config.max_rows_policy;
    Ok(match (config.engine_type, config.management) {
        (EngineType::Memory, _) => Box::new(InMemoryEngine::with_policy(policy)),
        (EngineType::File, DbManagement::Volatile) => {
            Box::new(FileEngine::create(&config.path, policy)?)
        }
        (EngineType::File, DbManagement::Persistent) => {
            Box::new(FileEngine::open(&config.path, policy)?)
        }
    })
}

/// Applies the creation script to a fresh database, or the pending upgrade
/// scripts to an existing one.
fn initialize_schema(engine: &dyn StorageEngine, config: &EngineConfig) -> StorageResult<()> {
    let upgrades = &config.upgrade_statements;

    if engine.table_names().is_empty() {
        execute_script(engine, &config.creation_statement)?;
        engine.set_schema_version(u32::try_from(upgrades.len()).unwrap_or(u32::MAX))?;
        info!(
            tables = engine.table_names().len(),
            version = engine.schema_version(),
            "created database schema"
        );
    } else {
        let from = engine.schema_version() as usize;
        for (index, script) in upgrades.iter().enumerate().skip(from) {
            execute_script(engine, script)?;
            engine.set_schema_version(u32::try_from(index + 1).unwrap_or(u32::MAX))?;
        }
        if upgrades.len() > from {
            info!(
                from,
                to = engine.schema_version(),
                "upgraded database schema"
            );
        }
    }
    engine.flush()
}
