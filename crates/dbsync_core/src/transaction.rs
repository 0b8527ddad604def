//! Transactions: grouped mark/sweep over a set of tables.
//!
//! Lifecycle of a transaction:
//!
//! 1. `create` marks every existing row of its tables stale.
//! 2. Row syncs against the transaction tag the rows they touch current.
//! 3. `get_deleted` reports the rows still stale, and their dependents.
//! 4. `close` deletes those rows, drops the tags and forgets the transaction.
//!
//! No lock is held between calls; each step takes the session lock for its
//! own duration only.

use crate::context::{EngineContext, Emit};
use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::lock::{ExclusiveLocking, SharedLocking};
use crate::relationship::Cascade;
use crate::request::{SyncRequest, TransactionRequest};
use dbsync_storage::{RowKey, TableSchema};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// An open transaction.
#[derive(Debug, Clone)]
pub(crate) struct TransactionContext {
    /// Covered tables, in request order without duplicates.
    pub(crate) tables: Vec<String>,
}

impl TransactionContext {
    fn covers(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }
}

impl EngineContext {
    /// Opens a transaction and returns its id.
    pub(crate) fn create_transaction(&self, request: &TransactionRequest) -> SyncResult<u64> {
        let _lock = ExclusiveLocking::new(&self.lock);

        let mut tables: Vec<String> = Vec::with_capacity(request.tables.len());
        for table in &request.tables {
            if !tables.contains(table) {
                self.engine.table_schema(table)?;
                tables.push(table.clone());
            }
        }

        let mut state = self.state.lock();
        if let Some(table) = tables
            .iter()
            .find(|t| state.transactions.values().any(|txn| txn.covers(t)))
        {
            return Err(SyncError::invalid_table(
                table.clone(),
                "already part of an open transaction",
            ));
        }

        for table in &tables {
            let keys = self.engine.keys(table)?;
            state.tags.mark_stale(table, keys);
        }

        let id = state.next_txn;
        state.next_txn += 1;
        info!(txn = id, tables = ?tables, "created transaction");
        state.transactions.insert(id, TransactionContext { tables });
        Ok(id)
    }

    fn transaction(&self, id: u64) -> SyncResult<TransactionContext> {
        self.state
            .lock()
            .transactions
            .get(&id)
            .cloned()
            .ok_or(SyncError::InvalidTransaction)
    }

    /// Row sync scoped to a transaction.
    pub(crate) fn sync_txn_rows(
        &self,
        id: u64,
        request: &SyncRequest,
        emit: Emit<'_>,
    ) -> SyncResult<()> {
        let _lock = SharedLocking::new(&self.lock);

        let txn = self.transaction(id)?;
        if !txn.covers(&request.table) {
            return Err(SyncError::invalid_table(
                request.table.clone(),
                "not part of the transaction",
            ));
        }

        self.apply_rows(&request.table, &request.data, emit)?;
        self.engine.flush()?;
        Ok(())
    }

    /// Reports every row the transaction would delete on close.
    ///
    /// A row reached both as stale and through a cascade, or through several
    /// cascades, is reported once.
    pub(crate) fn get_deleted(&self, id: u64, emit: Emit<'_>) -> SyncResult<usize> {
        let _lock = ExclusiveLocking::new(&self.lock);

        let txn = self.transaction(id)?;
        let relationships = self.state.lock().relationships.clone();

        let mut schemas: HashMap<String, TableSchema> = HashMap::new();
        let mut reported: HashSet<(String, RowKey)> = HashSet::new();
        for table in &txn.tables {
            let keys = self.state.lock().tags.stale_keys(table);
            let mut rows = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(row) = self.engine.get_row(table, key)? {
                    rows.push(row);
                }
            }
            let dependents =
                relationships.cascade(self.engine.as_ref(), table, &rows, Cascade::Report)?;

            let doomed = rows
                .into_iter()
                .map(|row| (table.clone(), row))
                .chain(dependents);
            for (name, row) in doomed {
                if !schemas.contains_key(&name) {
                    schemas.insert(name.clone(), self.engine.table_schema(&name)?);
                }
                let Some(schema) = schemas.get(&name) else {
                    continue;
                };
                if reported.insert((name.clone(), schema.key_of(&row))) {
                    emit(SyncEvent::deleted(&name, row));
                }
            }
        }

        let count = reported.len();
        debug!(txn = id, count, "reported deleted rows");
        Ok(count)
    }

    /// Deletes the rows still stale and ends the transaction.
    pub(crate) fn close_transaction(&self, id: u64) -> SyncResult<usize> {
        let _lock = ExclusiveLocking::new(&self.lock);

        let txn = self.transaction(id)?;
        let mut removed = 0;
        for table in &txn.tables {
            let keys = self.state.lock().tags.stale_keys(table);
            let deleted = self.engine.delete_keys(table, &keys)?;
            removed += self.sweep(table, deleted, &mut |_| {})?;
        }

        {
            let mut state = self.state.lock();
            for table in &txn.tables {
                state.tags.untrack(table);
            }
            state.transactions.remove(&id);
        }
        self.engine.flush()?;

        info!(txn = id, removed, "closed transaction");
        Ok(removed)
    }

    pub(crate) fn open_transactions(&self) -> usize {
        self.state.lock().transactions.len()
    }
}
