//! Public entry point: the session registry and its operations.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::registry::Registry;
use crate::request::{
    BulkInsertRequest, DeleteRequest, RelationshipRequest, Request, SelectRequest,
    SnapshotRequest, SyncRequest, TransactionRequest,
};
use crate::status::RowStatus;
use crate::types::{EngineType, Handle, HostType, TxnHandle};
use dbsync_storage::RowKey;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Summary of an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Role of the host.
    pub host_type: HostType,
    /// Storage engine kind.
    pub engine_type: EngineType,
    /// Tables in the session's database.
    pub tables: Vec<String>,
    /// Number of open transactions.
    pub open_transactions: usize,
}

/// The synchronization engine.
///
/// `DbSync` maps opaque [`Handle`]s to open sessions. Each session wraps one
/// storage engine and computes row-level differences between what it stores
/// and what callers send it, reporting them as [`SyncEvent`]s.
///
/// # Concurrency
///
/// Looking up a handle takes the registry mutex only long enough to clone
/// the session out, so work on one handle never blocks another. Within a
/// session, bulk inserts, deletes, transaction lifecycle, relationships and
/// row caps run exclusively; row syncs, refreshes and selects run shared.
///
/// Callbacks run while the session lock is held. A callback must not call
/// back into the same handle.
///
/// # Example
///
/// ```rust
/// use dbsync_core::{DbSync, EngineConfig, SnapshotRequest, Request};
///
/// let dbsync = DbSync::new();
/// let config = EngineConfig::new()
///     .creation_statement("CREATE TABLE os (name TEXT PRIMARY KEY, version TEXT)");
/// let handle = dbsync.open(&config).unwrap();
///
/// let snapshot = SnapshotRequest::from_json(
///     r#"{"table": "os", "data": [{"name": "linux", "version": "6.1"}]}"#,
/// )
/// .unwrap();
/// let mut events = Vec::new();
/// dbsync.refresh_snapshot(handle, &snapshot, |e| events.push(e)).unwrap();
/// assert_eq!(events.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct DbSync {
    registry: Mutex<Registry<EngineContext>>,
}

impl DbSync {
    /// Creates an empty engine with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide engine.
    pub fn global() -> &'static DbSync {
        static GLOBAL: OnceLock<DbSync> = OnceLock::new();
        GLOBAL.get_or_init(DbSync::new)
    }

    /// Opens a session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EngineCreation`] if the storage engine cannot be
    /// opened or its schema cannot be created or upgraded.
    pub fn open(&self, config: &EngineConfig) -> SyncResult<Handle> {
        let context = match EngineContext::open(config) {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, engine = ?config.engine_type, "failed to open session");
                return Err(e);
            }
        };
        let handle = self.registry.lock().insert(Arc::new(context));
        info!(
            %handle,
            host = ?config.host_type,
            engine = ?config.engine_type,
            management = ?config.management,
            "opened session"
        );
        Ok(handle)
    }

    /// Releases every session. All outstanding handles become invalid.
    pub fn release_all(&self) {
        let released = self.registry.lock().drain();
        info!(sessions = released.len(), "released all sessions");
    }

    /// Releases one session. Unknown handles are ignored.
    pub fn release_context(&self, handle: Handle) {
        if self.registry.lock().remove(handle).is_some() {
            info!(%handle, "released session");
        }
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.lock().len()
    }

    fn lookup(&self, handle: Handle) -> SyncResult<Arc<EngineContext>> {
        self.registry
            .lock()
            .get(handle)
            .ok_or(SyncError::InvalidHandle)
    }

    /// Describes an open session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidHandle`] for unknown handles.
    pub fn session_info(&self, handle: Handle) -> SyncResult<SessionInfo> {
        let context = self.lookup(handle)?;
        Ok(SessionInfo {
            host_type: context.host_type(),
            engine_type: context.engine_type(),
            tables: context.engine.table_names(),
            open_transactions: context.open_transactions(),
        })
    }

    /// Inserts rows unconditionally, without diffing.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Fails without inserting anything if a row does not fit the table, or
    /// if the table's row cap would be exceeded.
    pub fn insert_bulk_data(
        &self,
        handle: Handle,
        request: &BulkInsertRequest,
    ) -> SyncResult<usize> {
        let context = self.lookup(handle)?;
        request.validate()?;
        context.insert_bulk(request)
    }

    /// Applies rows by primary key and reports each insertion and
    /// modification.
    ///
    /// Rows of a table covered by an open transaction count as seen by it.
    ///
    /// # Errors
    ///
    /// Fails without applying anything if a row does not fit the table.
    pub fn sync_row_data<F>(
        &self,
        handle: Handle,
        request: &SyncRequest,
        mut callback: F,
    ) -> SyncResult<()>
    where
        F: FnMut(SyncEvent),
    {
        let context = self.lookup(handle)?;
        request.validate()?;
        debug!(%handle, table = %request.table, rows = request.data.len(), "sync rows");
        context.sync_rows(request, &mut callback)
    }

    /// Applies rows within a transaction and reports each insertion and
    /// modification.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransaction`] if `txn` is closed or belongs
    /// to another session, and [`SyncError::InvalidTable`], leaving the table
    /// unmodified, if the table is not covered by the transaction.
    pub fn sync_txn_row_data<F>(
        &self,
        handle: Handle,
        txn: TxnHandle,
        request: &SyncRequest,
        mut callback: F,
    ) -> SyncResult<()>
    where
        F: FnMut(SyncEvent),
    {
        let context = self.lookup(handle)?;
        if txn.session != handle {
            return Err(SyncError::InvalidTransaction);
        }
        request.validate()?;
        debug!(%txn, table = %request.table, rows = request.data.len(), "sync transaction rows");
        context.sync_txn_rows(txn.id, request, &mut callback)
    }

    /// Deletes rows by key or by filter, together with their dependents.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedPayload`] for unknown columns or rows
    /// without a complete primary key.
    pub fn delete_rows_data(&self, handle: Handle, request: &DeleteRequest) -> SyncResult<usize> {
        let context = self.lookup(handle)?;
        request.validate()?;
        context.delete_rows(request)
    }

    /// Replaces a table's contents with a snapshot and reports every
    /// difference.
    ///
    /// Insertions and modifications are reported in payload order, then
    /// deletions in primary-key order.
    ///
    /// # Errors
    ///
    /// Fails without changing the table if a row does not fit it.
    pub fn refresh_snapshot<F>(
        &self,
        handle: Handle,
        request: &SnapshotRequest,
        mut callback: F,
    ) -> SyncResult<()>
    where
        F: FnMut(SyncEvent),
    {
        let context = self.lookup(handle)?;
        request.validate()?;
        context.refresh(request, &mut callback)
    }

    /// Reports the rows matching a query as `SELECTED` events.
    ///
    /// Returns the number of rows reported.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedPayload`] if the query names unknown
    /// columns.
    pub fn select_rows<F>(
        &self,
        handle: Handle,
        request: &SelectRequest,
        mut callback: F,
    ) -> SyncResult<usize>
    where
        F: FnMut(SyncEvent),
    {
        let context = self.lookup(handle)?;
        request.validate()?;
        context.select(request, &mut callback)
    }

    /// Declares child tables whose rows are removed with their parent rows.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTable`] for unknown tables and
    /// [`SyncError::MalformedPayload`] for unknown columns or a related table
    /// without a field match.
    pub fn add_table_relationship(
        &self,
        handle: Handle,
        request: &RelationshipRequest,
    ) -> SyncResult<()> {
        self.lookup(handle)?.add_relationship(request)
    }

    /// Caps a table's row count; `0` removes the cap.
    ///
    /// What happens to rows beyond the cap is decided by the storage engine's
    /// [`dbsync_storage::MaxRowsPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTable`] for unknown tables.
    pub fn set_max_rows(&self, handle: Handle, table: &str, limit: usize) -> SyncResult<()> {
        self.lookup(handle)?.set_max_rows(table, limit)
    }

    /// Opens a transaction over a set of tables, marking their rows stale.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTable`] if a table does not exist or is
    /// already covered by another open transaction.
    pub fn create_transaction(
        &self,
        handle: Handle,
        request: &TransactionRequest,
    ) -> SyncResult<TxnHandle> {
        let context = self.lookup(handle)?;
        request.validate()?;
        let id = context.create_transaction(request)?;
        Ok(TxnHandle {
            session: handle,
            id,
        })
    }

    /// Reports, as `DELETED` events, every row that closing the transaction
    /// would remove. Nothing is removed.
    ///
    /// Returns the number of rows reported.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransaction`] if `txn` is closed or belongs
    /// to another session.
    pub fn get_deleted<F>(
        &self,
        handle: Handle,
        txn: TxnHandle,
        mut callback: F,
    ) -> SyncResult<usize>
    where
        F: FnMut(SyncEvent),
    {
        let context = self.lookup(handle)?;
        if txn.session != handle {
            return Err(SyncError::InvalidTransaction);
        }
        context.get_deleted(txn.id, &mut callback)
    }

    /// Deletes every row the transaction did not see and ends it.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransaction`] if `txn` is closed or belongs
    /// to another session.
    pub fn close_transaction(&self, handle: Handle, txn: TxnHandle) -> SyncResult<usize> {
        let context = self.lookup(handle)?;
        if txn.session != handle {
            return Err(SyncError::InvalidTransaction);
        }
        context.close_transaction(txn.id)
    }

    /// Returns the mark/sweep status of a row.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTable`] for unknown tables.
    pub fn row_status(
        &self,
        handle: Handle,
        table: &str,
        key: &RowKey,
    ) -> SyncResult<RowStatus> {
        self.lookup(handle)?.row_status(table, key)
    }
}
