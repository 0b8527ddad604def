//! # DBSync Core
//!
//! Snapshot synchronization engine.
//!
//! A host agent periodically snapshots local state (processes, packages,
//! ports, interfaces) and needs to report what *changed*. This crate stores
//! the last-known snapshot of arbitrary tables and, given a new snapshot or
//! individual rows, computes which rows were inserted, modified or deleted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   DbSync                    │
//! │          (handle → session registry)        │
//! ├─────────────────────────────────────────────┤
//! │                EngineContext                │
//! │  ┌──────────┐ ┌──────────────┐ ┌─────────┐  │
//! │  │ RwLock   │ │ Transactions │ │ Status  │  │
//! │  │ guards   │ │ + relations  │ │ tags    │  │
//! │  └──────────┘ └──────────────┘ └─────────┘  │
//! ├─────────────────────────────────────────────┤
//! │         dbsync_storage::StorageEngine       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Mark and sweep
//!
//! Opening a transaction tags every existing row of its tables stale. Each
//! synced row is inserted or updated and tagged current. Whatever is still
//! stale when the transaction closes was not part of the new snapshot and is
//! deleted. [`DbSync::refresh_snapshot`] runs the same algorithm for one
//! table in a single call.
//!
//! ## Example
//!
//! ```rust
//! use dbsync_core::{DbSync, EngineConfig, Operation, Request, SyncRequest, TransactionRequest};
//!
//! let dbsync = DbSync::new();
//! let config = EngineConfig::new()
//!     .creation_statement("CREATE TABLE ports (port INTEGER PRIMARY KEY, state TEXT)");
//! let handle = dbsync.open(&config).unwrap();
//!
//! let rows = SyncRequest::from_json(
//!     r#"{"table": "ports", "data": [{"port": 22, "state": "listen"}, {"port": 80, "state": "listen"}]}"#,
//! )
//! .unwrap();
//! dbsync.sync_row_data(handle, &rows, |_| {}).unwrap();
//!
//! let txn = dbsync
//!     .create_transaction(handle, &TransactionRequest::new(["ports"]))
//!     .unwrap();
//! let rows = SyncRequest::from_json(r#"{"table": "ports", "data": {"port": 22, "state": "listen"}}"#)
//!     .unwrap();
//! dbsync.sync_txn_row_data(handle, txn, &rows, |_| {}).unwrap();
//!
//! let mut deleted = Vec::new();
//! dbsync.get_deleted(handle, txn, |e| deleted.push(e)).unwrap();
//! assert_eq!(deleted.len(), 1);
//! assert_eq!(deleted[0].operation, Operation::Deleted);
//!
//! dbsync.close_transaction(handle, txn).unwrap();
//! dbsync.release_context(handle);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod dbsync;
mod error;
mod event;
mod lock;
mod registry;
mod relationship;
mod request;
mod status;
mod transaction;
mod types;

pub use config::EngineConfig;
pub use dbsync::{DbSync, SessionInfo};
pub use error::{SyncError, SyncResult};
pub use event::{Operation, SyncEvent};
pub use request::{
    BulkInsertRequest, DeleteQuery, DeleteRequest, MaxRowsRequest, RelatedTable,
    RelationshipRequest, Request, SelectRequest, SnapshotRequest, SyncRequest,
    TransactionRequest,
};
pub use status::RowStatus;
pub use types::{DbManagement, EngineType, Handle, HostType, TxnHandle};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export the storage types that appear in requests and events.
pub use dbsync_storage::{
    Condition, Filter, MaxRowsPolicy, Operator, Query, Row, RowKey, StorageError, Value,
};
