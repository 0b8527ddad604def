//! Replay command implementation.
//!
//! A script is a JSON array of steps run in order against one session, so
//! that transactions can span several syncs:
//!
//! ```json
//! [
//!   {"op": "begin", "tables": ["ports"]},
//!   {"op": "sync_txn", "table": "ports", "data": [{"port": 22}]},
//!   {"op": "deleted"},
//!   {"op": "close"}
//! ]
//! ```
//!
//! Transaction steps name their transaction with `txn`, `"default"` when
//! omitted.

use super::{read_file, CliError, CliResult, EventPrinter, Target};
use dbsync_core::{
    BulkInsertRequest, DbSync, DeleteRequest, Handle, MaxRowsRequest, RelationshipRequest,
    Request, SelectRequest, SnapshotRequest, SyncRequest, TransactionRequest, TxnHandle,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

fn default_txn() -> String {
    "default".to_string()
}

/// One script step.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Unconditional insert.
    Bulk(BulkInsertRequest),
    /// Row sync outside any transaction.
    Sync(SyncRequest),
    /// Snapshot refresh.
    Refresh(SnapshotRequest),
    /// Delete by key or filter.
    Delete(DeleteRequest),
    /// Select rows.
    Select(SelectRequest),
    /// Declare a relationship.
    Relationship(RelationshipRequest),
    /// Cap a table.
    MaxRows(MaxRowsRequest),
    /// Open a transaction.
    Begin {
        /// Transaction name.
        #[serde(default = "default_txn")]
        txn: String,
        /// Covered tables.
        #[serde(flatten)]
        request: TransactionRequest,
    },
    /// Row sync within a transaction.
    SyncTxn {
        /// Transaction name.
        #[serde(default = "default_txn")]
        txn: String,
        /// Rows to apply.
        #[serde(flatten)]
        request: SyncRequest,
    },
    /// Report what closing a transaction would delete.
    Deleted {
        /// Transaction name.
        #[serde(default = "default_txn")]
        txn: String,
    },
    /// Close a transaction.
    Close {
        /// Transaction name.
        #[serde(default = "default_txn")]
        txn: String,
    },
}

impl Step {
    fn validate(&self) -> CliResult<()> {
        match self {
            Step::Bulk(r) => r.validate()?,
            Step::Sync(r) | Step::SyncTxn { request: r, .. } => r.validate()?,
            Step::Refresh(r) => r.validate()?,
            Step::Delete(r) => r.validate()?,
            Step::Select(r) => r.validate()?,
            Step::Relationship(r) => r.validate()?,
            Step::MaxRows(r) => r.validate()?,
            Step::Begin { request, .. } => request.validate()?,
            Step::Deleted { .. } | Step::Close { .. } => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self {
            Step::Bulk(_) => "bulk",
            Step::Sync(_) => "sync",
            Step::Refresh(_) => "refresh",
            Step::Delete(_) => "delete",
            Step::Select(_) => "select",
            Step::Relationship(_) => "relationship",
            Step::MaxRows(_) => "max_rows",
            Step::Begin { .. } => "begin",
            Step::SyncTxn { .. } => "sync_txn",
            Step::Deleted { .. } => "deleted",
            Step::Close { .. } => "close",
        }
    }
}

/// Parses and validates a script.
pub fn parse(script: &str) -> CliResult<Vec<Step>> {
    let steps: Vec<Step> = serde_json::from_str(script)?;
    for step in &steps {
        step.validate()?;
    }
    Ok(steps)
}

/// Runs the replay command.
pub fn run(target: &Target, script: &Path) -> CliResult<()> {
    let steps = parse(&read_file(script)?)?;
    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;

    let result = Session::new(&dbsync, handle).run(&steps, io::stdout().lock());
    dbsync.release_context(handle);

    let events = result?;
    info!(steps = steps.len(), events, "replay complete");
    Ok(())
}

/// Runs steps against one handle, tracking named transactions.
struct Session<'a> {
    dbsync: &'a DbSync,
    handle: Handle,
    transactions: HashMap<String, TxnHandle>,
}

impl<'a> Session<'a> {
    fn new(dbsync: &'a DbSync, handle: Handle) -> Self {
        Self {
            dbsync,
            handle,
            transactions: HashMap::new(),
        }
    }

    fn txn(&self, name: &str) -> CliResult<TxnHandle> {
        self.transactions
            .get(name)
            .copied()
            .ok_or(CliError::Sync(dbsync_core::SyncError::InvalidTransaction))
    }

    fn run<W: Write>(&mut self, steps: &[Step], out: W) -> CliResult<usize> {
        let mut printer = EventPrinter::new(out);
        for (index, step) in steps.iter().enumerate() {
            debug!(index, op = step.name(), "replay step");
            self.step(step, &mut printer)?;
        }
        printer.finish()
    }

    fn step<W: Write>(&mut self, step: &Step, printer: &mut EventPrinter<W>) -> CliResult<()> {
        let (dbsync, handle) = (self.dbsync, self.handle);
        match step {
            Step::Bulk(r) => {
                dbsync.insert_bulk_data(handle, r)?;
            }
            Step::Sync(r) => dbsync.sync_row_data(handle, r, |e| printer.print(e))?,
            Step::Refresh(r) => dbsync.refresh_snapshot(handle, r, |e| printer.print(e))?,
            Step::Delete(r) => {
                dbsync.delete_rows_data(handle, r)?;
            }
            Step::Select(r) => {
                dbsync.select_rows(handle, r, |e| printer.print(e))?;
            }
            Step::Relationship(r) => dbsync.add_table_relationship(handle, r)?,
            Step::MaxRows(r) => dbsync.set_max_rows(handle, &r.table, r.max_rows)?,
            Step::Begin { txn, request } => {
                let opened = dbsync.create_transaction(handle, request)?;
                self.transactions.insert(txn.clone(), opened);
            }
            Step::SyncTxn { txn, request } => {
                let txn = self.txn(txn)?;
                dbsync.sync_txn_row_data(handle, txn, request, |e| printer.print(e))?;
            }
            Step::Deleted { txn } => {
                let txn = self.txn(txn)?;
                dbsync.get_deleted(handle, txn, |e| printer.print(e))?;
            }
            Step::Close { txn: name } => {
                let txn = self.txn(name)?;
                dbsync.close_transaction(handle, txn)?;
                self.transactions.remove(name);
            }
        }
        Ok(())
    }
}
