//! # DBSync Storage
//!
//! Storage engine trait and implementations for DBSync.
//!
//! This crate provides the table-store abstraction the synchronization layer
//! runs on: typed rows, schemas, filters and a [`StorageEngine`] trait with
//! two reference engines. Engines know nothing about snapshots, transactions
//! or row status.
//!
//! ## Design Principles
//!
//! - Rows are maps of column name to [`Value`], keyed by primary key
//! - Schemas come from `CREATE TABLE` / `ALTER TABLE` text ([`parse_statements`])
//! - Engines must be `Send + Sync` and synchronize internally
//! - Row caps are enforced by the engine under a [`MaxRowsPolicy`]
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - For testing and volatile state
//! - [`FileEngine`] - Persisted to a single locked file
//!
//! ## Example
//!
//! ```rust
//! use dbsync_storage::{execute_script, InMemoryEngine, Row, RowKey, StorageEngine, Value};
//!
//! let engine = InMemoryEngine::new();
//! execute_script(&engine, "CREATE TABLE os (name TEXT PRIMARY KEY, version TEXT)").unwrap();
//! engine
//!     .update_or_insert_row("os", &Row::new().with("name", "linux").with("version", "6.1"))
//!     .unwrap();
//! let key = RowKey(vec![Value::from("linux")]);
//! assert!(engine.get_row("os", &key).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ddl;
mod engine;
mod error;
mod file;
mod filter;
mod memory;
mod schema;
mod value;

pub use ddl::{parse_statements, Statement};
pub use engine::{execute_script, MaxRowsPolicy, StorageEngine, UpsertOutcome};
pub use error::{StorageError, StorageResult};
pub use file::FileEngine;
pub use filter::{Condition, Filter, Operator, Query};
pub use memory::InMemoryEngine;
pub use schema::{ColumnDef, ColumnType, TableSchema};
pub use value::{Row, RowKey, Value};
