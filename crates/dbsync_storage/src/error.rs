//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// A row or filter names a column the table does not have.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Offending column.
        column: String,
    },

    /// A value does not fit the declared column type.
    #[error("type mismatch for {table}.{column}: expected {expected}")]
    TypeMismatch {
        /// Table name.
        table: String,
        /// Offending column.
        column: String,
        /// Declared column type.
        expected: String,
    },

    /// A row lacks one of the primary-key columns.
    #[error("missing primary key column {column} in table {table}")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
        /// Missing key column.
        column: String,
    },

    /// Inserting would exceed the table's row cap.
    #[error("table {table} reached its maximum of {limit} rows")]
    MaxRowsExceeded {
        /// Table name.
        table: String,
        /// Configured cap.
        limit: usize,
    },

    /// A schema statement could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset into the statement text.
        offset: usize,
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the database file.
    #[error("database locked: {0}")]
    Locked(String),

    /// The persisted database is unreadable.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Encoding or decoding the persisted image failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a parse error.
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    /// Creates an unknown column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns true for errors caused by the shape of caller data
    /// rather than by the engine itself.
    #[must_use]
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownColumn { .. } | Self::TypeMismatch { .. } | Self::MissingPrimaryKey { .. }
        )
    }
}
