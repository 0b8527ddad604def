//! Error types for the synchronization engine.

use dbsync_storage::StorageError;
use thiserror::Error;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The session handle is unknown or was released.
    #[error("invalid handle")]
    InvalidHandle,

    /// The transaction handle is unknown, closed, or owned by another session.
    #[error("invalid transaction")]
    InvalidTransaction,

    /// The table does not exist, or is not usable in this call.
    #[error("invalid table {table}: {reason}")]
    InvalidTable {
        /// Table name.
        table: String,
        /// Why the table was rejected.
        reason: String,
    },

    /// The storage engine could not be opened or upgraded.
    #[error("engine creation failed: {message}")]
    EngineCreation {
        /// Description of the failure.
        message: String,
    },

    /// The request payload does not fit the target table.
    #[error("malformed payload: {message}")]
    MalformedPayload {
        /// Description of the problem.
        message: String,
    },

    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl SyncError {
    /// Creates an invalid table error.
    pub fn invalid_table(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates an engine creation error.
    pub fn engine_creation(message: impl Into<String>) -> Self {
        Self::EngineCreation {
            message: message.into(),
        }
    }

    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TableNotFound(table) => Self::invalid_table(table, "no such table"),
            err if err.is_payload_error() => Self::malformed(err.to_string()),
            err => Self::Storage(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}
