//! CLI command implementations.

pub mod delete;
pub mod inspect;
pub mod refresh;
pub mod replay;
pub mod select;
pub mod sync;

use dbsync_core::{
    DbManagement, DbSync, EngineConfig, EngineType, Handle, Request, SyncError, SyncEvent,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Output could not be written.
    #[error("output error: {0}")]
    Output(#[from] io::Error),

    /// Events could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine rejected an operation.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Where a command operates.
#[derive(Debug, Clone, Default)]
pub struct Target {
    /// Database file; in-memory when `None`.
    pub path: Option<PathBuf>,
    /// Creation statements for a new database.
    pub schema: Option<PathBuf>,
}

impl Target {
    /// Builds the engine configuration for this target.
    ///
    /// File databases are persistent so that successive invocations see
    /// each other's data.
    pub fn config(&self) -> CliResult<EngineConfig> {
        let mut config = EngineConfig::new();
        if let Some(schema) = &self.schema {
            config = config.creation_statement(read_file(schema)?);
        }
        if let Some(path) = &self.path {
            config = config
                .engine_type(EngineType::File)
                .management(DbManagement::Persistent)
                .path(path);
        }
        Ok(config)
    }

    /// Opens a session on `dbsync`.
    pub fn open(&self, dbsync: &DbSync) -> CliResult<Handle> {
        Ok(dbsync.open(&self.config()?)?)
    }
}

/// Reads a whole file.
pub fn read_file(path: &Path) -> CliResult<String> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and validates a request file.
pub fn read_request<R: Request>(path: &Path) -> CliResult<R> {
    Ok(R::from_json(&read_file(path)?)?)
}

/// Writes events as JSON lines.
pub struct EventPrinter<W: Write> {
    out: W,
    error: Option<CliError>,
    count: usize,
}

impl<W: Write> EventPrinter<W> {
    /// Creates a printer writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            error: None,
            count: 0,
        }
    }

    /// Prints one event. The first failure is kept and later events dropped.
    pub fn print(&mut self, event: SyncEvent) {
        if self.error.is_some() {
            return;
        }
        let written = serde_json::to_string(&event)
            .map_err(CliError::from)
            .and_then(|line| writeln!(self.out, "{line}").map_err(CliError::from));
        match written {
            Ok(()) => self.count += 1,
            Err(e) => self.error = Some(e),
        }
    }

    /// Returns the number of events printed, or the first output failure.
    pub fn finish(mut self) -> CliResult<usize> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.count)
    }
}
