//! Session configuration.

use crate::types::{DbManagement, EngineType, HostType};
use dbsync_storage::MaxRowsPolicy;
use std::path::PathBuf;

/// Configuration for opening a synchronization session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Role of the host.
    pub host_type: HostType,

    /// Storage engine kind.
    pub engine_type: EngineType,

    /// Database file, used by [`EngineType::File`].
    pub path: PathBuf,

    /// Schema script applied to a fresh database.
    pub creation_statement: String,

    /// Whether existing data survives the open.
    pub management: DbManagement,

    /// Schema scripts applied in order to upgrade a persisted database.
    ///
    /// The stored schema version counts how many have already been applied.
    pub upgrade_statements: Vec<String>,

    /// What the storage engine does when a capped table is full.
    pub max_rows_policy: MaxRowsPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_type: HostType::Agent,
            engine_type: EngineType::Memory,
            path: PathBuf::from("dbsync.db"),
            creation_statement: String::new(),
            management: DbManagement::Volatile,
            upgrade_statements: Vec::new(),
            max_rows_policy: MaxRowsPolicy::Reject,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host type.
    #[must_use]
    pub const fn host_type(mut self, host_type: HostType) -> Self {
        self.host_type = host_type;
        self
    }

    /// Sets the storage engine kind.
    #[must_use]
    pub const fn engine_type(mut self, engine_type: EngineType) -> Self {
        self.engine_type = engine_type;
        self
    }

    /// Sets the database file path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the creation script.
    #[must_use]
    pub fn creation_statement(mut self, statement: impl Into<String>) -> Self {
        self.creation_statement = statement.into();
        self
    }

    /// Sets the management policy.
    #[must_use]
    pub const fn management(mut self, management: DbManagement) -> Self {
        self.management = management;
        self
    }

    /// Sets the upgrade scripts.
    #[must_use]
    pub fn upgrade_statements<S: Into<String>>(
        mut self,
        statements: impl IntoIterator<Item = S>,
    ) -> Self {
        self.upgrade_statements = statements.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the row-cap policy.
    #[must_use]
    pub const fn max_rows_policy(mut self, policy: MaxRowsPolicy) -> Self {
        self.max_rows_policy = policy;
        self
    }
}
