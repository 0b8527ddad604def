//! Core type definitions for DBSync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an open synchronization session.
///
/// A handle is an index into the registry's slot table plus the generation of
/// that slot. Releasing a session bumps the generation, so a stale handle is
/// rejected even after its slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Handle {
    /// Packs the handle into a single integer, e.g. to hand it across a
    /// process or language boundary.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Rebuilds a handle from [`Handle::to_raw`] output.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db:{}.{}", self.index, self.generation)
    }
}

/// Identifier of an open transaction.
///
/// Carries the session it was created on; every transactional call checks
/// that the session matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnHandle {
    pub(crate) session: Handle,
    pub(crate) id: u64,
}

impl TxnHandle {
    /// Returns the session this transaction belongs to.
    #[must_use]
    pub const fn session(self) -> Handle {
        self.session
    }

    /// Returns the transaction id, unique within its session.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.id
    }
}

impl fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}@{}", self.id, self.session)
    }
}

/// Role of the host the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    /// Central manager.
    Manager,
    /// Reporting agent.
    #[default]
    Agent,
}

/// Kind of storage engine backing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Process memory only; the path is ignored.
    #[default]
    Memory,
    /// A single persisted file at the configured path.
    File,
}

/// What happens to existing data when a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbManagement {
    /// Existing data is discarded and the schema recreated.
    #[default]
    Volatile,
    /// Existing data is kept and the schema upgraded in place.
    Persistent,
}
