//! Scoped lock acquisition over a session's read/write lock.
//!
//! Operations that restructure a session (bulk loads, deletes, transaction
//! lifecycle, relationships, caps) take [`ExclusiveLocking`]. Operations that
//! stream rows to a callback (row sync, refresh, select) take
//! [`SharedLocking`] and may run together. Both release on drop, so every
//! exit path, error returns included, unlocks.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Exclusive access to a session.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub(crate) struct ExclusiveLocking<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl<'a> ExclusiveLocking<'a> {
    /// Blocks until no other operation holds the lock.
    pub(crate) fn new(lock: &'a RwLock<()>) -> Self {
        Self {
            _guard: lock.write(),
        }
    }
}

/// Shared access to a session.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub(crate) struct SharedLocking<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

impl<'a> SharedLocking<'a> {
    /// Blocks while an exclusive operation holds the lock.
    pub(crate) fn new(lock: &'a RwLock<()>) -> Self {
        Self {
            _guard: lock.read(),
        }
    }
}
