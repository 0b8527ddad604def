//! Per-row status tags for mark/sweep.

use dbsync_storage::RowKey;
use std::collections::HashMap;

/// Mark/sweep state of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowStatus {
    /// Not under mark/sweep.
    #[default]
    Untouched,
    /// Marked at transaction start and not seen since.
    Stale,
    /// Seen during the current pass.
    Current,
}

/// Status tags of every table under an open transaction.
///
/// Tags live beside the storage engine, never in it. A table is tracked from
/// the moment a transaction marks it until that transaction closes; rows of
/// untracked tables are [`RowStatus::Untouched`].
#[derive(Debug, Default)]
pub(crate) struct StatusTags {
    tables: HashMap<String, HashMap<RowKey, RowStatus>>,
}

impl StatusTags {
    /// Starts tracking `table`, marking the given rows stale.
    pub(crate) fn mark_stale(&mut self, table: &str, keys: impl IntoIterator<Item = RowKey>) {
        let tags = self.tables.entry(table.to_string()).or_default();
        tags.clear();
        tags.extend(keys.into_iter().map(|key| (key, RowStatus::Stale)));
    }

    /// Tags a row current. No-op for untracked tables.
    pub(crate) fn mark_current(&mut self, table: &str, key: RowKey) {
        if let Some(tags) = self.tables.get_mut(table) {
            tags.insert(key, RowStatus::Current);
        }
    }

    /// Forgets a row that no longer exists.
    pub(crate) fn remove(&mut self, table: &str, key: &RowKey) {
        if let Some(tags) = self.tables.get_mut(table) {
            tags.remove(key);
        }
    }

    pub(crate) fn status(&self, table: &str, key: &RowKey) -> RowStatus {
        self.tables
            .get(table)
            .and_then(|tags| tags.get(key))
            .copied()
            .unwrap_or_default()
    }

    /// Keys still stale in `table`, in key order.
    pub(crate) fn stale_keys(&self, table: &str) -> Vec<RowKey> {
        let mut keys: Vec<RowKey> = self
            .tables
            .get(table)
            .map(|tags| {
                tags.iter()
                    .filter(|(_, status)| **status == RowStatus::Stale)
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Stops tracking `table`; its rows return to untouched.
    pub(crate) fn untrack(&mut self, table: &str) {
        self.tables.remove(table);
    }
}
