//! Parent/child table relationships and cascading.

use crate::error::SyncResult;
use crate::request::{RelatedTable, RelationshipRequest};
use dbsync_storage::{Condition, Filter, Query, Row, StorageEngine};
use std::collections::HashMap;

/// Whether a cascade only reports dependent rows or also removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cascade {
    Report,
    Delete,
}

/// Declared relationships of one session, keyed by parent table.
#[derive(Debug, Clone, Default)]
pub(crate) struct Relationships {
    by_base: HashMap<String, Vec<RelatedTable>>,
}

impl Relationships {
    /// Records a relationship. Redeclaring a parent/child pair replaces its
    /// field match.
    pub(crate) fn add(&mut self, request: &RelationshipRequest) {
        let children = self.by_base.entry(request.base_table.clone()).or_default();
        for related in &request.relationed_tables {
            match children.iter_mut().find(|c| c.table == related.table) {
                Some(existing) => existing.field_match = related.field_match.clone(),
                None => children.push(related.clone()),
            }
        }
    }

    fn children(&self, table: &str) -> &[RelatedTable] {
        self.by_base.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }

    /// Follows relationships from `parents`, a set of rows of `table` that
    /// are being deleted, and returns the dependent rows as `(table, row)`.
    ///
    /// A child row depends on a parent row when every `field_match` column
    /// pair holds equal non-`NULL` values. Each table is entered at most once
    /// per path, so cyclic declarations terminate.
    pub(crate) fn cascade(
        &self,
        engine: &dyn StorageEngine,
        table: &str,
        parents: &[Row],
        mode: Cascade,
    ) -> SyncResult<Vec<(String, Row)>> {
        let mut out = Vec::new();
        if !self.is_empty() && !parents.is_empty() {
            let mut path = Vec::new();
            self.visit(engine, table, parents, mode, &mut path, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        engine: &dyn StorageEngine,
        table: &str,
        parents: &[Row],
        mode: Cascade,
        path: &mut Vec<String>,
        out: &mut Vec<(String, Row)>,
    ) -> SyncResult<()> {
        path.push(table.to_string());

        for related in self.children(table) {
            if path.contains(&related.table) {
                continue;
            }

            let mut found: Vec<Row> = Vec::new();
            for parent in parents {
                let Some(filter) = dependent_filter(related, parent) else {
                    continue;
                };
                let rows = match mode {
                    Cascade::Delete => engine.delete_rows(&related.table, &filter)?,
                    Cascade::Report => engine.select(&related.table, &Query::all().filter(filter))?,
                };
                for row in rows {
                    if !found.contains(&row) {
                        found.push(row);
                    }
                }
            }

            if !found.is_empty() {
                out.extend(found.iter().map(|row| (related.table.clone(), row.clone())));
                self.visit(engine, &related.table, &found, mode, path, out)?;
            }
        }

        path.pop();
        Ok(())
    }
}

/// Filter selecting the children of `parent`, or `None` when nothing can
/// match. An empty field match never matches.
fn dependent_filter(related: &RelatedTable, parent: &Row) -> Option<Filter> {
    if related.field_match.is_empty() {
        return None;
    }
    let mut filter = Filter::all();
    for (parent_column, child_column) in &related.field_match {
        let value = parent.get_or_null(parent_column);
        if value.is_null() {
            return None;
        }
        filter = filter.and(Condition::equals(child_column.clone(), value.clone()));
    }
    Some(filter)
}
