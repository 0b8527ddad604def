//! Inspect command implementation.

use super::{CliResult, Target};
use dbsync_core::{DbSync, Query, SelectRequest};
use serde::Serialize;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path, or `:memory:`.
    pub path: String,
    /// Per-table statistics, in creation order.
    pub tables: Vec<TableStats>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of stored rows.
    pub rows: usize,
}

/// Runs the inspect command.
pub fn run(target: &Target, format: &str) -> CliResult<()> {
    let result = inspect(target)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects table statistics.
pub fn inspect(target: &Target) -> CliResult<InspectResult> {
    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;
    let info = dbsync.session_info(handle)?;

    let mut tables = Vec::with_capacity(info.tables.len());
    for name in info.tables {
        let request = SelectRequest {
            table: name.clone(),
            query: Query::all(),
        };
        let rows = dbsync.select_rows(handle, &request, |_| {})?;
        tables.push(TableStats { name, rows });
    }
    dbsync.release_context(handle);

    Ok(InspectResult {
        path: target
            .path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
        tables,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!("Tables:   {}", result.tables.len());
    for table in &result.tables {
        println!("  {:<32} {:>10} rows", table.name, table.rows);
    }
}
