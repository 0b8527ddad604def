//! Select command implementation.

use super::{read_file, CliResult, EventPrinter, Target};
use dbsync_core::{DbSync, Query, Request, SelectRequest};
use std::io;
use std::path::Path;

/// Runs the select command.
pub fn run(target: &Target, table: &str, query: Option<&Path>) -> CliResult<()> {
    let query = match query {
        Some(path) => serde_json::from_str::<Query>(&read_file(path)?)?,
        None => Query::all(),
    };
    let request = SelectRequest {
        table: table.to_string(),
        query,
    };
    request.validate()?;

    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;
    let mut printer = EventPrinter::new(io::stdout().lock());
    dbsync.select_rows(handle, &request, |e| printer.print(e))?;
    printer.finish()?;
    dbsync.release_context(handle);
    Ok(())
}
