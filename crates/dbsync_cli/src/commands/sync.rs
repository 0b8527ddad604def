//! Sync command implementation.

use super::{read_request, CliResult, EventPrinter, Target};
use dbsync_core::{DbSync, SyncRequest};
use std::io;
use std::path::Path;
use tracing::info;

/// Runs the sync command.
pub fn run(target: &Target, request: &Path) -> CliResult<()> {
    let request: SyncRequest = read_request(request)?;
    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;

    let mut printer = EventPrinter::new(io::stdout().lock());
    dbsync.sync_row_data(handle, &request, |e| printer.print(e))?;
    let events = printer.finish()?;
    dbsync.release_context(handle);

    info!(table = %request.table, rows = request.data.len(), events, "sync complete");
    Ok(())
}
