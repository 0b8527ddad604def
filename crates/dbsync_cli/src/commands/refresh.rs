//! Refresh command implementation.

use super::{read_request, CliResult, EventPrinter, Target};
use dbsync_core::{DbSync, SnapshotRequest};
use std::io;
use std::path::Path;
use tracing::info;

/// Runs the refresh command.
pub fn run(target: &Target, request: &Path) -> CliResult<()> {
    let request: SnapshotRequest = read_request(request)?;
    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;

    let mut printer = EventPrinter::new(io::stdout().lock());
    dbsync.refresh_snapshot(handle, &request, |e| printer.print(e))?;
    let events = printer.finish()?;
    dbsync.release_context(handle);

    info!(table = %request.table, events, "refresh complete");
    Ok(())
}
