//! Delete command implementation.

use super::{read_request, CliResult, Target};
use dbsync_core::{DbSync, DeleteRequest};
use std::path::Path;

/// Runs the delete command.
pub fn run(target: &Target, request: &Path) -> CliResult<()> {
    let request: DeleteRequest = read_request(request)?;
    let dbsync = DbSync::new();
    let handle = target.open(&dbsync)?;
    let removed = dbsync.delete_rows_data(handle, &request)?;
    dbsync.release_context(handle);

    println!("Deleted {removed} row(s) from {}", request.table);
    Ok(())
}
