//! File-backed storage engine.

use crate::engine::{MaxRowsPolicy, StorageEngine, UpsertOutcome};
use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, Query};
use crate::memory::{Image, InMemoryEngine};
use crate::schema::{ColumnDef, TableSchema};
use crate::value::{Row, RowKey};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A storage engine persisted to a single JSON file.
///
/// The working set lives in an [`InMemoryEngine`]; [`StorageEngine::flush`]
/// writes it out with the write-then-rename pattern, so the database file
/// always holds the last complete flush. Dropping the engine flushes pending
/// writes.
///
/// Next to the database file the engine keeps `<file>.lock`, holding an
/// advisory exclusive lock for as long as the engine lives. A second engine
/// on the same path fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use dbsync_storage::{FileEngine, MaxRowsPolicy, StorageEngine};
/// use std::path::Path;
///
/// let engine = FileEngine::open(Path::new("inventory.db"), MaxRowsPolicy::Reject).unwrap();
/// engine.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileEngine {
    path: PathBuf,
    memory: InMemoryEngine,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
    _lock_file: File,
}

impl FileEngine {
    /// Opens the database at `path`, loading its contents if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another engine holds the file, or
    /// [`StorageError::Corrupted`] if the contents cannot be decoded.
    pub fn open(path: &Path, policy: MaxRowsPolicy) -> StorageResult<Self> {
        let lock_file = Self::lock(path)?;

        let memory = match fs::read(path) {
            Ok(data) if !data.is_empty() => {
                let image: Image = serde_json::from_slice(&data).map_err(|e| {
                    StorageError::Corrupted(format!("{}: {e}", path.display()))
                })?;
                InMemoryEngine::from_image(image, policy)?
            }
            Ok(_) => InMemoryEngine::with_policy(policy),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                InMemoryEngine::with_policy(policy)
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            tables = memory.table_names().len(),
            "opened database file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            memory,
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Opens the database at `path`, discarding whatever it held.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another engine holds the file, or
    /// an I/O error if the empty database cannot be written.
    pub fn create(path: &Path, policy: MaxRowsPolicy) -> StorageResult<Self> {
        let lock_file = Self::lock(path)?;
        let engine = Self {
            path: path.to_path_buf(),
            memory: InMemoryEngine::with_policy(policy),
            dirty: AtomicBool::new(true),
            flush_lock: Mutex::new(()),
            _lock_file: lock_file,
        };
        engine.flush()?;
        Ok(engine)
    }

    /// Returns the path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(path: &Path) -> StorageResult<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }
        Ok(lock_file)
    }

    /// Writes the working set to a temp file, syncs it, then renames it over
    /// the database file.
    fn write_image(&self) -> StorageResult<()> {
        let data = serde_json::to_vec(&self.memory.to_image())?;
        let temp_path = sibling(&self.path, "tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), bytes = data.len(), "flushed database file");
        Ok(())
    }

    fn touch<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        if result.is_ok() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

impl StorageEngine for FileEngine {
    fn create_table(&self, schema: TableSchema) -> StorageResult<()> {
        self.touch(self.memory.create_table(schema))
    }

    fn add_column(&self, table: &str, column: ColumnDef) -> StorageResult<()> {
        self.touch(self.memory.add_column(table, column))
    }

    fn table_schema(&self, table: &str) -> StorageResult<TableSchema> {
        self.memory.table_schema(table)
    }

    fn table_names(&self) -> Vec<String> {
        self.memory.table_names()
    }

    fn bulk_insert(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        self.touch(self.memory.bulk_insert(table, rows))
    }

    fn update_or_insert_row(&self, table: &str, row: &Row) -> StorageResult<UpsertOutcome> {
        self.touch(self.memory.update_or_insert_row(table, row))
    }

    fn get_row(&self, table: &str, key: &RowKey) -> StorageResult<Option<Row>> {
        self.memory.get_row(table, key)
    }

    fn keys(&self, table: &str) -> StorageResult<Vec<RowKey>> {
        self.memory.keys(table)
    }

    fn select(&self, table: &str, query: &Query) -> StorageResult<Vec<Row>> {
        self.memory.select(table, query)
    }

    fn delete_rows(&self, table: &str, filter: &Filter) -> StorageResult<Vec<Row>> {
        self.touch(self.memory.delete_rows(table, filter))
    }

    fn delete_keys(&self, table: &str, keys: &[RowKey]) -> StorageResult<Vec<Row>> {
        self.touch(self.memory.delete_keys(table, keys))
    }

    fn count_rows(&self, table: &str) -> StorageResult<usize> {
        self.memory.count_rows(table)
    }

    fn set_max_rows(&self, table: &str, limit: Option<usize>) -> StorageResult<()> {
        self.touch(self.memory.set_max_rows(table, limit))
    }

    fn schema_version(&self) -> u32 {
        self.memory.schema_version()
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        self.touch(self.memory.set_schema_version(version))
    }

    fn flush(&self) -> StorageResult<()> {
        let _guard = self.flush_lock.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.write_image();
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }
}

impl Drop for FileEngine {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush database file on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::execute_script;
    use crate::value::Value;
    use tempfile::tempdir;

    const SCHEMA: &str = "CREATE TABLE ports (port INTEGER, proto TEXT, PRIMARY KEY (port, proto));";

    fn port(port: i64, proto: &str) -> Row {
        Row::new().with("port", port).with("proto", proto)
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let engine = FileEngine::create(&path, MaxRowsPolicy::Reject).unwrap();
        assert!(engine.table_names().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn file_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let engine = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap();
            execute_script(&engine, SCHEMA).unwrap();
            engine
                .bulk_insert("ports", &[port(22, "tcp"), port(53, "udp")])
                .unwrap();
            engine.set_schema_version(2).unwrap();
        }

        let engine = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap();
        assert_eq!(engine.schema_version(), 2);
        assert_eq!(engine.count_rows("ports").unwrap(), 2);
        let key = RowKey(vec![Value::Integer(22), Value::Text("tcp".into())]);
        assert!(engine.get_row("ports", &key).unwrap().is_some());
    }

    #[test]
    fn file_create_discards_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let engine = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap();
            execute_script(&engine, SCHEMA).unwrap();
        }

        let engine = FileEngine::create(&path, MaxRowsPolicy::Reject).unwrap();
        assert!(engine.table_names().is_empty());
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let _first = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap();
        let err = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }

    #[test]
    fn file_corrupted_contents_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        fs::write(&path, b"{not json").unwrap();

        let err = FileEngine::open(&path, MaxRowsPolicy::Reject).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn file_flush_is_noop_when_clean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let engine = FileEngine::create(&path, MaxRowsPolicy::Reject).unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        engine.flush().unwrap();
        let after = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }
}
