use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use fs4::fs_std::FileExt;
use log::debug;

/// Per-table upload locks. Clearing and reloading the same table from two
/// uploads at once would interleave deletes and inserts, so callers hold the
/// table's guard for the whole load.
#[derive(Debug, Default)]
pub struct TableLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

#[derive(Debug)]
pub struct TableGuard<'a> {
    locks: &'a TableLocks,
    table: String,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn busy(&self) -> MutexGuard<'_, HashSet<String>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until no other upload holds `table`.
    pub fn acquire(&self, table: &str) -> TableGuard<'_> {
        let mut busy = self.busy();
        if busy.contains(table) {
            debug!("Waiting for upload lock on '{table}'");
        }
        while busy.contains(table) {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(table.to_string());
        debug!("Acquired upload lock on '{table}'");
        TableGuard {
            locks: self,
            table: table.to_string(),
        }
    }

    pub fn try_acquire(&self, table: &str) -> Option<TableGuard<'_>> {
        let mut busy = self.busy();
        if !busy.insert(table.to_string()) {
            return None;
        }
        Some(TableGuard {
            locks: self,
            table: table.to_string(),
        })
    }

    pub fn is_locked(&self, table: &str) -> bool {
        self.busy().contains(table)
    }
}

impl Drop for TableGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy().remove(&self.table);
        self.locks.released.notify_all();
        debug!("Released upload lock on '{}'", self.table);
    }
}

/// Advisory lock file next to the database, keyed on the table name. Unlike
/// [`TableLocks`] it also serializes uploads running in separate processes.
/// The lock is released when the value is dropped and the file closed.
#[derive(Debug)]
pub struct TableFileLock {
    path: PathBuf,
    _file: File,
}

impl TableFileLock {
    /// Blocks until no other holder, in this or any other process, has the
    /// lock for `table` on the database at `db`.
    pub fn acquire(db: &Path, table: &str) -> io::Result<Self> {
        let path = lock_path(db, table);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        debug!("Waiting for lock file {path:?}");
        FileExt::lock_exclusive(&file)?;
        debug!("Acquired lock file {path:?}");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TableFileLock {
    fn drop(&mut self) {
        debug!("Released lock file {:?}", self.path);
    }
}

/// `data/trade.db` + `hoja1` -> `data/trade.db.hoja1.lock`.
pub fn lock_path(db: &Path, table: &str) -> PathBuf {
    let table: String = table
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    let mut name = db.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{table}.lock"));
    db.with_file_name(name)
}
