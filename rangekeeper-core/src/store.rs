//! Lock-guarded transactions over the persisted reserved space.
//!
//! A [`Transaction`] holds the host-wide advisory lock for its whole
//! lifetime. It loads the reserved space on begin, stages every change in
//! memory and rewrites the touched documents in full on
//! [`commit`](Transaction::commit). Dropping a transaction without
//! committing discards its changes and releases the lock.
//!
//! Besides the reserved space, a transaction can read and write any number
//! of related JSON documents under the state directory, so that changes
//! spanning several documents appear together.

use crate::allocator::{self, Allocation};
use crate::config::{CommitMode, EngineConfig, is_relative_document};
use crate::error::{RangeError, Result};
use crate::interval_set::ReservedSpace;
use crate::lock::FileLock;
use crate::range::UnitRange;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Entry point to the persisted reservation state.
#[derive(Debug, Clone)]
pub struct Store {
    config: EngineConfig,
}

impl Store {
    /// Open a store, creating its state directory if needed.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.state_dir).map_err(|e| {
            RangeError::io(&config.state_dir, "Failed to create state directory", e)
        })?;
        Ok(Self { config })
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Acquire the lock and load the reserved space.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let lock = FileLock::acquire(self.config.lock_path(), self.config.lock_timeout())?;
        let reserved = self.load_reserved()?;
        tracing::debug!(
            ranges = reserved.len(),
            free = reserved.free_units(),
            "Transaction started"
        );
        Ok(Transaction {
            store: self,
            _lock: lock,
            reserved,
            reserved_dirty: false,
            staged: BTreeMap::new(),
            committed: false,
        })
    }

    /// Run `f` inside a transaction, committing on `Ok` and aborting on `Err`.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut txn = self.begin()?;
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Run `f` against a consistent snapshot; nothing is written.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let txn = self.begin()?;
        f(&txn)
    }

    fn load_reserved(&self) -> Result<ReservedSpace> {
        let path = self.config.reserved_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(ReservedSpace::new(self.config.universe));
        };
        let ranges: Vec<UnitRange> =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e.to_string()))?;
        ReservedSpace::from_ranges(self.config.universe, ranges)
            .map_err(|violation| corrupt(&path, violation.to_string()))
    }

    fn document_path(&self, name: &str) -> Result<PathBuf> {
        if !is_relative_document(name)
            || name == self.config.reserved_document
            || name == self.config.lock_file
        {
            return Err(RangeError::InvalidDocumentName {
                name: name.to_string(),
            });
        }
        Ok(self.config.state_dir.join(name))
    }
}

/// A staged change to a document.
#[derive(Debug)]
enum Staged {
    Write(Vec<u8>),
    Remove,
}

/// One lock-guarded load, mutate, commit cycle.
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s Store,
    _lock: FileLock,
    reserved: ReservedSpace,
    reserved_dirty: bool,
    staged: BTreeMap<String, Staged>,
    committed: bool,
}

impl Transaction<'_> {
    /// The reserved space as seen by this transaction.
    pub fn reserved(&self) -> &ReservedSpace {
        &self.reserved
    }

    /// The configuration of the owning store.
    pub fn config(&self) -> &EngineConfig {
        &self.store.config
    }

    /// Allocate `count` free units and reserve them.
    pub fn allocate(&mut self, count: u32) -> Result<Allocation> {
        let allocation = allocator::allocate(&self.reserved, count)?;
        self.reserved.insert_all(allocation.ranges())?;
        self.reserved_dirty = true;
        tracing::info!(
            count,
            primary = allocation.primary,
            spares = ?allocation.spares,
            "Allocated and reserved units"
        );
        Ok(allocation)
    }

    /// Reserve a batch of ranges, all or nothing.
    pub fn reserve(&mut self, ranges: &[UnitRange]) -> Result<()> {
        self.reserved.insert_all(ranges.iter().copied())?;
        self.reserved_dirty = true;
        tracing::info!(ranges = ?ranges, "Reserved ranges");
        Ok(())
    }

    /// Release a batch of fully reserved ranges, all or nothing.
    pub fn release(&mut self, ranges: &[UnitRange]) -> Result<()> {
        self.reserved.remove_all(ranges.iter().copied())?;
        self.reserved_dirty = true;
        tracing::info!(ranges = ?ranges, "Released ranges");
        Ok(())
    }

    /// Release whatever part of each range is still reserved.
    ///
    /// Units that are already free are skipped with a warning. Returns the
    /// ranges that were not fully reserved.
    pub fn release_lenient(&mut self, ranges: &[UnitRange]) -> Vec<UnitRange> {
        let mut partial = Vec::new();
        for &range in ranges {
            if !self.reserved.covers(range) {
                tracing::warn!(range = %range, "Releasing range that is not fully reserved");
                partial.push(range);
            }
            self.reserved.subtract(range);
        }
        self.reserved_dirty = true;
        tracing::info!(ranges = ?ranges, "Released ranges");
        partial
    }

    /// Read a JSON document, seeing changes staged in this transaction.
    ///
    /// Returns `None` if the document does not exist.
    pub fn read_document<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.store.document_path(name)?;
        let bytes = match self.staged.get(name) {
            Some(Staged::Write(bytes)) => Some(bytes.clone()),
            Some(Staged::Remove) => None,
            None => read_optional(&path)?,
        };
        bytes
            .map(|bytes| serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e.to_string())))
            .transpose()
    }

    /// Stage a full rewrite of a JSON document.
    pub fn write_document<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.store.document_path(name)?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| RangeError::Serialization(e.to_string()))?;
        self.staged.insert(name.to_string(), Staged::Write(bytes));
        Ok(())
    }

    /// Stage removal of a document. Removing a missing document is a no-op.
    pub fn remove_document(&mut self, name: &str) -> Result<()> {
        self.store.document_path(name)?;
        self.staged.insert(name.to_string(), Staged::Remove);
        Ok(())
    }

    /// Write all staged documents, then release the lock.
    pub fn commit(mut self) -> Result<()> {
        let mode = self.store.config.commit_mode;
        let staged = std::mem::take(&mut self.staged);

        for (name, change) in &staged {
            if let Staged::Write(bytes) = change {
                write_document(&self.store.document_path(name)?, bytes, mode)?;
            }
        }

        if self.reserved_dirty {
            let bytes = serde_json::to_vec(self.reserved.ranges())
                .map_err(|e| RangeError::Serialization(e.to_string()))?;
            write_document(&self.store.config.reserved_path(), &bytes, mode)?;
        }

        for (name, change) in &staged {
            if let Staged::Remove = change {
                remove_document(&self.store.document_path(name)?)?;
            }
        }

        self.committed = true;
        tracing::debug!(
            documents = staged.len(),
            reserved_written = self.reserved_dirty,
            "Transaction committed"
        );
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && (self.reserved_dirty || !self.staged.is_empty()) {
            tracing::warn!(
                staged_documents = self.staged.len(),
                reserved_changed = self.reserved_dirty,
                "Transaction aborted, discarding staged changes"
            );
        }
    }
}

fn corrupt(path: &Path, cause: String) -> RangeError {
    tracing::error!(path = %path.display(), %cause, "Corrupt persisted state");
    RangeError::CorruptState {
        path: path.to_path_buf(),
        cause,
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RangeError::io(path, "Failed to read document", e)),
    }
}

fn write_document(path: &Path, bytes: &[u8], mode: CommitMode) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RangeError::io(parent, "Failed to create document directory", e))?;
    }

    match mode {
        CommitMode::AtomicRename => {
            let mut temp_name = path.as_os_str().to_os_string();
            temp_name.push(".tmp");
            let temp_path = PathBuf::from(temp_name);

            let mut file = File::create(&temp_path)
                .map_err(|e| RangeError::io(&temp_path, "Failed to create temp file", e))?;
            file.write_all(bytes)
                .map_err(|e| RangeError::io(&temp_path, "Failed to write document", e))?;
            file.sync_all()
                .map_err(|e| RangeError::io(&temp_path, "Failed to sync to disk", e))?;

            // Rename is atomic on most filesystems
            fs::rename(&temp_path, path)
                .map_err(|e| RangeError::io(path, "Failed to rename temp file", e))?;
        }
        CommitMode::Truncate => {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .map_err(|e| RangeError::io(path, "Failed to open document", e))?;
            file.write_all(bytes)
                .map_err(|e| RangeError::io(path, "Failed to write document", e))?;
            file.sync_data()
                .map_err(|e| RangeError::io(path, "Failed to sync to disk", e))?;
        }
    }

    tracing::trace!(path = %path.display(), bytes = bytes.len(), "Wrote document");
    Ok(())
}

fn remove_document(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RangeError::io(path, "Failed to remove document", e)),
    }
    // Drop the parent directory if this was its last document.
    if let Some(parent) = path.parent() {
        match fs::remove_dir(parent) {
            Ok(()) => tracing::trace!(path = %parent.display(), "Removed empty directory"),
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {}
            Err(e) => tracing::trace!(
                path = %parent.display(),
                error = %e,
                "Failed to remove document directory"
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Universe;
    use tempfile::tempdir;

    fn r(lo: u32, hi: u32) -> UnitRange {
        UnitRange::new(lo, hi).unwrap()
    }

    fn open(dir: &Path) -> Store {
        let config = EngineConfig::default()
            .with_state_dir(dir)
            .with_universe(Universe::new(1, 101).unwrap());
        Store::open(config).unwrap()
    }

    #[test]
    fn missing_document_loads_empty_space() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let txn = store.begin().unwrap();
        assert!(txn.reserved().is_empty());
        assert_eq!(txn.reserved().free_units(), 100);
    }

    #[test]
    fn committed_changes_are_persisted_as_pairs() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        store
            .transact(|txn| txn.reserve(&[r(1, 3), r(10, 12)]))
            .unwrap();

        let json = fs::read_to_string(dir.path().join("reserved.json")).unwrap();
        assert_eq!(json, "[[1,3],[10,12]]");
        assert!(!dir.path().join("reserved.json.tmp").exists());

        let ranges = store.read(|txn| Ok(txn.reserved().ranges().to_vec())).unwrap();
        assert_eq!(ranges, vec![r(1, 3), r(10, 12)]);
    }

    #[test]
    fn failed_closure_discards_changes() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.transact(|txn| txn.reserve(&[r(5, 5)])).unwrap();

        let err = store
            .transact(|txn| {
                txn.reserve(&[r(20, 30)])?;
                txn.reserve(&[r(5, 6)])
            })
            .unwrap_err();
        assert_eq!(err.code(), "E101");

        let ranges = store.read(|txn| Ok(txn.reserved().ranges().to_vec())).unwrap();
        assert_eq!(ranges, vec![r(5, 5)]);
    }

    #[test]
    fn truncate_mode_rewrites_in_place() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default()
            .with_state_dir(dir.path())
            .with_universe(Universe::new(1, 101).unwrap())
            .with_commit_mode(CommitMode::Truncate);
        let store = Store::open(config).unwrap();

        store.transact(|txn| txn.reserve(&[r(1, 50)])).unwrap();
        store.transact(|txn| txn.release(&[r(1, 50)])).unwrap();

        let json = fs::read_to_string(dir.path().join("reserved.json")).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn corrupt_documents_fail_fast() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let path = dir.path().join("reserved.json");

        for bad in ["", "{}", "[[3,1]]", "[[1,5],[4,8]]", "[[1,4],[5,8]]", "[[0,3]]"] {
            fs::write(&path, bad).unwrap();
            let err = store.begin().unwrap_err();
            assert_eq!(err.code(), "E301", "content {bad:?}");
        }
    }

    #[test]
    fn documents_see_staged_changes() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.read_document::<Vec<u32>>("a/b.json").unwrap(), None);
        txn.write_document("a/b.json", &vec![1u32, 2]).unwrap();
        assert_eq!(
            txn.read_document::<Vec<u32>>("a/b.json").unwrap(),
            Some(vec![1, 2])
        );
        assert!(!dir.path().join("a/b.json").exists());
        txn.commit().unwrap();
        assert!(dir.path().join("a/b.json").exists());

        let mut txn = store.begin().unwrap();
        txn.remove_document("a/b.json").unwrap();
        assert_eq!(txn.read_document::<Vec<u32>>("a/b.json").unwrap(), None);
        txn.commit().unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn lenient_release_skips_free_units() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.transact(|txn| txn.reserve(&[r(1, 10)])).unwrap();

        let partial = store
            .transact(|txn| Ok(txn.release_lenient(&[r(2, 3), r(8, 15), r(50, 50)])))
            .unwrap();
        assert_eq!(partial, vec![r(8, 15), r(50, 50)]);

        let ranges = store.read(|txn| Ok(txn.reserved().ranges().to_vec())).unwrap();
        assert_eq!(ranges, vec![r(1, 1), r(4, 7)]);
    }

    #[test]
    fn removing_one_of_several_documents_keeps_directory() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store
            .transact(|txn| {
                txn.write_document("a/one.json", &1u32)?;
                txn.write_document("a/two.json", &2u32)
            })
            .unwrap();

        store.transact(|txn| txn.remove_document("a/one.json")).unwrap();
        assert!(dir.path().join("a/two.json").exists());

        store.transact(|txn| txn.remove_document("a/two.json")).unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn reserved_and_lock_files_are_not_documents() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut txn = store.begin().unwrap();
        for name in ["reserved.json", "lock.lock", "../x.json", "/abs.json"] {
            let err = txn.write_document(name, &1u32).unwrap_err();
            assert_eq!(err.code(), "E303", "name {name}");
        }
    }

    #[test]
    fn allocate_reserves_within_transaction() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.transact(|txn| txn.reserve(&[r(1, 5)])).unwrap();

        let allocation = store.transact(|txn| txn.allocate(3)).unwrap();
        assert_eq!(allocation.primary, 6);
        assert_eq!(allocation.spares, vec![r(7, 8)]);

        let ranges = store.read(|txn| Ok(txn.reserved().ranges().to_vec())).unwrap();
        assert_eq!(ranges, vec![r(1, 8)]);
    }
}
