use std::path::{Path, PathBuf};

use crate::{
    config::DatabaseOptions,
    core::{Bytes, KeyRef},
    data::DataFile,
    error::{ChainDbError, ChainDbResult},
    index::IndexFile,
    utils::t,
};

const INDEX_SUFFIX: &str = ".idx";
const DATA_SUFFIX: &str = ".dat";

/// Disk resident key value store.
///
/// A store is backed by two artifacts named after it: `<name>.idx`
/// (hash bucket table plus chained index records) and `<name>.dat`
/// (append-only value log with tombstones). An open instance owns
/// both file handles exclusively for its lifetime; concurrent access
/// must be serialized by the caller.
///
/// There is no atomicity across the two artifacts. A crash between a
/// value append and its index link leaves an orphaned value that only
/// the sequential scan can see; a crash inside `remove` can leave an
/// untombstoned value that the scan still yields.
pub struct ChainDb {
    index: IndexFile,
    data: DataFile,
}

impl ChainDb {
    /// Creates the two artifacts of a fresh store.
    ///
    /// The bucket table capacity comes from
    /// [DatabaseOptions::bucket_count] and is persisted in the index
    /// artifact header. Fails with [ChainDbError::StoreExists] if
    /// either artifact is already on disk.
    pub fn create<P: AsRef<Path>>(name: P, options: Option<DatabaseOptions>) -> ChainDbResult<()> {
        let conf = options.unwrap_or_else(|| DatabaseOptions::builder().build());
        let (idx_path, dat_path) = Self::artifact_paths(name.as_ref());
        if idx_path.exists() || dat_path.exists() {
            return Err(ChainDbError::StoreExists(name.as_ref().to_path_buf()));
        }
        debug!("creating store at: {}", name.as_ref().display());
        t!("IndexFile::create", IndexFile::create(&idx_path, conf.bucket_count))?;
        t!("DataFile::create", DataFile::create(&dat_path))?;
        Ok(())
    }

    /// Opens an existing store, taking exclusive ownership of both
    /// artifact handles.
    ///
    /// The bucket table capacity is read back from the index artifact
    /// header; the `bucket_count` option is ignored here. Fails with
    /// [ChainDbError::StoreNotFound] if either artifact is missing.
    pub fn open<P: AsRef<Path>>(name: P, options: Option<DatabaseOptions>) -> ChainDbResult<ChainDb> {
        let conf = options.unwrap_or_else(|| DatabaseOptions::builder().build());
        let (idx_path, dat_path) = Self::artifact_paths(name.as_ref());
        if !idx_path.exists() || !dat_path.exists() {
            return Err(ChainDbError::StoreNotFound(name.as_ref().to_path_buf()));
        }
        let index = t!("IndexFile::open", IndexFile::open(&idx_path, conf))?;
        let data = t!("DataFile::open", DataFile::open(&dat_path, conf))?;
        Ok(ChainDb { index, data })
    }

    /// Persists a key/value association.
    ///
    /// Inserting a key that is already live is a silent no-op: the
    /// stored value is kept and no error is raised. Use
    /// [ChainDb::replace] to overwrite.
    pub fn insert(&mut self, key: KeyRef, value: &[u8]) -> ChainDbResult<()> {
        trace!("ChainDb::insert");
        if self.index.lookup(key)?.is_some() {
            return Ok(());
        }
        // the append lands before the index link; a crash in between
        // orphans the value
        let data_offset = t!("DataFile::append", self.data.append(value))?;
        t!("IndexFile::insert", self.index.insert(key, data_offset))
    }

    /// Removes a key, tombstoning its value. Removing an absent key
    /// is a no-op.
    ///
    /// The index record is unlinked first and left behind as dead
    /// bytes; the value keeps its storage and only its tombstone flag
    /// is flipped.
    pub fn remove(&mut self, key: KeyRef) -> ChainDbResult<()> {
        trace!("ChainDb::remove");
        if let Some(data_offset) = t!("IndexFile::remove", self.index.remove(key))? {
            t!("DataFile::mark_tombstone", self.data.mark_tombstone(data_offset))?;
        }
        Ok(())
    }

    /// Looks up the value stored for `key`.
    pub fn fetch(&mut self, key: KeyRef) -> ChainDbResult<Option<Bytes>> {
        trace!("ChainDb::fetch");
        match self.index.lookup(key)? {
            Some(data_offset) => Ok(Some(self.data.read(data_offset)?)),
            None => Ok(None),
        }
    }

    /// Replaces the value stored for `key`.
    ///
    /// Implemented as remove-then-insert: a fresh record is appended
    /// to the value log and the prior one becomes an unreachable
    /// tombstone. The key need not be live beforehand.
    pub fn replace(&mut self, key: KeyRef, value: &[u8]) -> ChainDbResult<()> {
        trace!("ChainDb::replace");
        self.remove(key)?;
        self.insert(key, value)
    }

    /// Resets the full-table scan cursor to the start of the value
    /// log.
    pub fn rewind(&mut self) {
        self.data.rewind();
    }

    /// Returns the next live value under the scan cursor, or `None`
    /// once the log is exhausted.
    ///
    /// The scan walks the value log directly and ignores the hash
    /// index; ordering is unspecified.
    pub fn next_record(&mut self) -> ChainDbResult<Option<Bytes>> {
        self.data.next_record()
    }

    /// Flushes both artifacts to disk.
    pub fn sync(&mut self) -> ChainDbResult<()> {
        t!("IndexFile::sync", self.index.sync())?;
        t!("DataFile::sync", self.data.sync())
    }

    /// Syncs and releases both artifact handles.
    pub fn close(mut self) -> ChainDbResult<()> {
        debug!("closing store");
        self.sync()
    }

    fn artifact_paths(name: &Path) -> (PathBuf, PathBuf) {
        let mut idx = name.as_os_str().to_os_string();
        idx.push(INDEX_SUFFIX);
        let mut dat = name.as_os_str().to_os_string();
        dat.push(DATA_SUFFIX);
        (PathBuf::from(idx), PathBuf::from(dat))
    }
}

impl Drop for ChainDb {
    fn drop(&mut self) {
        t!("ChainDb::sync", self.sync()).ok();
    }
}
