//! RocksDB backend.
//!
//! Geth's Pebble chaindata uses an SSTable format RocksDB can read in
//! read-only mode, so the same backend serves both the source (opened with
//! [`RocksDBBackend::open_read_only`]) and the destination.

use std::{
    fmt::{self, Debug},
    path::{Path, PathBuf},
    sync::Arc,
};

use rocksdb::{
    DBWithThreadMode, IteratorMode, MultiThreaded, Options, ReadOptions, WriteBatch,
};
use tracing::info;

use crate::{
    api::{KeyValueIter, KeyValueReader, SourceStore, StorageBackend, StorageWriteBatch},
    error::StoreError,
};

type DB = DBWithThreadMode<MultiThreaded>;

pub struct RocksDBBackend {
    db: Arc<DB>,
    path: PathBuf,
    read_only: bool,
}

impl Debug for RocksDBBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksDBBackend")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl RocksDBBackend {
    /// Opens (creating if missing) a writable database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(4);
        opts.increase_parallelism(4);

        let db = DB::open(&opts, path)?;
        info!("Opened RocksDB store at {}", path.display());
        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
            read_only: false,
        })
    }

    /// Opens an existing database without taking the write lock.
    ///
    /// # Errors
    /// - If the database cannot be opened (missing, corrupted, incompatible version, etc.)
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.set_disable_auto_compactions(true);
        opts.set_allow_mmap_reads(true);
        opts.set_max_background_jobs(4);

        let db = DB::open_for_read_only(&opts, path, false)?;
        info!("Opened RocksDB store at {} (read-only)", path.display());
        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
            read_only: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }
}

impl KeyValueReader for RocksDBBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?)
    }
}

impl SourceStore for RocksDBBackend {
    fn iter_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<KeyValueIter<'_>, StoreError> {
        let mut read_opts = ReadOptions::default();
        if let Some(lower) = lower {
            read_opts.set_iterate_lower_bound(lower.to_vec());
        }
        if let Some(upper) = upper {
            read_opts.set_iterate_upper_bound(upper.to_vec());
        }
        let iter = self
            .db
            .iterator_opt(IteratorMode::Start, read_opts)
            .map(|entry| {
                entry
                    .map(|(key, value)| (key.into_vec(), value.into_vec()))
                    .map_err(StoreError::from)
            });
        Ok(Box::new(iter))
    }
}

impl StorageBackend for RocksDBBackend {
    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError> {
        self.ensure_writable()?;
        Ok(Box::new(RocksDBWriteBatch {
            db: &self.db,
            batch: WriteBatch::default(),
        }))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.db.flush_wal(true)?;
        self.db.flush()?;
        Ok(())
    }
}

pub struct RocksDBWriteBatch<'a> {
    db: &'a DB,
    batch: WriteBatch,
}

impl StorageWriteBatch for RocksDBWriteBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.batch.put(key, value);
        Ok(())
    }

    fn len(&self) -> usize {
        self.batch.len()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let batch = std::mem::take(&mut self.batch);
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn committed_batch_is_readable_after_reopen() {
        let temp_dir = TempDir::new().expect("temp dir");

        {
            let store = RocksDBBackend::open(temp_dir.path()).expect("open");
            let mut batch = store.begin_write().expect("begin write");
            batch.put(b"h-key", b"header").expect("put");
            batch.put(b"b-key", b"body").expect("put");
            assert_eq!(batch.len(), 2);
            batch.commit().expect("commit");
            assert!(batch.is_empty());
            store.flush().expect("flush");
        }

        let reopened = RocksDBBackend::open_read_only(temp_dir.path()).expect("reopen");
        assert_eq!(
            reopened.get(b"h-key").expect("get"),
            Some(b"header".to_vec())
        );
        assert_eq!(reopened.get(b"missing").expect("get"), None);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let temp_dir = TempDir::new().expect("temp dir");
        drop(RocksDBBackend::open(temp_dir.path()).expect("create"));

        let store = RocksDBBackend::open_read_only(temp_dir.path()).expect("open");
        assert!(matches!(store.begin_write(), Err(StoreError::ReadOnly(_))));
    }

    #[test]
    fn iter_range_applies_bounds() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = RocksDBBackend::open(temp_dir.path()).expect("open");
        for key in [b"a", b"b", b"c", b"d"] {
            store.put(key, b"v").expect("put");
        }

        let keys: Vec<Vec<u8>> = store
            .iter_range(Some(b"b".as_slice()), Some(b"d".as_slice()))
            .expect("iter")
            .map(|entry| entry.expect("entry").0)
            .collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn fails_on_nonexistent_directory() {
        let result = RocksDBBackend::open_read_only("/tmp/nonexistent_chainmig_db_xyz");
        assert!(result.is_err());
    }
}
