//! Storage abstraction shared by the source and destination sides of a migration.
//!
//! Both sides are flat, ordered key-value spaces. The source is only ever read
//! ([`SourceStore`]); the destination is written through atomic batches
//! ([`StorageBackend`] / [`StorageWriteBatch`]).

pub mod schema;

use std::fmt::Debug;

use crate::error::StoreError;

/// A `(key, value)` pair as yielded by a source iterator.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Lazy ordered sequence of entries. Errors are yielded in-band so a failing
/// iterator can be told apart from an exhausted one.
pub type KeyValueIter<'a> = Box<dyn Iterator<Item = Result<KeyValue, StoreError>> + 'a>;

/// Point lookups, available on every store.
pub trait KeyValueReader: Debug + Send + Sync {
    /// Reads a value for the given key
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if the key does not exist
    /// - `Err(_)` on I/O or database errors
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Checks if a key exists in the database
    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Read-only store the migration scans.
pub trait SourceStore: KeyValueReader {
    /// Iterates keys in ascending byte order within `[lower, upper)`.
    /// `None` leaves that side unbounded.
    fn iter_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<KeyValueIter<'_>, StoreError>;

    fn iter_all(&self) -> Result<KeyValueIter<'_>, StoreError> {
        self.iter_range(None, None)
    }
}

/// Destination store. Writes only become visible through a committed batch.
pub trait StorageBackend: KeyValueReader {
    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError>;

    /// Writes a single key in its own batch.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = self.begin_write()?;
        batch.put(key, value)?;
        batch.commit()
    }

    /// Forces previously committed batches to durable storage.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A set of writes applied atomically on [`commit`](StorageWriteBatch::commit).
///
/// After a successful commit the batch is empty and can be filled again.
/// A failed commit leaves nothing from the batch visible.
pub trait StorageWriteBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Number of staged writes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn commit(&mut self) -> Result<(), StoreError>;
}
