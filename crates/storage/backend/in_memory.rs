use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, RwLock},
};

use crate::{
    api::{
        KeyValue, KeyValueIter, KeyValueReader, SourceStore, StorageBackend, StorageWriteBatch,
    },
    error::StoreError,
};

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered in-memory store, usable as either side of a migration.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Entries>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `entries`.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let map = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Copies the full contents out, in key order.
    pub fn snapshot(&self) -> Result<Vec<KeyValue>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::LockError)?;
        Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().map_err(|_| StoreError::LockError)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl KeyValueReader for InMemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::LockError)?;
        Ok(map.get(key).cloned())
    }
}

impl SourceStore for InMemoryBackend {
    fn iter_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<KeyValueIter<'_>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::LockError)?;
        let lower = lower.map_or(Bound::Unbounded, |key| Bound::Included(key.to_vec()));
        let upper = upper.map_or(Bound::Unbounded, |key| Bound::Excluded(key.to_vec()));
        if let (Bound::Included(low), Bound::Excluded(high)) = (&lower, &upper)
            && low >= high
        {
            return Ok(Box::new(std::iter::empty()));
        }
        // The lock is released before iteration; the range is materialized.
        let entries: Vec<KeyValue> = map
            .range((lower, upper))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

impl StorageBackend for InMemoryBackend {
    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError> {
        Ok(Box::new(InMemoryWriteBatch {
            backend: self,
            pending: Vec::new(),
        }))
    }
}

pub struct InMemoryWriteBatch<'a> {
    backend: &'a InMemoryBackend,
    pending: Vec<KeyValue>,
}

impl StorageWriteBatch for InMemoryWriteBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.pending.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut map = self
            .backend
            .inner
            .write()
            .map_err(|_| StoreError::LockError)?;
        for (key, value) in self.pending.drain(..) {
            map.insert(key, value);
        }
        Ok(())
    }
}
