//! Key-value persistence used by the development emulator.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Error;

/// Byte-keyed storage backend.
///
/// Implementations must be safe to share between threads; the emulator calls
/// them while holding its own lock, so they never see concurrent writes from
/// the same emulator.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Every entry whose key starts with `prefix`, in key order
    fn dump(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;
}

/// In-memory [`KeyValueStore`]. Cloning is not supported; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn dump(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// [`KeyValueStore`] backed by a sled database on disk.
///
/// Every `put` is flushed before it returns, so a reopened store sees all
/// writes acknowledged before the process stopped.
#[cfg(feature = "sled")]
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

#[cfg(feature = "sled")]
impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("entries", &self.db.len())
            .finish()
    }
}

#[cfg(feature = "sled")]
impl SledStore {
    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the database cannot be opened, for example
    /// because another process holds it.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            Error::store(format!("failed to open sled db at {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), entries = db.len(), "opened sled store");
        Ok(Self { db })
    }

    /// Wraps an already opened database
    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

#[cfg(feature = "sled")]
impl KeyValueStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.db
            .get(key)
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(|e| Error::store(format!("sled get: {e}")))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.db
            .insert(key, value)
            .map_err(|e| Error::store(format!("sled insert: {e}")))?;
        self.db
            .flush()
            .map_err(|e| Error::store(format!("sled flush: {e}")))?;
        Ok(())
    }

    fn dump(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.db
            .scan_prefix(prefix)
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| Error::store(format!("sled scan: {e}")))
            })
            .collect()
    }
}
