use std::collections::HashMap;

use thiserror::Error;

use super::types::{Key, VersionedItem};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The persistent record store owned by one node.
///
/// Both `append_*` operations apply the version conflict rule, so replaying
/// them is harmless. The coordinator never retries a failed call.
pub trait StorageManager: Send + 'static {
    fn read_one(&self, key: Key) -> Result<Option<VersionedItem>, StorageError>;

    fn read_all(&self) -> Result<HashMap<Key, VersionedItem>, StorageError>;

    fn append_one(&mut self, key: Key, item: VersionedItem) -> Result<(), StorageError>;

    fn append_many(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError>;

    /// Replaces the whole store with `records`.
    fn overwrite_all(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError>;

    fn remove_many(&mut self, keys: &[Key]) -> Result<(), StorageError>;

    fn clear(&mut self) -> Result<(), StorageError>;

    /// Deletes the backing storage. Used once a node has left the ring.
    fn destroy(&mut self) -> Result<(), StorageError>;
}

impl<S: StorageManager + ?Sized> StorageManager for Box<S> {
    fn read_one(&self, key: Key) -> Result<Option<VersionedItem>, StorageError> {
        (**self).read_one(key)
    }

    fn read_all(&self) -> Result<HashMap<Key, VersionedItem>, StorageError> {
        (**self).read_all()
    }

    fn append_one(&mut self, key: Key, item: VersionedItem) -> Result<(), StorageError> {
        (**self).append_one(key, item)
    }

    fn append_many(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        (**self).append_many(records)
    }

    fn overwrite_all(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        (**self).overwrite_all(records)
    }

    fn remove_many(&mut self, keys: &[Key]) -> Result<(), StorageError> {
        (**self).remove_many(keys)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }

    fn destroy(&mut self) -> Result<(), StorageError> {
        (**self).destroy()
    }
}
