use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use super::manager::{StorageError, StorageManager};
use super::types::{Key, VersionedItem};

/// Volatile record store.
///
/// Clones share the same records, so a test can keep one clone to "restart"
/// a node on the data it had before a simulated crash, or to inspect what a
/// node holds without going through the protocol.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<DashMap<Key, VersionedItem>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<Key, VersionedItem> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn merge(&self, key: Key, item: VersionedItem) {
        let mut entry = self.records.entry(key).or_insert_with(|| item.clone());
        if item.supersedes(Some(entry.value())) {
            *entry.value_mut() = item;
        }
    }
}

impl StorageManager for MemoryStorage {
    fn read_one(&self, key: Key) -> Result<Option<VersionedItem>, StorageError> {
        Ok(self.records.get(&key).map(|item| item.value().clone()))
    }

    fn read_all(&self) -> Result<HashMap<Key, VersionedItem>, StorageError> {
        Ok(self.snapshot())
    }

    fn append_one(&mut self, key: Key, item: VersionedItem) -> Result<(), StorageError> {
        self.merge(key, item);
        Ok(())
    }

    fn append_many(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        for (key, item) in records {
            self.merge(key, item);
        }
        Ok(())
    }

    fn overwrite_all(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        self.records.clear();
        for (key, item) in records {
            self.records.insert(key, item);
        }
        Ok(())
    }

    fn remove_many(&mut self, keys: &[Key]) -> Result<(), StorageError> {
        for key in keys {
            self.records.remove(key);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.records.clear();
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), StorageError> {
        self.clear()
    }
}
