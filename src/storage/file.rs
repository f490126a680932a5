use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::membership::types::NodeId;

use super::manager::{StorageError, StorageManager};
use super::types::{Key, VersionedItem, merge_into};

/// Record store persisted as one JSON document per node.
///
/// Every mutation rewrites the document through a temporary file and an
/// atomic rename, so a crash leaves either the old or the new document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) the store of `node_id` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, node_id: NodeId) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let storage = Self {
            path: dir.join(format!("node-{}.json", node_id)),
        };
        if !storage.path.exists() {
            storage.persist(&HashMap::new())?;
        }

        tracing::debug!("Opened storage at {}", storage.path.display());
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<Key, VersionedItem>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn persist(&self, records: &HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        // sorted output keeps the document diffable
        let ordered: BTreeMap<&Key, &VersionedItem> = records.iter().collect();
        let encoded = serde_json::to_vec_pretty(&ordered)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageManager for FileStorage {
    fn read_one(&self, key: Key) -> Result<Option<VersionedItem>, StorageError> {
        Ok(self.load()?.remove(&key))
    }

    fn read_all(&self) -> Result<HashMap<Key, VersionedItem>, StorageError> {
        self.load()
    }

    fn append_one(&mut self, key: Key, item: VersionedItem) -> Result<(), StorageError> {
        let mut records = self.load()?;
        if merge_into(&mut records, key, item) {
            self.persist(&records)?;
        }
        Ok(())
    }

    fn append_many(&mut self, incoming: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        let mut records = self.load()?;
        let mut changed = false;
        for (key, item) in incoming {
            changed |= merge_into(&mut records, key, item);
        }
        if changed {
            self.persist(&records)?;
        }
        Ok(())
    }

    fn overwrite_all(&mut self, records: HashMap<Key, VersionedItem>) -> Result<(), StorageError> {
        self.persist(&records)
    }

    fn remove_many(&mut self, keys: &[Key]) -> Result<(), StorageError> {
        let mut records = self.load()?;
        let before = records.len();
        for key in keys {
            records.remove(key);
        }
        if records.len() != before {
            self.persist(&records)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.persist(&HashMap::new())
    }

    fn destroy(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
