use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client key type.
pub type Key = u32;

/// Version counter of a key. The first accepted write produces version 1.
pub type Version = u64;

/// An immutable value together with the version it was written at.
///
/// Items are never mutated: a later write produces a new item with a higher
/// version that supersedes this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedItem {
    pub value: Option<String>,
    pub version: Version,
}

impl VersionedItem {
    pub fn new(value: impl Into<String>, version: Version) -> Self {
        Self {
            value: Some(value.into()),
            version,
        }
    }

    /// Conflict rule applied wherever records are merged into a store:
    /// `self` replaces `old` unless `old` carries a strictly newer version.
    pub fn supersedes(&self, old: Option<&VersionedItem>) -> bool {
        match old {
            Some(old) => old.version <= self.version,
            None => true,
        }
    }
}

/// Merges `item` into `records` under the conflict rule. Returns whether the
/// stored item changed.
pub fn merge_into(records: &mut HashMap<Key, VersionedItem>, key: Key, item: VersionedItem) -> bool {
    if !item.supersedes(records.get(&key)) {
        return false;
    }
    let changed = records.get(&key) != Some(&item);
    records.insert(key, item);
    changed
}
