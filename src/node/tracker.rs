//! Per-request quorum bookkeeping.
//!
//! Trackers are plain state machines. The coordinator owns them, feeds them
//! votes and acks, and decides what to do once a quorum is reached.

use std::collections::HashSet;

use crate::membership::types::NodeId;
use crate::storage::types::{Key, Version, VersionedItem};

/// Collects read votes until `required` of them arrived.
///
/// The resolution is fixed the moment the quorum is reached. Among equal
/// versions the first vote seen wins. Votes arriving afterwards are counted
/// but never change the outcome.
#[derive(Debug, Clone)]
pub struct ReadTracker {
    key: Key,
    required: usize,
    votes: usize,
    freshest: Option<VersionedItem>,
    resolved: Option<Option<VersionedItem>>,
}

impl ReadTracker {
    pub fn new(key: Key, required: usize) -> Self {
        Self {
            key,
            required,
            votes: 0,
            freshest: None,
            resolved: None,
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Records one vote. `None` means the replica has never seen the key.
    /// Returns whether the quorum has been reached.
    pub fn add_vote(&mut self, vote: Option<VersionedItem>) -> bool {
        self.votes += 1;
        if self.resolved.is_some() {
            return true;
        }

        if let Some(item) = vote {
            let newer = match &self.freshest {
                Some(current) => item.version > current.version,
                None => true,
            };
            if newer {
                self.freshest = Some(item);
            }
        }

        if self.votes >= self.required {
            self.resolved = Some(self.freshest.clone());
        }
        self.quorum_reached()
    }

    pub fn quorum_reached(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn votes(&self) -> usize {
        self.votes
    }

    /// The freshest item among the votes that formed the quorum.
    pub fn latest(&self) -> Option<&VersionedItem> {
        self.resolved.as_ref().and_then(|item| item.as_ref())
    }
}

/// First phase of an update: a read quorum that decides the next version.
#[derive(Debug, Clone)]
pub struct UpdateTracker {
    votes: ReadTracker,
    value: String,
}

impl UpdateTracker {
    pub fn new(key: Key, value: String, required: usize) -> Self {
        Self {
            votes: ReadTracker::new(key, required),
            value,
        }
    }

    pub fn key(&self) -> Key {
        self.votes.key()
    }

    pub fn add_vote(&mut self, vote: Option<VersionedItem>) -> bool {
        self.votes.add_vote(vote)
    }

    pub fn quorum_reached(&self) -> bool {
        self.votes.quorum_reached()
    }

    /// The item to write: the new value one version above the freshest vote.
    /// Only meaningful once [`quorum_reached`](Self::quorum_reached) holds.
    pub fn next_item(&self) -> VersionedItem {
        debug_assert!(self.quorum_reached(), "next_item before the vote quorum");
        let observed: Version = self.votes.latest().map_or(0, |item| item.version);
        VersionedItem::new(self.value.clone(), observed + 1)
    }
}

/// Second phase of an update: counts distinct replicas that stored the item.
#[derive(Debug, Clone)]
pub struct WriteTracker {
    key: Key,
    item: VersionedItem,
    required: usize,
    acks: HashSet<NodeId>,
}

impl WriteTracker {
    pub fn new(key: Key, item: VersionedItem, required: usize) -> Self {
        Self {
            key,
            item,
            required,
            acks: HashSet::new(),
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn item(&self) -> &VersionedItem {
        &self.item
    }

    /// Records an ack from `from`. Duplicate acks from one replica count once.
    /// Returns whether enough replicas acknowledged.
    pub fn add_ack(&mut self, from: NodeId) -> bool {
        self.acks.insert(from);
        self.ack_quorum_reached()
    }

    pub fn ack_quorum_reached(&self) -> bool {
        self.acks.len() >= self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(value: &str, version: Version) -> Option<VersionedItem> {
        Some(VersionedItem::new(value, version))
    }

    #[test]
    fn test_read_waits_for_quorum() {
        let mut tracker = ReadTracker::new(1, 2);

        assert!(!tracker.add_vote(item("a", 1)));
        assert!(tracker.latest().is_none());
        assert!(tracker.add_vote(item("b", 4)));
        assert_eq!(tracker.latest(), item("b", 4).as_ref());
    }

    #[test]
    fn test_read_first_seen_wins_ties() {
        let mut tracker = ReadTracker::new(1, 3);

        tracker.add_vote(item("first", 2));
        tracker.add_vote(item("second", 2));
        tracker.add_vote(item("older", 1));

        assert_eq!(tracker.latest(), item("first", 2).as_ref());
    }

    #[test]
    fn test_read_resolution_frozen_after_quorum() {
        let mut tracker = ReadTracker::new(1, 1);

        assert!(tracker.add_vote(item("v1", 1)));
        assert!(tracker.add_vote(item("v9", 9)));

        assert_eq!(tracker.votes(), 2);
        assert_eq!(tracker.latest(), item("v1", 1).as_ref());
    }

    #[test]
    fn test_read_absent_votes_resolve_to_none() {
        let mut tracker = ReadTracker::new(3, 2);

        tracker.add_vote(None);
        assert!(tracker.add_vote(None));
        assert!(tracker.quorum_reached());
        assert!(tracker.latest().is_none());
    }

    #[test]
    fn test_read_absent_vote_does_not_hide_present_one() {
        let mut tracker = ReadTracker::new(3, 2);

        tracker.add_vote(None);
        tracker.add_vote(item("x", 1));

        assert_eq!(tracker.latest(), item("x", 1).as_ref());
    }

    #[test]
    fn test_update_versions_above_highest_vote() {
        let mut tracker = UpdateTracker::new(5, "new".to_string(), 2);

        assert!(!tracker.add_vote(item("a", 3)));
        assert!(tracker.add_vote(item("b", 7)));

        assert_eq!(tracker.next_item(), VersionedItem::new("new", 8));
    }

    #[test]
    fn test_update_unknown_key_starts_at_version_one() {
        let mut tracker = UpdateTracker::new(5, "first".to_string(), 2);

        tracker.add_vote(None);
        tracker.add_vote(None);

        assert_eq!(tracker.next_item(), VersionedItem::new("first", 1));
    }

    #[test]
    fn test_write_counts_distinct_replicas() {
        let mut tracker = WriteTracker::new(1, VersionedItem::new("v", 1), 2);

        assert!(!tracker.add_ack(NodeId(10)));
        assert!(!tracker.add_ack(NodeId(10)), "Duplicate ack must count once");
        assert!(tracker.add_ack(NodeId(20)));
        assert_eq!(tracker.item(), &VersionedItem::new("v", 1));
    }
}
