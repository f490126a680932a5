use std::collections::BTreeMap;

use super::placement;
use super::types::{NodeHandle, NodeId, RingPosition, hash_position};
use crate::storage::types::Key;

/// Ring position of a client key.
pub fn key_position(key: Key) -> RingPosition {
    hash_position(&key.to_string())
}

/// The membership table of one node.
///
/// Maps every known member, including the local node, to its current
/// transport handle. Owned by the node's message loop and never shared.
#[derive(Debug, Clone)]
pub struct Ring {
    local_id: NodeId,
    replication: usize,
    members: BTreeMap<NodeId, NodeHandle>,
}

impl Ring {
    pub fn new(local_id: NodeId, local_handle: NodeHandle, replication: usize) -> Self {
        let mut members = BTreeMap::new();
        members.insert(local_id, local_handle);

        Self {
            local_id,
            replication,
            members,
        }
    }

    pub fn add_member(&mut self, id: NodeId, handle: NodeHandle) {
        self.members.insert(id, handle);
    }

    pub fn add_members(&mut self, members: impl IntoIterator<Item = (NodeId, NodeHandle)>) {
        self.members.extend(members);
    }

    pub fn remove_member(&mut self, id: NodeId) -> Option<NodeHandle> {
        self.members.remove(&id)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.members.keys().copied().collect()
    }

    pub fn members(&self) -> BTreeMap<NodeId, NodeHandle> {
        self.members.clone()
    }

    /// Direct lookup. Callers only ask for members they know to exist.
    pub fn handle_for(&self, id: NodeId) -> Option<NodeHandle> {
        self.members.get(&id).copied()
    }

    /// Every member except the local node.
    pub fn peers(&self) -> impl Iterator<Item = (NodeId, NodeHandle)> + '_ {
        let local_id = self.local_id;
        self.members
            .iter()
            .filter(move |(id, _)| **id != local_id)
            .map(|(id, handle)| (*id, *handle))
    }

    pub fn responsible_for_key(&self, key: Key) -> Vec<NodeId> {
        placement::responsible_nodes(key_position(key), self.replication, &self.member_ids())
    }

    pub fn is_responsible_for(&self, key: Key) -> bool {
        self.responsible_for_key(key).contains(&self.local_id)
    }

    pub fn next_in_ring(&self) -> NodeId {
        placement::next_in_ring(self.local_id, &self.member_ids()).unwrap_or(self.local_id)
    }

    pub fn next_handle_in_ring(&self) -> Option<NodeHandle> {
        self.handle_for(self.next_in_ring())
    }

    /// Members that become responsible for `key` once the local node leaves.
    pub fn handoff_targets_for_leaving(&self, key: Key) -> Vec<NodeId> {
        placement::responsible_nodes_excluding(
            key_position(key),
            self.replication,
            &self.member_ids(),
            self.local_id,
        )
    }
}
