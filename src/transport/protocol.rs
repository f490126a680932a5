//! Node-to-Node Wire Protocol
//!
//! Defines the envelope every inter-node message travels in and the closed set
//! of protocol messages the coordinator understands.
//!
//! Envelopes are serialised with bincode by the UDP transport and moved as-is
//! by the in-process transport.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::membership::types::{NodeHandle, NodeId};
use crate::storage::types::{Key, VersionedItem};

/// Upper bound for the encoded records of one `JoinData` or `LeaveData`
/// message. Leaves room for the envelope inside a single UDP datagram.
pub const RECORD_BATCH_BYTES: usize = 60 * 1024;

/// Identifier of a client request, unique within the coordinating node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A protocol message together with its routing information.
///
/// `sender` is the handle replies go to; `to` is checked by the receiving
/// side to drop messages addressed to a previous incarnation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: NodeId,
    pub sender: NodeHandle,
    pub to: NodeHandle,
    pub message: PeerMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PeerMessage {
    /// Ask a member for its membership table.
    JoinRequest,

    /// Reply to `JoinRequest`.
    NodesList { nodes: BTreeMap<NodeId, NodeHandle> },

    /// Ask the successor for its records (join only).
    DataRequest,

    /// Reply to `DataRequest`: one batch of the local record snapshot.
    /// The joiner is done once it holds batches `0..batches`.
    JoinData {
        records: HashMap<Key, VersionedItem>,
        batch: u32,
        batches: u32,
    },

    /// The sender finished joining and is now part of the ring.
    Join,

    /// The sender recovered from a crash; refresh its handle.
    ReJoin,

    /// The sender is leaving the ring.
    Leave,

    /// Records handed off by a leaving member. Large hand-offs arrive as
    /// several messages, each applied on its own.
    LeaveData { records: HashMap<Key, VersionedItem> },

    /// Ask a replica for its current item (vote).
    ReadRequest { request_id: RequestId, key: Key },

    /// A replica's vote. `item` is `None` when the replica has never seen the key.
    ReadResponse {
        request_id: RequestId,
        key: Key,
        item: Option<VersionedItem>,
    },

    /// Store a freshly versioned item.
    WriteRequest {
        request_id: RequestId,
        key: Key,
        item: VersionedItem,
    },

    /// The replica applied a `WriteRequest`.
    WriteAck { request_id: RequestId, key: Key },
}

impl PeerMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::JoinRequest => "join-request",
            PeerMessage::NodesList { .. } => "nodes-list",
            PeerMessage::DataRequest => "data-request",
            PeerMessage::JoinData { .. } => "join-data",
            PeerMessage::Join => "join",
            PeerMessage::ReJoin => "re-join",
            PeerMessage::Leave => "leave",
            PeerMessage::LeaveData { .. } => "leave-data",
            PeerMessage::ReadRequest { .. } => "read-request",
            PeerMessage::ReadResponse { .. } => "read-response",
            PeerMessage::WriteRequest { .. } => "write-request",
            PeerMessage::WriteAck { .. } => "write-ack",
        }
    }
}

/// Splits `records` into batches whose bincode encoding stays within
/// `budget` bytes. A record larger than the budget travels alone.
///
/// Always returns at least one batch, so an empty snapshot still produces a
/// message. Keys are visited in ascending order.
pub fn batch_records(
    records: HashMap<Key, VersionedItem>,
    budget: usize,
) -> Vec<HashMap<Key, VersionedItem>> {
    // bincode prefixes a map with its length as a u64.
    const MAP_PREFIX: usize = 8;

    let ordered: BTreeMap<Key, VersionedItem> = records.into_iter().collect();
    let mut batches = Vec::new();
    let mut current = HashMap::new();
    let mut current_bytes = MAP_PREFIX;

    for (key, item) in ordered {
        let size = bincode::serialized_size(&(key, &item)).map_or(budget, |size| size as usize);
        if !current.is_empty() && current_bytes + size > budget {
            batches.push(std::mem::take(&mut current));
            current_bytes = MAP_PREFIX;
        }
        current_bytes += size;
        current.insert(key, item);
    }
    batches.push(current);
    batches
}
