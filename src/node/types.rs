use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::error::{ConfigError, NodeError};
use crate::membership::types::NodeId;
use crate::storage::types::{Key, VersionedItem};
use crate::transport::protocol::{Envelope, RequestId};

/// Budget a request has to reach quorum, per phase.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    /// Join requested, waiting for the membership table.
    JoiningWaitingNodes,
    /// Membership known, waiting for the successor's records.
    JoiningWaitingData,
    /// Restarted after a crash, waiting for the membership table.
    RecoveringWaitingNodes,
    /// Serving clients and peers.
    Ready,
    /// Left the ring; the message loop has stopped.
    Left,
}

/// How a node enters the ring when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupCommand {
    /// First node of a new ring.
    Bootstrap,
    /// New node joining through a known member.
    Join { contact: SocketAddr },
    /// Node coming back after a crash, keeping its stored records.
    Recover { contact: SocketAddr },
}

/// Quorum configuration shared by every node of a ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub read_quorum: usize,
    pub write_quorum: usize,
    pub replication: usize,
    pub request_timeout: Duration,
}

impl NodeConfig {
    pub fn new(read_quorum: usize, write_quorum: usize, replication: usize) -> Self {
        Self {
            read_quorum,
            write_quorum,
            replication,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Checks the quorum rules. A node refuses to start on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("read quorum", self.read_quorum),
            ("write quorum", self.write_quorum),
            ("replication factor", self.replication),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { name });
            }
            if value > self.replication {
                return Err(ConfigError::ExceedsReplication {
                    name,
                    value,
                    replication: self.replication,
                });
            }
        }

        if self.read_quorum + self.write_quorum <= self.replication {
            return Err(ConfigError::QuorumsDoNotOverlap {
                read: self.read_quorum,
                write: self.write_quorum,
                replication: self.replication,
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    /// Votes and acks an update needs in each of its two phases.
    pub fn update_quorum(&self) -> usize {
        self.read_quorum.max(self.write_quorum)
    }
}

/// Result of a quorum read. `item` is `None` when no replica knows the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub key: Key,
    pub item: Option<VersionedItem>,
}

/// Point-in-time view of a node, for operators and tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeStatus {
    pub id: NodeId,
    pub state: NodeState,
    pub members: Vec<NodeId>,
    pub pending_requests: usize,
}

/// Which timer of a request fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Collecting votes (reads, and the first phase of updates).
    Collect,
    /// Collecting write acknowledgements.
    Acknowledge,
}

pub type ReadReply = oneshot::Sender<Result<ReadOutcome, NodeError>>;
pub type UpdateReply = oneshot::Sender<Result<VersionedItem, NodeError>>;
pub type LeaveReply = oneshot::Sender<Result<(), NodeError>>;

/// Requests from the client surface.
#[derive(Debug)]
pub enum ClientRequest {
    Read { key: Key, reply: ReadReply },
    Update { key: Key, value: String, reply: UpdateReply },
    Leave { reply: LeaveReply },
    Status { reply: oneshot::Sender<NodeStatus> },
}

/// Everything a node's message loop consumes.
#[derive(Debug)]
pub enum Inbound {
    Peer(Envelope),
    Client(ClientRequest),
    Timeout {
        request_id: RequestId,
        phase: RequestPhase,
    },
}

/// Sending side of a node's single inbound channel.
pub type Mailbox = mpsc::UnboundedSender<Inbound>;
pub type Inbox = mpsc::UnboundedReceiver<Inbound>;

pub fn mailbox() -> (Mailbox, Inbox) {
    mpsc::unbounded_channel()
}
