use thiserror::Error;

use super::types::NodeState;
use crate::storage::manager::StorageError;

/// Errors returned to callers of the client surface.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("not enough nodes in the ring: {required} required, {available} available")]
    InsufficientMembership { required: usize, available: usize },

    #[error("operation timed out before reaching quorum")]
    OperationTimeout,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("node is not ready to serve requests (state {0:?})")]
    NotReady(NodeState),

    #[error("node has stopped")]
    Stopped,

    #[error("bad startup configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Quorum configuration that cannot guarantee consistency.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} ({value}) exceeds the replication factor ({replication})")]
    ExceedsReplication {
        name: &'static str,
        value: usize,
        replication: usize,
    },

    #[error("R + W > N must hold (R={read}, W={write}, N={replication})")]
    QuorumsDoNotOverlap {
        read: usize,
        write: usize,
        replication: usize,
    },

    #[error("request timeout must be non-zero")]
    ZeroTimeout,
}
