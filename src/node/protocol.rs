//! Client HTTP Protocol
//!
//! Endpoints and Data Transfer Objects (DTOs) of the client surface every node
//! exposes over HTTP. The `ringctl` binary speaks this protocol.
//!
//! Any node accepts any key: the node receiving a request coordinates it.

use serde::{Deserialize, Serialize};

use super::types::NodeStatus;
use crate::storage::types::{Key, Version};

// --- API Endpoints ---

/// Quorum read of one key (`/read/:key`).
pub const ENDPOINT_READ: &str = "/read";
/// Two-phase quorum update of one key.
pub const ENDPOINT_UPDATE: &str = "/update";
/// Graceful departure of the receiving node.
pub const ENDPOINT_LEAVE: &str = "/leave";
/// Membership and lifecycle state of the receiving node.
pub const ENDPOINT_STATUS: &str = "/status";

// --- Data Transfer Objects ---

/// Result of a read.
///
/// `found` is false when no replica in the quorum knew the key. `error` is
/// set when the operation failed; the HTTP status tells which way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadResponse {
    pub key: Key,
    pub found: bool,
    pub value: Option<String>,
    pub version: Option<Version>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRequest {
    pub key: Key,
    pub value: String,
}

/// Result of an update, carrying the version the value was committed at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateResponse {
    pub success: bool,
    pub key: Key,
    pub version: Option<Version>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaveResponse {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: Option<NodeStatus>,
    pub error: Option<String>,
}
