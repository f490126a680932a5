use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Position of a node or a key on the 32-bit hash ring.
pub type RingPosition = u32;

/// Identity of a node on the ring.
///
/// Derived from the node's network address, so a node that crashes and
/// restarts on the same address keeps its identity. Two addresses hashing to
/// the same value are not detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub RingPosition);

impl NodeId {
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(hash_position(&addr.to_string()))
    }

    pub fn position(&self) -> RingPosition {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashes arbitrary text onto the ring: the first four bytes of its SHA-256
/// digest, big-endian.
pub fn hash_position(text: &str) -> RingPosition {
    let digest = Sha256::digest(text.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// A sendable reference to one incarnation of a node.
///
/// Every process start mints a fresh `session`. Messages addressed to a
/// session that is no longer listening are dropped by the receiver, which is
/// why a recovered node must announce its new handle to the ring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub addr: SocketAddr,
    pub session: Uuid,
}

impl NodeHandle {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            session: Uuid::new_v4(),
        }
    }

    /// Handle for a known contact address whose session is not known yet.
    /// It reaches whichever incarnation currently listens on `addr`.
    pub fn contact(addr: SocketAddr) -> Self {
        Self {
            addr,
            session: Uuid::nil(),
        }
    }

    pub fn is_contact(&self) -> bool {
        self.session.is_nil()
    }

    /// Whether an envelope addressed to `self` should be delivered to the
    /// incarnation identified by `session`.
    pub fn accepts(&self, session: Uuid) -> bool {
        self.is_contact() || self.session == session
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.session.simple())
    }
}
