//! Membership & Placement Module
//!
//! Keeps track of which nodes form the ring and decides which of them hold a
//! copy of each key.
//!
//! ## Core Mechanisms
//! - **Identity**: A node's id is the hash of its network address, so it
//!   survives restarts. Its transport handle does not, and is refreshed through
//!   re-join announcements.
//! - **Placement**: Keys are hashed onto the same 32-bit ring as node ids. The
//!   first `N` members clockwise from a key's position are its replicas.
//! - **Hand-off**: A leaving node computes the replica set the ring will have
//!   without it and pushes its records there.

pub mod placement;
pub mod ring;
pub mod types;
