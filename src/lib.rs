//! Replicated Ring Key-Value Store Library
//!
//! This library crate defines the modules that make up a single ring node.
//! The node binary (`main.rs`) and the operator client (`bin/ringctl.rs`) are
//! thin shells around it.
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`membership`**: Node identities, the ring membership table and the pure
//!   placement functions mapping keys onto replica sets.
//! - **`storage`**: Versioned items and the per-node persistent record store,
//!   including the version conflict rule applied on every merge.
//! - **`transport`**: The wire envelope exchanged between nodes and the
//!   fire-and-forget transports carrying it (in-process channels and UDP).
//! - **`node`**: The coordinator state machine. It runs membership transitions,
//!   quorum reads and two-phase updates, and exposes the client request surface.

pub mod membership;
pub mod node;
pub mod storage;
pub mod transport;
