//! Storage Module
//!
//! The per-node record store: a mapping from key to the latest known
//! `VersionedItem` for that key.
//!
//! ## Core Concepts
//! - **Versioned items**: Values are immutable and carry a version. A write
//!   never mutates an item, it supersedes it.
//! - **Conflict rule**: Wherever records are merged (direct writes, hand-off,
//!   join snapshots) the incoming item wins unless the stored one is strictly
//!   newer. Merges are therefore idempotent and commutative.
//! - **Backends**: `FileStorage` persists one JSON document per node;
//!   `MemoryStorage` keeps records in memory for tests and embedded clusters.

pub mod file;
pub mod manager;
pub mod memory;
pub mod types;
