//! Node Module
//!
//! One storage node of the ring: the coordinator actor owning all node state,
//! the client surface in front of it, and the HTTP endpoints exposing that
//! surface.
//!
//! ## Core Components
//! - **`NodeCoordinator`**: Single-task state machine consuming one inbox of
//!   peer messages, client requests and timer expiries. Drives join, recovery
//!   and leave, answers replica requests, and coordinates client requests.
//! - **Trackers**: Per-request quorum bookkeeping. Reads resolve to the freshest
//!   vote; updates vote first, then write at the next version and count acks.
//! - **`NodeClient`**: Cloneable async handle turning client calls into inbox
//!   requests with oneshot replies.
//!
//! ## Request Lifecycle
//! Every client request gets a node-local `RequestId` and a timer. Responses
//! for unknown ids are stale and dropped. Removing a request from the pending
//! table cancels its timer, and each timer carries the phase it was armed for,
//! so a late phase-1 expiry can never fail an update in its write phase.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod tracker;
pub mod types;
