//! Transport Module
//!
//! Point-to-point, fire-and-forget delivery of protocol envelopes between
//! nodes. There are no synchronous calls: request/response is emulated by the
//! coordinator through request ids carried inside the messages.
//!
//! ## Implementations
//! - **`channel`**: In-process broker routing envelopes straight into node
//!   mailboxes. Crashes and restarts are modelled by (re-)registering an address.
//! - **`udp`**: bincode-encoded envelopes over a UDP socket, one datagram each.

pub mod channel;
pub mod protocol;
pub mod udp;


use crate::membership::types::NodeHandle;
use protocol::Envelope;

/// Outbound side of a node's messaging substrate.
pub trait Transport: Send + Sync + 'static {
    /// Handle of the incarnation this transport delivers to.
    fn local_handle(&self) -> NodeHandle;

    /// Sends `envelope` to `envelope.to`. Delivery failures are logged and
    /// otherwise ignored.
    fn send(&self, envelope: Envelope);
}
