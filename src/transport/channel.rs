use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use super::Transport;
use super::protocol::Envelope;
use crate::membership::types::NodeHandle;
use crate::node::types::{Inbound, Mailbox};

/// Shared in-process network, routing envelopes between registered nodes.
///
/// One registration per address. Registering an address again replaces the
/// previous incarnation, whose handles then go stale; unregistering it models
/// a crash where nothing listens on the address any more.
#[derive(Clone, Debug, Default)]
pub struct ChannelNetwork {
    nodes: Arc<DashMap<SocketAddr, Registration>>,
}

#[derive(Clone, Debug)]
struct Registration {
    session: Uuid,
    mailbox: Mailbox,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new incarnation listening on `addr`.
    pub fn register(&self, addr: SocketAddr, mailbox: Mailbox) -> ChannelTransport {
        let handle = NodeHandle::new(addr);
        let previous = self.nodes.insert(
            addr,
            Registration {
                session: handle.session,
                mailbox,
            },
        );
        if previous.is_some() {
            tracing::debug!("Replaced previous incarnation at {}", addr);
        }

        ChannelTransport {
            handle,
            network: self.clone(),
        }
    }

    pub fn unregister(&self, addr: SocketAddr) {
        self.nodes.remove(&addr);
    }

    pub fn is_registered(&self, addr: SocketAddr) -> bool {
        self.nodes.contains_key(&addr)
    }

    fn deliver(&self, envelope: Envelope) {
        let to = envelope.to;
        let Some(registration) = self.nodes.get(&to.addr).map(|r| r.value().clone()) else {
            tracing::debug!(
                "Dropping {} for {}: nothing listens there",
                envelope.message.kind(),
                to
            );
            return;
        };

        if !to.accepts(registration.session) {
            tracing::debug!(
                "Dropping {} for stale handle {}",
                envelope.message.kind(),
                to
            );
            return;
        }

        if registration.mailbox.send(Inbound::Peer(envelope)).is_err() {
            tracing::debug!("Mailbox of {} is closed", to);
        }
    }
}

/// Transport of one node on a [`ChannelNetwork`].
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    handle: NodeHandle,
    network: ChannelNetwork,
}

impl Transport for ChannelTransport {
    fn local_handle(&self) -> NodeHandle {
        self.handle
    }

    fn send(&self, envelope: Envelope) {
        self.network.deliver(envelope);
    }
}
