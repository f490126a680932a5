use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::Transport;
use super::protocol::Envelope;
use crate::membership::types::NodeHandle;
use crate::node::types::{Inbound, Mailbox};

/// Largest payload that fits in one UDP datagram.
pub const MAX_DATAGRAM: usize = 65_507;

/// One encoded envelope waiting for the send loop.
struct Outgoing {
    kind: &'static str,
    target: SocketAddr,
    bytes: Vec<u8>,
}

/// Transport sending one bincode-encoded envelope per UDP datagram.
///
/// `send` only queues; a dedicated task awaits each `send_to` in queue order.
/// Dropping the transport stops receiving at once, while already queued
/// datagrams are still sent.
pub struct UdpTransport {
    handle: NodeHandle,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    receive_task: JoinHandle<()>,
    drained: Option<oneshot::Receiver<()>>,
}

impl UdpTransport {
    /// Binds `bind_addr` and starts forwarding envelopes addressed to this
    /// incarnation into `mailbox`.
    ///
    /// The bound address becomes the node's identity and reply address, so
    /// wildcard addresses such as `0.0.0.0` are rejected.
    pub async fn bind(bind_addr: SocketAddr, mailbox: Mailbox) -> Result<Self> {
        if bind_addr.ip().is_unspecified() {
            bail!(
                "cannot bind to unspecified address {}: peers need a routable address to reply to",
                bind_addr
            );
        }

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let handle = NodeHandle::new(socket.local_addr()?);

        let receive_task = {
            let socket = socket.clone();
            tokio::spawn(async move {
                receive_loop(socket, handle.session, mailbox).await;
            })
        };

        let (outgoing, queue) = mpsc::unbounded_channel();
        let (drained_tx, drained) = oneshot::channel();
        tokio::spawn(async move {
            send_loop(socket, queue).await;
            let _ = drained_tx.send(());
        });

        tracing::info!("UDP transport listening on {}", handle);

        Ok(Self {
            handle,
            outgoing,
            receive_task,
            drained: Some(drained),
        })
    }

    /// Resolves once the transport was dropped and every queued datagram
    /// has been handed to the socket. Can be taken once.
    pub fn take_drained(&mut self) -> Option<oneshot::Receiver<()>> {
        self.drained.take()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

impl Transport for UdpTransport {
    fn local_handle(&self) -> NodeHandle {
        self.handle
    }

    fn send(&self, envelope: Envelope) {
        let kind = envelope.message.kind();
        let target = envelope.to.addr;

        let encoded = match bincode::serialize(&envelope) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", kind, e);
                return;
            }
        };

        if encoded.len() > MAX_DATAGRAM {
            tracing::error!(
                "Dropping {} to {}: {} bytes exceed one datagram",
                kind,
                target,
                encoded.len()
            );
            return;
        }

        let outgoing = Outgoing {
            kind,
            target,
            bytes: encoded,
        };
        if self.outgoing.send(outgoing).is_err() {
            tracing::warn!("UDP send loop stopped, dropping {} to {}", kind, target);
        }
    }
}

async fn send_loop(socket: Arc<UdpSocket>, mut queue: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(Outgoing {
        kind,
        target,
        bytes,
    }) = queue.recv().await
    {
        if let Err(e) = socket.send_to(&bytes, target).await {
            tracing::warn!("Failed to send {} to {}: {}", kind, target, e);
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, session: Uuid, mailbox: Mailbox) {
    let mut buf = vec![0u8; 65_536];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match bincode::deserialize::<Envelope>(&buf[..len]) {
                Ok(envelope) => {
                    if !envelope.to.accepts(session) {
                        tracing::debug!(
                            "Dropping {} from {} addressed to a previous incarnation",
                            envelope.message.kind(),
                            src
                        );
                        continue;
                    }
                    if mailbox.send(Inbound::Peer(envelope)).is_err() {
                        tracing::debug!("Mailbox closed, stopping UDP receive loop");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to deserialize envelope from {}: {}", src, e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to receive UDP packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
