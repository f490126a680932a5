use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::coordinator::NodeCoordinator;
use super::error::NodeError;
use super::types::{
    ClientRequest, Inbound, Inbox, Mailbox, NodeConfig, NodeStatus, ReadOutcome, StartupCommand,
};
use crate::membership::types::{NodeHandle, NodeId};
use crate::storage::manager::StorageManager;
use crate::storage::types::{Key, VersionedItem};
use crate::transport::Transport;

/// Cloneable handle for issuing client requests to one node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    mailbox: Mailbox,
}

impl NodeClient {
    pub fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }

    pub async fn read(&self, key: Key) -> Result<ReadOutcome, NodeError> {
        let (reply, response) = oneshot::channel();
        self.submit(ClientRequest::Read { key, reply })?;
        response.await.map_err(|_| NodeError::Stopped)?
    }

    pub async fn update(
        &self,
        key: Key,
        value: impl Into<String>,
    ) -> Result<VersionedItem, NodeError> {
        let (reply, response) = oneshot::channel();
        self.submit(ClientRequest::Update {
            key,
            value: value.into(),
            reply,
        })?;
        response.await.map_err(|_| NodeError::Stopped)?
    }

    pub async fn leave(&self) -> Result<(), NodeError> {
        let (reply, response) = oneshot::channel();
        self.submit(ClientRequest::Leave { reply })?;
        response.await.map_err(|_| NodeError::Stopped)?
    }

    pub async fn status(&self) -> Result<NodeStatus, NodeError> {
        let (reply, response) = oneshot::channel();
        self.submit(ClientRequest::Status { reply })?;
        response.await.map_err(|_| NodeError::Stopped)
    }

    fn submit(&self, request: ClientRequest) -> Result<(), NodeError> {
        self.mailbox
            .send(Inbound::Client(request))
            .map_err(|_| NodeError::Stopped)
    }
}

/// A node running on the current tokio runtime.
#[derive(Debug)]
pub struct NodeRuntime {
    pub id: NodeId,
    pub handle: NodeHandle,
    pub client: NodeClient,
    pub task: JoinHandle<()>,
}

impl NodeRuntime {
    /// Stops the node abruptly, without telling the ring.
    pub fn crash(self) {
        self.task.abort();
    }
}

/// Validates `config`, performs the startup step and spawns the node's
/// message loop.
///
/// `mailbox` and `inbox` are the two ends of the channel `transport`
/// delivers into.
pub fn spawn_node<T: Transport, S: StorageManager>(
    config: NodeConfig,
    transport: T,
    storage: S,
    (mailbox, inbox): (Mailbox, Inbox),
    command: StartupCommand,
) -> Result<NodeRuntime, NodeError> {
    let mut coordinator = NodeCoordinator::new(config, transport, storage, mailbox.clone())?;
    let id = coordinator.id();
    let handle = coordinator.local_handle();

    let span = tracing::info_span!("node", id = %id);
    {
        let _entered = span.enter();
        coordinator.start(command)?;
    }

    let task = tokio::spawn(coordinator.run(inbox).instrument(span));

    Ok(NodeRuntime {
        id,
        handle,
        client: NodeClient::new(mailbox),
        task,
    })
}
