use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::task::JoinHandle;

use super::error::NodeError;
use super::tracker::{ReadTracker, UpdateTracker, WriteTracker};
use super::types::{
    ClientRequest, Inbound, Inbox, LeaveReply, Mailbox, NodeConfig, NodeState, NodeStatus,
    ReadOutcome, ReadReply, RequestPhase, StartupCommand, UpdateReply,
};
use crate::membership::ring::Ring;
use crate::membership::types::{NodeHandle, NodeId};
use crate::storage::manager::{StorageError, StorageManager};
use crate::storage::types::{Key, VersionedItem};
use crate::transport::Transport;
use crate::transport::protocol::{
    Envelope, PeerMessage, RECORD_BATCH_BYTES, RequestId, batch_records,
};

/// Aborts the timer task when the owning request entry goes away.
struct TimerGuard(JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Pending {
    Read {
        tracker: ReadTracker,
        reply: ReadReply,
    },
    Update {
        tracker: UpdateTracker,
        reply: UpdateReply,
    },
    Write {
        tracker: WriteTracker,
        reply: UpdateReply,
    },
}

impl Pending {
    fn phase(&self) -> RequestPhase {
        match self {
            Pending::Read { .. } | Pending::Update { .. } => RequestPhase::Collect,
            Pending::Write { .. } => RequestPhase::Acknowledge,
        }
    }

    fn fail(self, error: NodeError) {
        match self {
            Pending::Read { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Pending::Update { reply, .. } | Pending::Write { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

struct PendingRequest {
    pending: Pending,
    _timer: TimerGuard,
}

/// The per-node actor.
///
/// Owns the ring, the store, the cache and every in-flight request, and
/// mutates them only from its message loop. Handlers never wait on another
/// node: they send messages and return.
pub struct NodeCoordinator<T, S> {
    id: NodeId,
    config: NodeConfig,
    state: NodeState,
    ring: Ring,
    transport: T,
    storage: S,
    cache: HashMap<Key, VersionedItem>,
    pending: HashMap<RequestId, PendingRequest>,
    last_request_id: u64,
    /// Snapshot batches received from the successor while joining.
    join_batches: HashSet<u32>,
    mailbox: Mailbox,
}

impl<T: Transport, S: StorageManager> NodeCoordinator<T, S> {
    /// `mailbox` must feed the inbox later passed to [`run`](Self::run);
    /// the coordinator posts its own timeouts there.
    pub fn new(
        config: NodeConfig,
        transport: T,
        storage: S,
        mailbox: Mailbox,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let handle = transport.local_handle();
        let id = NodeId::from_addr(&handle.addr);

        Ok(Self {
            id,
            ring: Ring::new(id, handle, config.replication),
            config,
            state: NodeState::JoiningWaitingNodes,
            transport,
            storage,
            cache: HashMap::new(),
            pending: HashMap::new(),
            last_request_id: 0,
            join_batches: HashSet::new(),
            mailbox,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn local_handle(&self) -> NodeHandle {
        self.transport.local_handle()
    }

    /// Enters the ring according to `command`. Storage failures here are
    /// fatal to the node.
    pub fn start(&mut self, command: StartupCommand) -> Result<(), NodeError> {
        match command {
            StartupCommand::Bootstrap => {
                self.storage.clear()?;
                self.state = NodeState::Ready;
                tracing::info!("Bootstrapped a new ring as node {}", self.id);
            }
            StartupCommand::Join { contact } => {
                self.storage.clear()?;
                self.state = NodeState::JoiningWaitingNodes;
                tracing::info!("Joining the ring through {}", contact);
                self.send(NodeHandle::contact(contact), PeerMessage::JoinRequest);
            }
            StartupCommand::Recover { contact } => {
                self.state = NodeState::RecoveringWaitingNodes;
                tracing::info!("Recovering through {}", contact);
                self.send(NodeHandle::contact(contact), PeerMessage::JoinRequest);
            }
        }
        Ok(())
    }

    /// Consumes the inbox until the node leaves the ring.
    pub async fn run(mut self, mut inbox: Inbox) {
        while let Some(inbound) = inbox.recv().await {
            self.handle(inbound);
            if self.state == NodeState::Left {
                break;
            }
        }
        tracing::info!("Node {} stopped", self.id);
    }

    pub fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Peer(envelope) => self.handle_peer(envelope),
            Inbound::Client(request) => self.handle_client(request),
            Inbound::Timeout { request_id, phase } => self.on_timeout(request_id, phase),
        }
    }

    // ------------------------------------------------------------
    // Client requests
    // ------------------------------------------------------------

    fn handle_client(&mut self, request: ClientRequest) {
        match request {
            ClientRequest::Read { key, reply } => self.begin_read(key, reply),
            ClientRequest::Update { key, value, reply } => self.begin_update(key, value, reply),
            ClientRequest::Leave { reply } => self.leave(reply),
            ClientRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            state: self.state,
            members: self.ring.member_ids(),
            pending_requests: self.pending.len(),
        }
    }

    fn can_coordinate(&self, required: usize) -> Result<(), NodeError> {
        if self.state != NodeState::Ready {
            return Err(NodeError::NotReady(self.state));
        }
        if required > self.ring.size() {
            return Err(NodeError::InsufficientMembership {
                required,
                available: self.ring.size(),
            });
        }
        Ok(())
    }

    fn begin_read(&mut self, key: Key, reply: ReadReply) {
        if let Err(e) = self.can_coordinate(self.config.read_quorum) {
            tracing::warn!("Rejecting read of key {}: {}", key, e);
            let _ = reply.send(Err(e));
            return;
        }

        let request_id = self.next_request_id();
        tracing::info!("Read {} of key {} started", request_id, key);

        let tracker = ReadTracker::new(key, self.config.read_quorum);
        self.track(request_id, Pending::Read { tracker, reply });
        self.send_to_replicas(key, PeerMessage::ReadRequest { request_id, key });
    }

    fn begin_update(&mut self, key: Key, value: String, reply: UpdateReply) {
        if let Err(e) = self.can_coordinate(self.config.replication) {
            tracing::warn!("Rejecting update of key {}: {}", key, e);
            let _ = reply.send(Err(e));
            return;
        }

        let request_id = self.next_request_id();
        tracing::info!("Update {} of key {} started", request_id, key);

        let tracker = UpdateTracker::new(key, value, self.config.update_quorum());
        self.track(request_id, Pending::Update { tracker, reply });
        self.send_to_replicas(key, PeerMessage::ReadRequest { request_id, key });
    }

    /// Second phase of an update, entered once its vote quorum is reached.
    fn begin_write(&mut self, request_id: RequestId, tracker: UpdateTracker, reply: UpdateReply) {
        let key = tracker.key();
        let item = tracker.next_item();
        tracing::info!(
            "Update {} writing key {} at version {}",
            request_id,
            key,
            item.version
        );

        let writes = WriteTracker::new(key, item.clone(), self.config.update_quorum());
        self.track(request_id, Pending::Write { tracker: writes, reply });
        self.send_to_replicas(key, PeerMessage::WriteRequest { request_id, key, item });
    }

    fn leave(&mut self, reply: LeaveReply) {
        if self.state != NodeState::Ready {
            let _ = reply.send(Err(NodeError::NotReady(self.state)));
            return;
        }

        let records = match self.storage.read_all() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Cannot leave, failed to read local records: {}", e);
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        let mut handoff: HashMap<NodeId, HashMap<Key, VersionedItem>> = HashMap::new();
        for (key, item) in records {
            for target in self.ring.handoff_targets_for_leaving(key) {
                handoff.entry(target).or_default().insert(key, item.clone());
            }
        }

        for (target, records) in handoff {
            let Some(handle) = self.ring.handle_for(target) else {
                continue;
            };
            tracing::info!("Handing {} records over to node {}", records.len(), target);
            for records in batch_records(records, RECORD_BATCH_BYTES) {
                self.send(handle, PeerMessage::LeaveData { records });
            }
        }
        self.broadcast(PeerMessage::Leave);

        if let Err(e) = self.storage.destroy() {
            tracing::warn!("Failed to destroy local storage after leaving: {}", e);
        }
        self.cache.clear();
        for (_, entry) in self.pending.drain() {
            entry.pending.fail(NodeError::Stopped);
        }

        self.state = NodeState::Left;
        tracing::info!("Node {} left the ring", self.id);
        let _ = reply.send(Ok(()));
    }

    // ------------------------------------------------------------
    // Peer messages
    // ------------------------------------------------------------

    fn handle_peer(&mut self, envelope: Envelope) {
        let Envelope {
            sender_id,
            sender,
            message,
            ..
        } = envelope;
        tracing::debug!("Received {} from node {}", message.kind(), sender_id);

        match message {
            PeerMessage::JoinRequest => self.on_join_request(sender_id, sender),
            PeerMessage::NodesList { nodes } => self.on_nodes_list(nodes),
            PeerMessage::DataRequest => self.on_data_request(sender_id, sender),
            PeerMessage::JoinData {
                records,
                batch,
                batches,
            } => self.on_join_data(records, batch, batches),
            PeerMessage::Join => self.on_join(sender_id, sender),
            PeerMessage::ReJoin => self.on_rejoin(sender_id, sender),
            PeerMessage::Leave => self.on_leave(sender_id),
            PeerMessage::LeaveData { records } => self.on_leave_data(sender_id, records),
            PeerMessage::ReadRequest { request_id, key } => {
                self.on_read_request(sender_id, sender, request_id, key)
            }
            PeerMessage::ReadResponse {
                request_id, item, ..
            } => self.on_read_response(sender_id, request_id, item),
            PeerMessage::WriteRequest {
                request_id,
                key,
                item,
            } => self.on_write_request(sender_id, sender, request_id, key, item),
            PeerMessage::WriteAck { request_id, .. } => self.on_write_ack(sender_id, request_id),
        }
    }

    fn ready_for(&self, kind: &str, from: NodeId) -> bool {
        if self.state == NodeState::Ready {
            return true;
        }
        tracing::warn!(
            "Ignoring {} from node {} while {:?}",
            kind,
            from,
            self.state
        );
        false
    }

    fn on_join_request(&mut self, from: NodeId, sender: NodeHandle) {
        if !self.ready_for("join-request", from) {
            return;
        }
        tracing::info!("Sending membership table to {}", sender);
        self.send(
            sender,
            PeerMessage::NodesList {
                nodes: self.ring.members(),
            },
        );
    }

    fn on_nodes_list(&mut self, nodes: BTreeMap<NodeId, NodeHandle>) {
        match self.state {
            NodeState::JoiningWaitingNodes => {
                self.adopt_members(nodes);

                let successor = self.ring.next_in_ring();
                match self.ring.next_handle_in_ring() {
                    Some(handle) if successor != self.id => {
                        tracing::info!("Requesting data from successor {}", successor);
                        self.state = NodeState::JoiningWaitingData;
                        self.join_batches.clear();
                        self.send(handle, PeerMessage::DataRequest);
                    }
                    _ => {
                        tracing::info!("No successor to fetch data from");
                        self.finish_join();
                    }
                }
            }
            NodeState::RecoveringWaitingNodes => {
                self.adopt_members(nodes);
                if let Err(e) = self.drop_foreign_keys() {
                    tracing::error!("Failed to prune records after recovery: {}", e);
                }
                self.broadcast(PeerMessage::ReJoin);
                self.state = NodeState::Ready;
                tracing::info!(
                    "Node {} recovered into a ring of {} members",
                    self.id,
                    self.ring.size()
                );
            }
            state => {
                tracing::debug!("Ignoring membership table while {:?}", state);
            }
        }
    }

    fn on_data_request(&mut self, from: NodeId, sender: NodeHandle) {
        if !self.ready_for("data-request", from) {
            return;
        }
        match self.storage.read_all() {
            Ok(records) => {
                let count = records.len();
                let batches = batch_records(records, RECORD_BATCH_BYTES);
                tracing::info!(
                    "Sending {} records to joining node {} in {} batches",
                    count,
                    from,
                    batches.len()
                );
                let total = batches.len() as u32;
                for (batch, records) in (0..total).zip(batches) {
                    self.send(
                        sender,
                        PeerMessage::JoinData {
                            records,
                            batch,
                            batches: total,
                        },
                    );
                }
            }
            Err(e) => {
                tracing::error!("Failed to read records for joining node {}: {}", from, e);
            }
        }
    }

    fn on_join_data(&mut self, records: HashMap<Key, VersionedItem>, batch: u32, batches: u32) {
        if self.state != NodeState::JoiningWaitingData {
            tracing::debug!("Ignoring join data while {:?}", self.state);
            return;
        }

        let count = records.len();
        if let Err(e) = self.storage.append_many(records) {
            tracing::error!("Failed to store {} records from successor: {}", count, e);
            return;
        }
        self.join_batches.insert(batch);
        tracing::info!(
            "Loaded {} records from successor (batch {} of {})",
            count,
            batch + 1,
            batches
        );

        if self.join_batches.len() as u32 >= batches {
            self.join_batches.clear();
            self.finish_join();
        }
    }

    fn finish_join(&mut self) {
        if let Err(e) = self.drop_foreign_keys() {
            tracing::error!("Failed to prune records after joining: {}", e);
        }
        self.broadcast(PeerMessage::Join);
        self.state = NodeState::Ready;
        tracing::info!(
            "Node {} joined a ring of {} members",
            self.id,
            self.ring.size()
        );
    }

    fn on_join(&mut self, from: NodeId, sender: NodeHandle) {
        if from == self.id {
            tracing::warn!("Ignoring join announcement carrying our own id from {}", sender);
            return;
        }
        self.ring.add_member(from, sender);
        tracing::info!("Node {} joined, ring size {}", from, self.ring.size());

        // Membership is partial until a joining or recovering node is ready.
        if self.state == NodeState::Ready {
            if let Err(e) = self.drop_foreign_keys() {
                tracing::error!("Failed to drop keys after node {} joined: {}", from, e);
            }
        }
    }

    fn on_rejoin(&mut self, from: NodeId, sender: NodeHandle) {
        if from == self.id {
            return;
        }
        self.ring.add_member(from, sender);
        tracing::info!("Node {} recovered at {}", from, sender);
    }

    fn on_leave(&mut self, from: NodeId) {
        if from == self.id {
            return;
        }
        if self.ring.remove_member(from).is_some() {
            tracing::info!("Node {} left, ring size {}", from, self.ring.size());
        }
    }

    fn on_leave_data(&mut self, from: NodeId, records: HashMap<Key, VersionedItem>) {
        if !self.ready_for("leave-data", from) {
            return;
        }

        let keys: Vec<Key> = records.keys().copied().collect();
        match self.storage.append_many(records) {
            Ok(()) => {
                for key in &keys {
                    self.cache.remove(key);
                }
                tracing::info!("Took over {} records from leaving node {}", keys.len(), from);
            }
            Err(e) => {
                tracing::error!("Failed to store records from leaving node {}: {}", from, e);
            }
        }
    }

    fn on_read_request(
        &mut self,
        from: NodeId,
        sender: NodeHandle,
        request_id: RequestId,
        key: Key,
    ) {
        if !self.ready_for("read-request", from) {
            return;
        }
        match self.read_local(key) {
            Ok(item) => {
                self.send(
                    sender,
                    PeerMessage::ReadResponse {
                        request_id,
                        key,
                        item,
                    },
                );
            }
            Err(e) => {
                tracing::error!("Failed to read key {} for node {}: {}", key, from, e);
            }
        }
    }

    fn on_write_request(
        &mut self,
        from: NodeId,
        sender: NodeHandle,
        request_id: RequestId,
        key: Key,
        item: VersionedItem,
    ) {
        if !self.ready_for("write-request", from) {
            return;
        }
        match self.store_local(key, item) {
            Ok(()) => self.send(sender, PeerMessage::WriteAck { request_id, key }),
            Err(e) => {
                tracing::error!("Failed to write key {} for node {}: {}", key, from, e);
            }
        }
    }

    fn on_read_response(
        &mut self,
        from: NodeId,
        request_id: RequestId,
        item: Option<VersionedItem>,
    ) {
        let Some(entry) = self.pending.get_mut(&request_id) else {
            tracing::debug!("Dropping vote from node {} for finished request {}", from, request_id);
            return;
        };

        let reached = match &mut entry.pending {
            Pending::Read { tracker, .. } => tracker.add_vote(item),
            Pending::Update { tracker, .. } => tracker.add_vote(item),
            Pending::Write { .. } => {
                tracing::debug!("Dropping late vote from node {} for request {}", from, request_id);
                return;
            }
        };
        tracing::debug!("Vote from node {} for request {}", from, request_id);
        if !reached {
            return;
        }

        let Some(entry) = self.pending.remove(&request_id) else {
            return;
        };
        match entry.pending {
            Pending::Read { tracker, reply } => {
                let item = tracker.latest().cloned();
                tracing::info!(
                    "Read {} of key {} resolved at version {}",
                    request_id,
                    tracker.key(),
                    item.as_ref().map_or(0, |item| item.version)
                );
                let _ = reply.send(Ok(ReadOutcome {
                    key: tracker.key(),
                    item,
                }));
            }
            Pending::Update { tracker, reply } => self.begin_write(request_id, tracker, reply),
            Pending::Write { .. } => {}
        }
    }

    fn on_write_ack(&mut self, from: NodeId, request_id: RequestId) {
        let complete = match self.pending.get_mut(&request_id).map(|entry| &mut entry.pending) {
            Some(Pending::Write { tracker, .. }) => tracker.add_ack(from),
            _ => {
                tracing::debug!("Dropping ack from node {} for request {}", from, request_id);
                return;
            }
        };
        tracing::debug!("Ack from node {} for request {}", from, request_id);
        if !complete {
            return;
        }

        if let Some(PendingRequest {
            pending: Pending::Write { tracker, reply },
            ..
        }) = self.pending.remove(&request_id)
        {
            tracing::info!(
                "Update {} of key {} committed at version {}",
                request_id,
                tracker.key(),
                tracker.item().version
            );
            let _ = reply.send(Ok(tracker.item().clone()));
        }
    }

    fn on_timeout(&mut self, request_id: RequestId, phase: RequestPhase) {
        let armed = self
            .pending
            .get(&request_id)
            .is_some_and(|entry| entry.pending.phase() == phase);
        if !armed {
            tracing::debug!("Ignoring stale {:?} timeout of request {}", phase, request_id);
            return;
        }

        if let Some(entry) = self.pending.remove(&request_id) {
            tracing::warn!("Request {} timed out in {:?} phase", request_id, phase);
            entry.pending.fail(NodeError::OperationTimeout);
        }
    }

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------

    fn next_request_id(&mut self) -> RequestId {
        self.last_request_id += 1;
        RequestId(self.last_request_id)
    }

    fn track(&mut self, request_id: RequestId, pending: Pending) {
        let timer = self.arm_timer(request_id, pending.phase());
        self.pending.insert(
            request_id,
            PendingRequest {
                pending,
                _timer: timer,
            },
        );
    }

    fn arm_timer(&self, request_id: RequestId, phase: RequestPhase) -> TimerGuard {
        let mailbox = self.mailbox.clone();
        let timeout = self.config.request_timeout;
        TimerGuard(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = mailbox.send(Inbound::Timeout { request_id, phase });
        }))
    }

    fn send(&self, to: NodeHandle, message: PeerMessage) {
        tracing::debug!("Sending {} to {}", message.kind(), to);
        self.transport.send(Envelope {
            sender_id: self.id,
            sender: self.transport.local_handle(),
            to,
            message,
        });
    }

    fn broadcast(&self, message: PeerMessage) {
        for (_, handle) in self.ring.peers() {
            self.send(handle, message.clone());
        }
    }

    fn send_to_replicas(&self, key: Key, message: PeerMessage) {
        for id in self.ring.responsible_for_key(key) {
            if let Some(handle) = self.ring.handle_for(id) {
                self.send(handle, message.clone());
            }
        }
    }

    /// Merges a received membership table, keeping our own fresh handle.
    fn adopt_members(&mut self, nodes: BTreeMap<NodeId, NodeHandle>) {
        let own = self.transport.local_handle();
        self.ring.add_members(nodes);
        self.ring.add_member(self.id, own);
    }

    fn read_local(&mut self, key: Key) -> Result<Option<VersionedItem>, StorageError> {
        if let Some(item) = self.cache.get(&key) {
            return Ok(Some(item.clone()));
        }
        let item = self.storage.read_one(key)?;
        if let Some(item) = &item {
            self.cache.insert(key, item.clone());
        }
        Ok(item)
    }

    fn store_local(&mut self, key: Key, item: VersionedItem) -> Result<(), StorageError> {
        self.storage.append_one(key, item.clone())?;
        // Cached entries mirror the store, so merging keeps them equal.
        if let Some(cached) = self.cache.get_mut(&key) {
            if item.supersedes(Some(cached)) {
                *cached = item;
            }
        }
        Ok(())
    }

    /// Removes every stored key this node is no longer a replica of.
    fn drop_foreign_keys(&mut self) -> Result<(), StorageError> {
        let foreign: Vec<Key> = self
            .storage
            .read_all()?
            .into_keys()
            .filter(|key| !self.ring.is_responsible_for(*key))
            .collect();
        if foreign.is_empty() {
            return Ok(());
        }

        self.storage.remove_many(&foreign)?;
        for key in &foreign {
            self.cache.remove(key);
        }
        tracing::info!("Dropped {} keys this node is no longer responsible for", foreign.len());
        Ok(())
    }
}
