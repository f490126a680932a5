//! Shared helpers for in-process cluster tests.
//!
//! Clusters run on one `ChannelNetwork` with `MemoryStorage` per node, so a
//! test can crash a node, keep its records and bring it back on them.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ringstore::membership::types::NodeId;
use ringstore::node::client::{NodeClient, NodeRuntime, spawn_node};
use ringstore::node::types::{NodeConfig, NodeState, NodeStatus, StartupCommand, mailbox};
use ringstore::storage::memory::MemoryStorage;
use ringstore::storage::types::{Key, VersionedItem};
use ringstore::transport::channel::ChannelNetwork;

/// Per-phase request timeout used by test clusters.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(300);
/// Upper bound for the cluster to converge after a membership change.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

/// Polls `check` until it holds, panicking after [`SETTLE_TIMEOUT`].
pub async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let start = Instant::now();
    while !check() {
        if start.elapsed() > SETTLE_TIMEOUT {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One node slot. The storage outlives crashes of the node.
pub struct TestNode {
    pub addr: SocketAddr,
    pub id: NodeId,
    pub storage: MemoryStorage,
    departed: bool,
    runtime: Option<NodeRuntime>,
}

impl TestNode {
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn client(&self) -> &NodeClient {
        &self
            .runtime
            .as_ref()
            .unwrap_or_else(|| panic!("node {} is not running", self.id))
            .client
    }

    pub fn item(&self, key: Key) -> Option<VersionedItem> {
        self.storage.snapshot().get(&key).cloned()
    }
}

pub struct TestCluster {
    pub network: ChannelNetwork,
    pub config: NodeConfig,
    pub nodes: Vec<TestNode>,
}

impl TestCluster {
    pub fn new(read_quorum: usize, write_quorum: usize, replication: usize) -> Self {
        Self {
            network: ChannelNetwork::new(),
            config: NodeConfig::new(read_quorum, write_quorum, replication)
                .with_request_timeout(REQUEST_TIMEOUT),
            nodes: Vec::new(),
        }
    }

    pub async fn bootstrap(&mut self, port: u16) -> usize {
        self.spawn(port, StartupCommand::Bootstrap).await
    }

    /// Joins a fresh node through `via` and waits until every member knows it.
    pub async fn join(&mut self, port: u16, via: usize) -> usize {
        let contact = self.nodes[via].addr;
        let idx = self.spawn(port, StartupCommand::Join { contact }).await;
        self.settle().await;
        idx
    }

    async fn spawn(&mut self, port: u16, command: StartupCommand) -> usize {
        let addr = addr(port);
        let storage = MemoryStorage::new();
        let channel = mailbox();
        let transport = self.network.register(addr, channel.0.clone());
        let runtime = spawn_node(
            self.config.clone(),
            transport,
            storage.clone(),
            channel,
            command,
        )
        .expect("node should start");

        self.nodes.push(TestNode {
            addr,
            id: runtime.id,
            storage,
            departed: false,
            runtime: Some(runtime),
        });
        let idx = self.nodes.len() - 1;
        self.wait_ready(idx).await;
        idx
    }

    /// Kills the node without telling the ring. Its records stay in memory.
    pub fn crash(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        if let Some(runtime) = node.runtime.take() {
            runtime.crash();
        }
        self.network.unregister(node.addr);
    }

    /// Restarts a crashed node on its previous records.
    pub async fn recover(&mut self, idx: usize, via: usize) {
        let contact = self.nodes[via].addr;
        let node = &mut self.nodes[idx];
        let channel = mailbox();
        let transport = self.network.register(node.addr, channel.0.clone());
        let runtime = spawn_node(
            self.config.clone(),
            transport,
            node.storage.clone(),
            channel,
            StartupCommand::Recover { contact },
        )
        .expect("node should restart");
        node.runtime = Some(runtime);

        self.wait_ready(idx).await;
    }

    /// Runs the leave protocol on `idx` and waits for its loop to stop.
    pub async fn leave(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        let runtime = node.runtime.take().expect("leaving node should be running");
        runtime.client.leave().await.expect("leave should succeed");
        runtime.task.await.expect("node loop should stop cleanly");
        node.departed = true;
        self.network.unregister(node.addr);
    }

    pub fn client(&self, idx: usize) -> &NodeClient {
        self.nodes[idx].client()
    }

    pub async fn status(&self, idx: usize) -> NodeStatus {
        self.client(idx)
            .status()
            .await
            .expect("running node should report status")
    }

    pub async fn wait_ready(&self, idx: usize) {
        let start = Instant::now();
        while self.status(idx).await.state != NodeState::Ready {
            if start.elapsed() > SETTLE_TIMEOUT {
                panic!("node {} never became ready", self.nodes[idx].id);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Waits until every running node sees exactly the current members.
    /// Crashed nodes are still members; departed ones are not.
    pub async fn settle(&self) {
        let expected: BTreeSet<NodeId> = self.member_ids().into_iter().collect();
        for (idx, node) in self.nodes.iter().enumerate() {
            if !node.is_running() {
                continue;
            }
            let start = Instant::now();
            loop {
                let members: BTreeSet<NodeId> =
                    self.status(idx).await.members.into_iter().collect();
                if members == expected {
                    break;
                }
                if start.elapsed() > SETTLE_TIMEOUT {
                    panic!(
                        "node {} sees {:?}, expected {:?}",
                        node.id, members, expected
                    );
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    pub fn running_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.is_running())
            .map(|node| node.id)
            .collect()
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| !node.departed)
            .map(|node| node.id)
            .collect()
    }

    /// Running nodes whose store holds `key`, in id order.
    pub fn holders(&self, key: Key) -> Vec<NodeId> {
        let mut holders: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|node| node.is_running() && node.item(key).is_some())
            .map(|node| node.id)
            .collect();
        holders.sort();
        holders
    }

    pub fn index_of(&self, id: NodeId) -> usize {
        self.nodes
            .iter()
            .position(|node| node.id == id)
            .expect("id should belong to the cluster")
    }
}
