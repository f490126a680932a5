use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ringstore::membership::types::NodeId;
use ringstore::node::client::spawn_node;
use ringstore::node::handlers::router;
use ringstore::node::types::{NodeConfig, StartupCommand, mailbox};
use ringstore::storage::file::FileStorage;
use ringstore::transport::Transport;
use ringstore::transport::udp::UdpTransport;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "ringstore", about = "Replicated ring key-value store node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the first node of a new ring.
    Bootstrap(NodeArgs),
    /// Join an existing ring through a member.
    Join(ContactArgs),
    /// Rejoin after a crash, keeping the stored records.
    Recover(ContactArgs),
}

#[derive(Debug, Args)]
struct ContactArgs {
    /// Peer address of any current member.
    #[arg(long, env = "RINGSTORE_CONTACT")]
    contact: SocketAddr,

    #[command(flatten)]
    node: NodeArgs,
}

#[derive(Debug, Args)]
struct NodeArgs {
    /// Peer (UDP) address. The node id is derived from it, so it must be a
    /// concrete address peers can reach, not 0.0.0.0.
    #[arg(long, env = "RINGSTORE_BIND")]
    bind: SocketAddr,

    /// Client HTTP address. Defaults to the peer port + 1000.
    #[arg(long, env = "RINGSTORE_HTTP")]
    http: Option<SocketAddr>,

    /// Directory holding the node's record store.
    #[arg(long, env = "RINGSTORE_STORAGE", default_value = "storage")]
    storage: PathBuf,

    /// Read quorum (R).
    #[arg(short = 'R', long = "read-quorum", env = "RINGSTORE_READ_QUORUM", default_value_t = 2)]
    read_quorum: usize,

    /// Write quorum (W).
    #[arg(short = 'W', long = "write-quorum", env = "RINGSTORE_WRITE_QUORUM", default_value_t = 2)]
    write_quorum: usize,

    /// Replication factor (N).
    #[arg(short = 'N', long = "replication", env = "RINGSTORE_REPLICATION", default_value_t = 3)]
    replication: usize,

    /// Per-phase request timeout in milliseconds.
    #[arg(long = "timeout-ms", env = "RINGSTORE_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,
}

impl NodeArgs {
    fn config(&self) -> NodeConfig {
        NodeConfig::new(self.read_quorum, self.write_quorum, self.replication)
            .with_request_timeout(Duration::from_millis(self.timeout_ms))
    }

    fn http_addr(&self) -> SocketAddr {
        self.http
            .unwrap_or_else(|| SocketAddr::new(self.bind.ip(), self.bind.port() + 1000))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let (args, command) = match cli.command {
        Command::Bootstrap(node) => (node, StartupCommand::Bootstrap),
        Command::Join(ContactArgs { contact, node }) => (node, StartupCommand::Join { contact }),
        Command::Recover(ContactArgs { contact, node }) => {
            (node, StartupCommand::Recover { contact })
        }
    };

    let config = args.config();
    config.validate().context("bad startup configuration")?;

    tracing::info!("Starting node on {} ({:?})", args.bind, command);
    tracing::info!(
        "R={} W={} N={} timeout={:?}",
        config.read_quorum,
        config.write_quorum,
        config.replication,
        config.request_timeout
    );

    // 1. Transport (UDP):
    let (tx, rx) = mailbox();
    let mut transport = UdpTransport::bind(args.bind, tx.clone()).await?;
    let handle = transport.local_handle();
    let drained = transport.take_drained();

    // 2. Storage:
    let id = NodeId::from_addr(&handle.addr);
    let storage = FileStorage::open(&args.storage, id)
        .with_context(|| format!("failed to open storage in {}", args.storage.display()))?;
    tracing::info!("Node ID: {} storage: {}", id, storage.path().display());

    // 3. Node loop:
    let runtime = spawn_node(config, transport, storage, (tx, rx), command)?;

    // 4. HTTP server:
    let http_addr = args.http_addr();
    let app = router(runtime.client.clone());
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        finished = runtime.task => {
            finished?;
            // Hand-off datagrams may still be queued.
            if let Some(drained) = drained {
                let _ = drained.await;
            }
            tracing::info!("Node left the ring, shutting down");
        }
    }

    Ok(())
}
