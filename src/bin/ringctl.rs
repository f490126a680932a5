use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use ringstore::node::protocol::{
    ENDPOINT_LEAVE, ENDPOINT_READ, ENDPOINT_STATUS, ENDPOINT_UPDATE, LeaveResponse, ReadResponse,
    StatusResponse, UpdateRequest, UpdateResponse,
};
use ringstore::storage::types::Key;
use serde::de::DeserializeOwned;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "ringctl", about = "Client for a ringstore node")]
struct Cli {
    /// HTTP base URL of the node coordinating the request.
    #[arg(long, env = "RINGSTORE_NODE", default_value = "http://127.0.0.1:6000")]
    node: String,

    /// Overall HTTP timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Quorum read of a key.
    Read { key: Key },
    /// Write a new value for a key.
    Update { key: Key, value: String },
    /// Ask the node to leave the ring.
    Leave,
    /// Show the node's state and known members.
    Status,
}

/// Outcome of one call, mapped onto the process exit code.
enum Failure {
    Operation(String),
    Unreachable(reqwest::Error),
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        Failure::Unreachable(e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(cli.timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to build HTTP client: {}", e);
            return ExitCode::from(2);
        }
    };
    let base = cli.node.trim_end_matches('/').to_string();

    let result = match cli.command {
        Command::Read { key } => read(&client, &base, key).await,
        Command::Update { key, value } => update(&client, &base, key, value).await,
        Command::Leave => leave(&client, &base).await,
        Command::Status => status(&client, &base).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Operation(message)) => {
            eprintln!("error: {}", message);
            ExitCode::from(1)
        }
        Err(Failure::Unreachable(e)) => {
            eprintln!("node unreachable: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<(StatusCode, T), Failure> {
    let status = response.status();
    let body = response.json::<T>().await?;
    Ok((status, body))
}

fn failed(status: StatusCode, error: Option<String>) -> Failure {
    Failure::Operation(error.unwrap_or_else(|| format!("request failed with {}", status)))
}

async fn read(client: &reqwest::Client, base: &str, key: Key) -> Result<(), Failure> {
    let url = format!("{}{}/{}", base, ENDPOINT_READ, key);
    let (status, body) = decode::<ReadResponse>(client.get(url).send().await?).await?;
    if !status.is_success() {
        return Err(failed(status, body.error));
    }

    match (body.found, body.value, body.version) {
        (true, Some(value), Some(version)) => println!("{} = {} (version {})", key, value, version),
        _ => println!("{} not found", key),
    }
    Ok(())
}

async fn update(
    client: &reqwest::Client,
    base: &str,
    key: Key,
    value: String,
) -> Result<(), Failure> {
    let url = format!("{}{}", base, ENDPOINT_UPDATE);
    let response = client
        .post(url)
        .json(&UpdateRequest { key, value })
        .send()
        .await?;
    let (status, body) = decode::<UpdateResponse>(response).await?;
    if !status.is_success() || !body.success {
        return Err(failed(status, body.error));
    }

    println!(
        "{} updated to version {}",
        key,
        body.version.map_or_else(|| "?".to_string(), |v| v.to_string())
    );
    Ok(())
}

async fn leave(client: &reqwest::Client, base: &str) -> Result<(), Failure> {
    let url = format!("{}{}", base, ENDPOINT_LEAVE);
    let (status, body) = decode::<LeaveResponse>(client.post(url).send().await?).await?;
    if !status.is_success() || !body.success {
        return Err(failed(status, body.error));
    }

    println!("node left the ring");
    Ok(())
}

async fn status(client: &reqwest::Client, base: &str) -> Result<(), Failure> {
    let url = format!("{}{}", base, ENDPOINT_STATUS);
    let (status, body) = decode::<StatusResponse>(client.get(url).send().await?).await?;
    let Some(node) = body.status else {
        return Err(failed(status, body.error));
    };

    println!("node {} is {:?}", node.id, node.state);
    println!("pending requests: {}", node.pending_requests);
    println!("members ({}):", node.members.len());
    for member in node.members {
        println!("  - {}", member);
    }
    Ok(())
}
