//! Load generator for the forking-hello server.

use clap::Parser;
use forking_hello::client::{self, LoadConfig};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the test client
#[derive(Parser, Debug)]
#[command(name = "hello-client")]
#[command(version = "0.1.0")]
#[command(about = "Opens many connections to a forking-hello server", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "localhost:8888")]
    target: String,

    /// Maximum number of clients
    #[arg(long, default_value_t = 1)]
    max_clients: usize,

    /// Maximum number of connections per client
    #[arg(long, default_value_t = 1024)]
    max_conns: usize,

    /// Read and check every response instead of firing and forgetting
    #[arg(long)]
    read_responses: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let target: SocketAddr = args
        .target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("'{}' did not resolve to an address", args.target))?;

    let config = LoadConfig {
        target,
        max_clients: args.max_clients,
        max_conns: args.max_conns,
        read_responses: args.read_responses,
    };

    info!(
        target = %target,
        clients = config.max_clients,
        conns = config.max_conns,
        "Starting load run"
    );

    let report = client::run(&config).await;

    info!(
        connected = report.connected,
        sent = report.sent,
        verified = report.verified,
        failed = report.failed,
        "Load run finished"
    );

    if report.failed > 0 {
        return Err(format!("{} connections failed", report.failed).into());
    }
    Ok(())
}
