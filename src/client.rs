//! Load-generating test client.
//!
//! Each client opens all of its connections at once and sends the fixed
//! request on every one. By default responses are never read, so the server
//! cannot rely on its peers draining what it writes.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::worker::RESPONSE;

/// The request every connection sends.
pub const REQUEST: &[u8] = b"GET /hello HTTP/1.1\r\nHost: localhost:8888\r\n\r\n";

/// Shape of a load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub target: SocketAddr,
    pub max_clients: usize,
    pub max_conns: usize,
    /// Read every response to EOF and check it.
    pub read_responses: bool,
}

/// Per-run connection counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub connected: usize,
    pub sent: usize,
    pub verified: usize,
    pub failed: usize,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.connected += other.connected;
        self.sent += other.sent;
        self.verified += other.verified;
        self.failed += other.failed;
    }
}

/// How far a single connection got.
enum Progress {
    Sent(TcpStream),
    Verified(TcpStream),
}

/// Run `config.max_clients` clients concurrently and sum their reports.
pub async fn run(config: &LoadConfig) -> LoadReport {
    let mut clients = JoinSet::new();
    for client in 0..config.max_clients {
        clients.spawn(run_client(client, config.clone()));
    }

    let mut report = LoadReport::default();
    while let Some(result) = clients.join_next().await {
        match result {
            Ok(client_report) => report.merge(client_report),
            Err(e) => warn!(error = %e, "Client task failed"),
        }
    }
    report
}

async fn run_client(client: usize, config: LoadConfig) -> LoadReport {
    let mut conns = JoinSet::new();
    for _ in 0..config.max_conns {
        conns.spawn(open_connection(config.target, config.read_responses));
    }

    let mut report = LoadReport::default();
    // Keep every socket open until the whole batch has been sent.
    let mut open = Vec::with_capacity(config.max_conns);
    while let Some(result) = conns.join_next().await {
        match result {
            Ok(Ok(Progress::Sent(stream))) => {
                report.connected += 1;
                report.sent += 1;
                open.push(stream);
            }
            Ok(Ok(Progress::Verified(stream))) => {
                report.connected += 1;
                report.sent += 1;
                report.verified += 1;
                open.push(stream);
            }
            Ok(Err(e)) => {
                debug!(client, error = %e, "Connection failed");
                report.failed += 1;
            }
            Err(e) => {
                warn!(client, error = %e, "Connection task failed");
                report.failed += 1;
            }
        }
    }

    debug!(client, connected = report.connected, "Client finished");
    report
}

async fn open_connection(target: SocketAddr, read_response: bool) -> io::Result<Progress> {
    let mut stream = TcpStream::connect(target).await?;
    stream.write_all(REQUEST).await?;

    if !read_response {
        return Ok(Progress::Sent(stream));
    }

    let mut response = Vec::with_capacity(RESPONSE.len());
    stream.read_to_end(&mut response).await?;
    if response != RESPONSE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected response: {:?}", String::from_utf8_lossy(&response)),
        ));
    }
    Ok(Progress::Verified(stream))
}
