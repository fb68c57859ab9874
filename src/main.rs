//! forking-hello: answers every TCP connection with a fixed greeting.
//!
//! Features:
//! - One isolated worker thread per connection
//! - Asynchronous reclamation of finished workers
//! - Configuration via CLI arguments or TOML file

use forking_hello::{Config, Server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        read_chunk = config.read_chunk,
        pid = std::process::id(),
        "Starting forking-hello server"
    );

    let server = Server::bind(&config)?;

    match server.serve() {
        Ok(never) => match never {},
        Err(e) => {
            error!(error = %e, "Server stopped");
            Err(e.into())
        }
    }
}
