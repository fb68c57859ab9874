//! TCP server: listener setup and the accept loop.
//!
//! The accept loop hands every connection to a freshly spawned worker
//! thread and goes straight back to accepting. Finished workers are
//! collected by the reclaimer, never by the loop itself.

use crate::config::Config;
use crate::reclaimer::{self, CompletionSignal, Reclaimer};
use crate::table::WorkerTable;
use crate::worker::{self, Handler, HelloWorld};
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::{error, info, trace};

/// Source of accepted connections.
pub trait Acceptor {
    /// Block until a connection is accepted.
    fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

impl Acceptor for Socket {
    fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (socket, addr) = Socket::accept(self)?;
        let peer = addr.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "peer is not an IP address")
        })?;
        Ok((socket.into(), peer))
    }
}

/// Spawns one worker per accepted connection.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    workers: Arc<WorkerTable>,
    signal: CompletionSignal,
}

impl<H: Handler> Dispatcher<H> {
    /// Create a dispatcher with its reclaimer already installed.
    pub fn start(handler: H) -> io::Result<Self> {
        let workers = Arc::new(WorkerTable::new());
        let (signal, events) = reclaimer::channel();
        Reclaimer::new(Arc::clone(&workers)).install(events)?;

        Ok(Dispatcher {
            handler: Arc::new(handler),
            workers,
            signal,
        })
    }

    /// Accept connections from `acceptor` until accepting fails.
    ///
    /// Interrupted accepts are retried. Any other accept error, or a failure
    /// to start a worker thread, ends the loop.
    pub fn run<A: Acceptor>(&self, acceptor: &A) -> io::Result<Infallible> {
        loop {
            let (conn, peer) = match acceptor.accept() {
                Ok(accepted) => accepted,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return Err(e);
                }
            };

            // The connection moves into the worker; nothing here keeps a handle.
            let handler = Arc::clone(&self.handler);
            let id = self
                .workers
                .spawn(&self.signal, peer, move || worker::run(&*handler, conn, peer))
                .map_err(|e| {
                    error!(peer = %peer, error = %e, "Failed to spawn worker");
                    e
                })?;

            trace!(worker = id, peer = %peer, "Dispatched connection");
        }
    }

    /// Accepted connections whose workers have not been reclaimed yet.
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }
}

/// Server instance: the listening socket plus its dispatcher.
pub struct Server<H = HelloWorld> {
    listener: Socket,
    dispatcher: Dispatcher<H>,
}

impl Server<HelloWorld> {
    /// Bind the hello world server described by `config`.
    pub fn bind(config: &Config) -> io::Result<Self> {
        Self::with_handler(config, HelloWorld::new(config.read_chunk))
    }
}

impl<H: Handler> Server<H> {
    /// Bind and listen, then install the reclaimer for `handler`'s workers.
    pub fn with_handler(config: &Config, handler: H) -> io::Result<Self> {
        let listener = create_listener(config.listen, config.backlog)?;
        let dispatcher = Dispatcher::start(handler)?;

        info!(
            address = %config.listen,
            backlog = config.backlog,
            "Server listening"
        );

        Ok(Server {
            listener,
            dispatcher,
        })
    }

    /// Run the accept loop. Only returns on a fatal accept error.
    pub fn serve(&self) -> io::Result<Infallible> {
        self.dispatcher.run(&self.listener)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "listener is not an IP socket")
        })
    }

    pub fn live_workers(&self) -> usize {
        self.dispatcher.live_workers()
    }
}

/// Create a blocking TCP listener with SO_REUSEADDR and the given backlog.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<Socket> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket)
}
