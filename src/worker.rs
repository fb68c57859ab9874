//! Per-connection worker.
//!
//! A worker owns exactly one accepted connection. It performs one bounded
//! read, writes the fixed response and closes. There is no loop to read a
//! complete request: anything past the first chunk is ignored.

use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use tracing::{debug, trace};

/// The response every connection receives.
pub const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\r\nHello, World!\n";

/// What a worker does with its connection.
///
/// Implementations run on the worker thread. Returning an error or panicking
/// ends that worker only.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> io::Result<()>;
}

/// Reads one chunk and answers with [`RESPONSE`].
#[derive(Debug, Clone)]
pub struct HelloWorld {
    read_chunk: usize,
    response: Bytes,
}

impl HelloWorld {
    pub fn new(read_chunk: usize) -> Self {
        Self {
            read_chunk,
            response: Bytes::from_static(RESPONSE),
        }
    }
}

impl Default for HelloWorld {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Handler for HelloWorld {
    fn handle(&self, conn: &mut TcpStream, peer: SocketAddr) -> io::Result<()> {
        let mut request = BytesMut::zeroed(self.read_chunk);
        let n = conn.read(&mut request)?;
        request.truncate(n);

        let current = thread::current();
        debug!(
            peer = %peer,
            worker = current.name().unwrap_or("<unnamed>"),
            bytes = n,
            "Handling request"
        );
        trace!(request = %String::from_utf8_lossy(&request), "Request received");

        conn.write_all(&self.response)
    }
}

/// Worker thread body: serve `conn` with `handler`, then close it.
pub fn run<H: Handler + ?Sized>(handler: &H, mut conn: TcpStream, peer: SocketAddr) {
    if let Err(e) = handler.handle(&mut conn, peer) {
        debug!(peer = %peer, error = %e, "Worker I/O failed");
    }
    drop(conn);
}
