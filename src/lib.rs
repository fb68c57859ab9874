//! forking-hello: a thread-per-connection hello world server.
//!
//! Every accepted connection is handed to its own worker thread, which
//! answers with a fixed response and exits. Exited workers raise a
//! completion event and are reaped in bulk by a background reclaimer, so the
//! accept loop never waits on them.

pub mod client;
pub mod config;
pub mod reclaimer;
pub mod server;
pub mod table;
pub mod worker;

pub use config::Config;
pub use server::Server;
