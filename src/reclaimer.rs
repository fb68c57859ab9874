//! Asynchronous reclamation of terminated workers.
//!
//! Workers raise a completion event when they exit. Events travel over a
//! channel with room for a single pending wakeup, so a burst of exits
//! collapses into one event. Because of that, every wakeup drains the
//! worker table until nothing reapable is left instead of reaping just one.

use crate::table::{Reap, WorkerTable};
use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Create a completion channel.
pub fn channel() -> (CompletionSignal, CompletionEvents) {
    let (tx, rx) = mpsc::sync_channel(1);
    (CompletionSignal(tx), CompletionEvents(rx))
}

/// Sending half of the completion channel, held by workers.
#[derive(Debug, Clone)]
pub struct CompletionSignal(SyncSender<()>);

impl CompletionSignal {
    /// Raise a completion event without blocking.
    ///
    /// Returns `false` when the event coalesced into one already pending,
    /// or when nobody is listening anymore.
    pub fn raise(&self) -> bool {
        match self.0.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Receiving half of the completion channel, owned by the reclaimer.
#[derive(Debug)]
pub struct CompletionEvents(Receiver<()>);

impl CompletionEvents {
    /// Block until an event arrives. `false` once every signal is gone.
    pub fn wait(&self) -> bool {
        self.0.recv().is_ok()
    }

    /// Consume a pending event, if any.
    pub fn try_take(&self) -> bool {
        self.0.try_recv().is_ok()
    }
}

/// Reaps terminated workers from a [`WorkerTable`].
#[derive(Debug, Clone)]
pub struct Reclaimer {
    workers: Arc<WorkerTable>,
}

impl Reclaimer {
    pub fn new(workers: Arc<WorkerTable>) -> Self {
        Self { workers }
    }

    /// Reap every worker that has already terminated.
    ///
    /// Never waits on a running worker. Returns the number of workers reaped.
    pub fn drain(&self) -> usize {
        let mut reaped = 0;
        loop {
            match self.workers.try_reap() {
                Reap::Reaped(worker) => {
                    reaped += 1;
                    match worker.outcome {
                        Ok(()) => trace!(worker = worker.id, peer = %worker.peer, "Worker reclaimed"),
                        Err(_) => warn!(
                            worker = worker.id,
                            peer = %worker.peer,
                            panic = worker.panic_message().unwrap_or("<non-string payload>"),
                            "Worker crashed"
                        ),
                    }
                }
                Reap::Running | Reap::Empty => break,
            }
        }
        reaped
    }

    /// Install this reclaimer as the handler for `events`.
    ///
    /// The handler runs on its own thread until every [`CompletionSignal`]
    /// has been dropped, then drains one last time and exits.
    pub fn install(self, events: CompletionEvents) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("reclaimer".to_string())
            .spawn(move || {
                while events.wait() {
                    let reaped = self.drain();
                    if reaped > 0 {
                        debug!(reaped, live = self.workers.len(), "Reclaimed workers");
                    }
                }
                self.drain();
                trace!("Completion channel closed, reclaimer exiting");
            })
    }
}
