//! Worker table: the record of every spawned worker thread.
//!
//! Each accepted connection gets one entry, keyed by its slab slot. An entry
//! stays in the table until the reclaimer joins the thread, so the table
//! length is always the number of accepted-but-not-yet-reclaimed connections.
//!
//! Workers announce their own exit through an [`ExitNotice`] that runs as the
//! last thing on the worker thread, on normal return and on panic alike.

use crate::reclaimer::CompletionSignal;
use slab::Slab;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// A spawned worker that has not been reaped yet.
#[derive(Debug)]
struct WorkerEntry {
    handle: JoinHandle<()>,
    peer: SocketAddr,
}

#[derive(Debug, Default)]
struct Inner {
    workers: Slab<WorkerEntry>,
    /// Slots of workers whose body has finished, oldest first.
    exited: VecDeque<usize>,
}

/// Result of a single non-blocking reap attempt.
#[derive(Debug)]
pub enum Reap {
    /// A terminated worker was collected.
    Reaped(Reaped),
    /// Workers exist, but none of them has terminated yet.
    Running,
    /// There are no workers at all.
    Empty,
}

/// A collected worker and how its thread ended.
#[derive(Debug)]
pub struct Reaped {
    pub id: usize,
    pub peer: SocketAddr,
    pub outcome: thread::Result<()>,
}

impl Reaped {
    /// Panic message of a crashed worker, if it panicked with a string payload.
    pub fn panic_message(&self) -> Option<&str> {
        let payload = self.outcome.as_ref().err()?;
        payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    }
}

/// Table of live worker threads.
#[derive(Debug, Default)]
pub struct WorkerTable {
    inner: Mutex<Inner>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A worker panicking never holds this lock, but stay usable if one ever does.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `body` on a new worker thread and record it.
    ///
    /// The table lock is held across the spawn, so the worker's exit notice
    /// can never be observed before its entry exists. Returns as soon as the
    /// thread is started.
    pub fn spawn<F>(
        self: &Arc<Self>,
        signal: &CompletionSignal,
        peer: SocketAddr,
        body: F,
    ) -> io::Result<usize>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        let slot = inner.workers.vacant_entry();
        let id = slot.key();

        let table = Arc::clone(self);
        let signal = signal.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                let _exit = ExitNotice { table, signal, id };
                body();
            })?;

        slot.insert(WorkerEntry { handle, peer });
        Ok(id)
    }

    /// Try to collect one terminated worker without waiting for running ones.
    pub fn try_reap(&self) -> Reap {
        let (id, entry) = {
            let mut inner = self.lock();
            loop {
                if inner.workers.is_empty() {
                    return Reap::Empty;
                }
                let Some(id) = inner.exited.pop_front() else {
                    return Reap::Running;
                };
                if let Some(entry) = inner.workers.try_remove(id) {
                    break (id, entry);
                }
            }
        };

        // The exit notice is the last code the worker runs, so this join
        // only waits for the thread itself to be torn down.
        let outcome = entry.handle.join();
        Reap::Reaped(Reaped {
            id,
            peer: entry.peer,
            outcome,
        })
    }

    /// Number of workers not yet reclaimed, running or exited.
    pub fn len(&self) -> usize {
        self.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().workers.is_empty()
    }

    /// Number of workers that have exited but were not reaped yet.
    pub fn exited(&self) -> usize {
        self.lock().exited.len()
    }
}

/// Drop guard living on the worker thread; records the exit and raises a
/// completion event.
struct ExitNotice {
    table: Arc<WorkerTable>,
    signal: CompletionSignal,
    id: usize,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        self.table.lock().exited.push_back(self.id);
        self.signal.raise();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reclaimer;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn wait_for_exits(table: &WorkerTable, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.exited() < n {
            assert!(Instant::now() < deadline, "workers did not exit in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_empty_table() {
        let table = WorkerTable::new();
        assert!(table.is_empty());
        assert!(matches!(table.try_reap(), Reap::Empty));
    }

    #[test]
    fn test_running_worker_is_not_reaped() {
        let table = Arc::new(WorkerTable::new());
        let (signal, _events) = reclaimer::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        table
            .spawn(&signal, peer(), move || {
                let _ = release_rx.recv();
            })
            .unwrap();

        assert!(matches!(table.try_reap(), Reap::Running));
        assert_eq!(table.len(), 1);

        release_tx.send(()).unwrap();
        wait_for_exits(&table, 1);

        match table.try_reap() {
            Reap::Reaped(reaped) => {
                assert_eq!(reaped.id, 0);
                assert_eq!(reaped.peer, peer());
                assert!(reaped.outcome.is_ok());
            }
            other => panic!("expected a reaped worker, got {other:?}"),
        }
        assert!(matches!(table.try_reap(), Reap::Empty));
    }

    #[test]
    fn test_panicked_worker_is_reaped() {
        let table = Arc::new(WorkerTable::new());
        let (signal, _events) = reclaimer::channel();

        table
            .spawn(&signal, peer(), || panic!("boom"))
            .unwrap();
        wait_for_exits(&table, 1);

        match table.try_reap() {
            Reap::Reaped(reaped) => {
                assert!(reaped.outcome.is_err());
                assert_eq!(reaped.panic_message(), Some("boom"));
            }
            other => panic!("expected a reaped worker, got {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_worker_threads_are_named_by_slot() {
        let table = Arc::new(WorkerTable::new());
        let (signal, _events) = reclaimer::channel();
        let (name_tx, name_rx) = mpsc::channel();

        table
            .spawn(&signal, peer(), move || {
                let name = thread::current().name().map(str::to_owned);
                name_tx.send(name).unwrap();
            })
            .unwrap();

        assert_eq!(name_rx.recv().unwrap().as_deref(), Some("worker-0"));
    }
}
