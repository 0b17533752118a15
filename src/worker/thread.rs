//! A dedicated OS thread that drains a [`Worker`].
//!
//! Applications with their own main loop can call
//! [`Worker::process_tasks`] from it directly. Otherwise, a
//! [`WorkerThread`] runs that loop on a thread of its own:
//!
//! ```
//! use hypha::{worker::{self, thread::WorkerThread}, Mode, TaskList};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! let worker = worker::new(Mode::Threaded);
//! let thread = WorkerThread::spawn(worker.clone())?;
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let mut list = TaskList::new();
//! for _ in 0..3 {
//!     let counter = counter.clone();
//!     list.push(move || {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     });
//! }
//! list.submit(&*worker).wait();
//! assert_eq!(counter.load(Ordering::Relaxed), 3);
//!
//! let stats = thread.shutdown()?;
//! assert_eq!(stats.drained, 1);
//! # Ok::<(), hypha::Error>(())
//! ```
use super::{Stats, Worker};
use crate::{
    loom::sync::atomic::{AtomicBool, Ordering::*},
    Error,
};
use alloc::sync::Arc;
use maitake_sync::util::Backoff;
use std::thread::{self, JoinHandle};

/// Configures a [`WorkerThread`] before spawning it.
#[derive(Debug, Default)]
#[must_use]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

/// A thread that repeatedly drains a [`Worker`] until it is shut down.
///
/// Shutting the thread down (with [`WorkerThread::shutdown`], or by dropping
/// it) lets it finish every list that was already submitted before it exits.
/// Lists submitted after that point stay queued, and waiting on them will
/// spin until something else drains the worker.
#[derive(Debug)]
pub struct WorkerThread {
    shutdown: Arc<AtomicBool>,
    /// Only taken by `shutdown` or `drop`.
    handle: Option<JoinHandle<Stats>>,
}

// === impl Builder ===

impl Builder {
    /// The name given to worker threads when none is configured.
    pub const DEFAULT_NAME: &'static str = "hypha-worker";

    /// Returns a new `Builder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the worker thread.
    ///
    /// Defaults to [`Builder::DEFAULT_NAME`].
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the size of the worker thread's stack, in bytes.
    ///
    /// Defaults to the platform's default, as with [`std::thread::spawn`].
    pub fn stack_size(self, size: usize) -> Self {
        Self {
            stack_size: Some(size),
            ..self
        }
    }

    /// Spawns a thread that drains `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the thread could not be spawned.
    pub fn spawn(self, worker: Arc<dyn Worker>) -> Result<WorkerThread, Error> {
        let name = self
            .name
            .unwrap_or_else(|| Self::DEFAULT_NAME.to_string());
        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = builder
            .spawn({
                let shutdown = shutdown.clone();
                move || run(&*worker, &shutdown)
            })
            .map_err(Error::Spawn)?;

        tracing::debug!(thread.name = %name, "spawned worker thread");
        Ok(WorkerThread {
            shutdown,
            handle: Some(handle),
        })
    }
}

// === impl WorkerThread ===

impl WorkerThread {
    /// Spawns a thread that drains `worker`, with the default configuration.
    ///
    /// This is shorthand for `Builder::new().spawn(worker)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the thread could not be spawned.
    pub fn spawn(worker: Arc<dyn Worker>) -> Result<Self, Error> {
        Builder::new().spawn(worker)
    }

    /// Returns a new [`Builder`] for configuring a worker thread.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Returns the underlying thread, if it is still running.
    #[must_use]
    pub fn thread(&self) -> Option<&thread::Thread> {
        self.handle.as_ref().map(JoinHandle::thread)
    }

    /// Stops the worker thread, after it has drained every list submitted so
    /// far, and waits for it to exit.
    ///
    /// Returns the worker's [`Stats`] as of the moment the thread exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Panicked`] if a task panicked on the worker thread.
    pub fn shutdown(mut self) -> Result<Stats, Error> {
        self.join()
    }

    fn join(&mut self) -> Result<Stats, Error> {
        self.shutdown.store(true, Release);
        let handle = self
            .handle
            .take()
            .expect("the worker thread's handle is only taken once, by `shutdown` or `drop`");
        handle.join().map_err(|_| Error::Panicked)
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }

        if let Err(error) = self.join() {
            tracing::error!(%error, "worker thread exited abnormally");
        }
    }
}

// === worker loop ===

fn run(worker: &dyn Worker, shutdown: &AtomicBool) -> Stats {
    tracing::info!(mode = ?worker.mode(), "worker thread started");

    let mut boff = Backoff::new();
    let mut idle_spins = 0u8;
    loop {
        if worker.process_tasks() {
            boff = Backoff::new();
            idle_spins = 0;
            continue;
        }

        if shutdown.load(Acquire) {
            break;
        }

        // back off exponentially for a while, then start yielding the
        // thread instead of burning CPU time.
        if idle_spins < Backoff::DEFAULT_MAX_EXPONENT {
            boff.spin();
            idle_spins += 1;
        } else {
            thread::yield_now();
        }
    }

    // anything submitted before shutdown was requested still has to run.
    let mut drained = 0usize;
    while worker.process_tasks() {
        drained += 1;
    }

    let stats = worker.stats();
    tracing::info!(
        drained_on_shutdown = drained,
        stats.submitted,
        stats.drained,
        stats.tasks_run,
        "worker thread stopped"
    );
    stats
}
