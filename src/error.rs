use std::io;

/// Errors returned by the parts of `hypha` that deal with real threads.
///
/// Submitting and draining task lists never fails; an empty queue is not an
/// error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),

    /// A task panicked while the worker thread was draining it.
    ///
    /// The worker thread has exited, and any lists still queued on its
    /// worker will not run unless something else drains them.
    #[error("a task panicked on the worker thread")]
    Panicked,

    /// A task list did not complete before the timeout elapsed.
    #[error("timed out waiting for a task list to complete")]
    TimedOut,
}
