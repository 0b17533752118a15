use crate::loom::sync::atomic::{AtomicBool, Ordering::*};
use core::fmt;
use maitake_sync::util::Backoff;

/// The completion flag of a submitted [`TaskList`](crate::TaskList).
///
/// A `Completion` is shared (in an `Arc`) between the producer's [`Pending`]
/// handle and the list travelling through the worker. It starts out unset,
/// and is set exactly once, by the thread that drains the list, after the
/// list's last task has returned.
///
/// Setting the flag is a `Release` store and every check is an `Acquire`
/// load, so once a waiter observes the flag set, every write made by the
/// list's tasks is visible to it.
///
/// [`Pending`]: crate::Pending
pub(crate) struct Completion {
    done: AtomicBool,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Marks the list as complete.
    ///
    /// Must only be called once, after all of the list's tasks have run.
    pub(crate) fn complete(&self) {
        debug_assert!(
            !self.done.load(Relaxed),
            "a task list's completion flag was set twice! this is a bug in `hypha`."
        );
        self.done.store(true, Release);
    }

    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.done.load(Acquire)
    }

    /// Spins until the flag is set, yielding between checks.
    ///
    /// This never returns if nothing ever drains the list.
    pub(crate) fn wait(&self) {
        let mut boff = Backoff::new();
        while !self.is_complete() {
            relax(&mut boff);
        }
    }

    /// Spins until the flag is set or `timeout` has elapsed. Returns whether
    /// the flag was observed set.
    #[cfg(feature = "std")]
    pub(crate) fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut boff = Backoff::new();
        loop {
            if self.is_complete() {
                return true;
            }

            if std::time::Instant::now() >= deadline {
                // one last look, in case the list finished while we were
                // reading the clock.
                return self.is_complete();
            }

            relax(&mut boff);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.done.load(Relaxed))
            .finish()
    }
}

#[cfg(any(loom, feature = "std"))]
#[inline(always)]
fn relax(_: &mut Backoff) {
    crate::loom::thread::yield_now();
}

// without threads to yield to, spin with an exponential backoff instead.
#[cfg(not(any(loom, feature = "std")))]
#[inline(always)]
fn relax(boff: &mut Backoff) {
    boff.spin();
}
