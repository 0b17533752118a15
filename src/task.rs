//! Tasks, task lists, and the handles used to wait for them.
//!
//! A [`Task`] is a single unit of work: a closure that runs once, on whichever
//! thread drains it. Producers collect tasks into a [`TaskList`], which is
//! handed to a [`Worker`] as a whole. The list's tasks always run in the order
//! they were pushed, back to back, without tasks from any other list running
//! in between.
//!
//! Submitting a list returns a [`Pending`] handle. The handle and the
//! submitted list share the list's completion flag, which the worker sets once
//! the last task has returned. Dropping the handle is fine: the list still
//! runs, the producer just gives up the means to wait for it.
//!
//! A list moves through three states, in order, and never back:
//!
//! 1. *created*: a [`TaskList`] owned by the producer, which may push tasks;
//! 2. *submitted*: [`TaskList::submit`] consumed the list, and the producer
//!    holds a [`Pending`] whose [`is_complete`](Pending::is_complete) is
//!    `false`;
//! 3. *completed*: a worker drained the list, and
//!    [`is_complete`](Pending::is_complete) returns `true` from then on.
//!
//! [`Worker`]: crate::Worker
use crate::{completion::Completion, loom::sync::Arc, worker::Worker};
use alloc::{boxed::Box, vec::Vec};
use core::{any::type_name, fmt};

/// A single unit of work.
///
/// A `Task` wraps a closure which is called exactly once, on the thread that
/// drains the [`TaskList`] it belongs to. That may be a different thread than
/// the one that created it, so the closure must be [`Send`].
///
/// Any `FnOnce() + Send + 'static` closure converts into a `Task`, so most
/// APIs taking a task accept a closure directly.
pub struct Task {
    run: Box<dyn FnOnce() + Send + 'static>,
    kind: &'static str,
}

/// An ordered batch of [`Task`]s, submitted to a worker as a unit.
///
/// See the [module-level documentation](self) for details.
#[must_use = "a `TaskList` does nothing unless it is submitted to a worker"]
pub struct TaskList {
    tasks: Vec<Task>,
    done: Arc<Completion>,
}

/// A producer's handle to a submitted [`TaskList`].
///
/// This is returned by [`TaskList::submit`], and can be used to check whether
/// the list has been drained, or to block until it has.
pub struct Pending {
    done: Arc<Completion>,
}

// === impl Task ===

impl Task {
    /// Returns a new `Task` that will call `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            run: Box::new(f),
            kind: type_name::<F>(),
        }
    }

    /// Returns a new `Task` that will call `f` with `arg`.
    ///
    /// The argument is moved into the task, and is dropped once `f` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypha::Task;
    /// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    ///
    /// fn bump(counter: Arc<AtomicUsize>) {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// }
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let task = Task::with_arg(bump, counter.clone());
    /// # drop(task);
    /// ```
    pub fn with_arg<A>(f: fn(A), arg: A) -> Self
    where
        A: Send + 'static,
    {
        Self {
            run: Box::new(move || f(arg)),
            kind: type_name::<fn(A)>(),
        }
    }

    #[inline]
    pub(crate) fn run(self) {
        (self.run)()
    }
}

impl<F> From<F> for Task
where
    F: FnOnce() + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("kind", &self.kind).finish()
    }
}

// === impl TaskList ===

impl TaskList {
    /// Returns a new, empty `TaskList`.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Returns a new, empty `TaskList` with room for `capacity` tasks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
            done: Arc::new(Completion::new()),
        }
    }

    /// Appends a task to the end of the list.
    ///
    /// Tasks run in the order they were pushed.
    pub fn push(&mut self, task: impl Into<Task>) {
        self.tasks.push(task.into());
    }

    /// Returns the number of tasks in the list.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no tasks have been pushed to the list.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Submits this list to `worker`, returning a [`Pending`] handle that can
    /// be used to wait for it to complete.
    ///
    /// This never waits for the list to run. With a
    /// [threaded](crate::worker::ThreadedWorker) worker, the list is queued
    /// until the worker's loop drains it. With an
    /// [inline](crate::worker::InlineWorker) worker, the list has already run
    /// by the time this returns.
    ///
    /// An empty list is valid, and completes as soon as it is drained.
    pub fn submit<W>(self, worker: &W) -> Pending
    where
        W: Worker + ?Sized,
    {
        // hold on to the flag before the list goes away.
        let pending = Pending {
            done: self.done.clone(),
        };
        worker.add_task_list(self);
        pending
    }

    /// Runs every task in the list in push order, then sets the list's
    /// completion flag. Returns the number of tasks that ran.
    pub(crate) fn run(self) -> usize {
        let Self { tasks, done } = self;
        let _span = tracing::debug_span!("task_list", list.tasks = tasks.len()).entered();

        let mut ran = 0;
        for task in tasks {
            tracing::trace!(task.idx = ran, task.kind = task.kind, "running task");
            task.run();
            ran += 1;
        }

        done.complete();
        tracing::trace!(ran, "task list complete");
        ran
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Task> for TaskList {
    fn from(task: Task) -> Self {
        let mut list = Self::with_capacity(1);
        list.push(task);
        list
    }
}

impl<T: Into<Task>> FromIterator<T> for TaskList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<T: Into<Task>> Extend<T> for TaskList {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.tasks.extend(iter.into_iter().map(Into::into));
    }
}

impl fmt::Debug for TaskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskList")
            .field("tasks", &self.tasks)
            .field("done", &self.done)
            .finish()
    }
}

// === impl Pending ===

impl Pending {
    /// Returns `true` if the list has been drained by a worker.
    ///
    /// If this returns `true`, all of the list's tasks have run, and their
    /// effects are visible to the calling thread.
    #[must_use]
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.done.is_complete()
    }

    /// Blocks the current thread until the list has been drained.
    ///
    /// Once this returns, every effect of every task in the list is visible
    /// to the calling thread.
    ///
    /// This waits by spinning, yielding the thread between checks. If nothing
    /// is calling [`Worker::process_tasks`] on the worker the list was
    /// submitted to, this never returns. In particular, calling `wait` on the
    /// thread that is supposed to drain the worker will spin forever. With an
    /// [inline](crate::worker::InlineWorker) worker, the list already ran
    /// during [`TaskList::submit`], and this returns immediately.
    pub fn wait(&self) {
        if self.is_complete() {
            return;
        }

        let _span = tracing::trace_span!("wait").entered();
        self.done.wait();
        tracing::trace!("task list completed");
    }

    /// Blocks the current thread until the list has been drained, or until
    /// `timeout` has elapsed.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the list completed. As with [`Pending::wait`], all of
    ///   its tasks' effects are visible to the calling thread.
    /// - [`Err(Error::TimedOut)`](crate::Error::TimedOut) if the list did not
    ///   complete in time. It is still submitted, and will run when the
    ///   worker gets to it.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> Result<(), crate::Error> {
        if self.done.wait_timeout(timeout) {
            Ok(())
        } else {
            tracing::debug!(?timeout, "timed out waiting for task list");
            Err(crate::Error::TimedOut)
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("complete", &self.is_complete())
            .finish()
    }
}
