//! Workers: the consumers of submitted [`TaskList`]s.
//!
//! A [`Worker`] accepts task lists from any number of producer threads, and
//! runs them when its owner calls [`Worker::process_tasks`]. This crate never
//! drives that loop itself; it is expected to run on a single, dedicated
//! thread owned by the application (once per frame, say), or on a
//! [`WorkerThread`](thread::WorkerThread) spawned for it.
//!
//! There are two implementations, picked once when the worker is built:
//!
//! - [`ThreadedWorker`] queues submitted lists, and runs them on whichever
//!   thread calls [`process_tasks`](Worker::process_tasks).
//! - [`InlineWorker`] runs each list on the submitting thread, before
//!   [`TaskList::submit`] returns. This is for targets without threads, where
//!   nothing would ever drain a queue.
//!
//! Producer code should be written against `&dyn Worker` (or a generic `W:
//! Worker`), so that it works the same way with either.
//!
//! # Ordering
//!
//! - The tasks in a list run in the order they were pushed, one after the
//!   other, on the thread draining the worker.
//! - Tasks from two different lists never interleave: a list runs to
//!   completion before the next list starts.
//! - A [`ThreadedWorker`] runs lists in the order they were submitted. Lists
//!   submitted concurrently from different threads run in the order in which
//!   their submissions took the worker's push lock.
use crate::{
    loom::sync::atomic::{AtomicUsize, Ordering::*},
    queue::TaskQueue,
    task::{Task, TaskList},
};
use alloc::sync::Arc;
use core::fmt;
use maitake_sync::blocking::Mutex;

feature! {
    #![feature = "std"]
    pub mod thread;
}

/// Accepts [`TaskList`]s from producers, and runs them.
///
/// See the [module-level documentation](self) for details.
pub trait Worker: Send + Sync {
    /// Submits a list to this worker, without keeping a way to wait for it.
    ///
    /// Most callers want [`TaskList::submit`] instead, which calls this and
    /// returns a [`Pending`](crate::Pending) handle.
    ///
    /// This may be called from any number of threads at once.
    fn add_task_list(&self, list: TaskList);

    /// Drains a single submitted list, if there is one.
    ///
    /// Returns `true` if a list was drained: all of its tasks ran, in push
    /// order, and its completion flag is now set. Returns `false` if there
    /// was nothing to drain, in which case no tasks ran.
    ///
    /// This is meant to be called repeatedly by the loop that owns the
    /// worker, and only from one thread at a time.
    fn process_tasks(&self) -> bool;

    /// Returns which kind of worker this is.
    fn mode(&self) -> Mode;

    /// Returns counters describing what this worker has done so far.
    fn stats(&self) -> Stats;

    /// Submits a single task, and returns immediately.
    ///
    /// There is no way to wait for the task to run.
    fn add_single_task(&self, task: Task) {
        self.add_task_list(TaskList::from(task));
    }

    /// Submits a single task, and blocks until it has run.
    ///
    /// Once this returns, every effect of the task is visible to the calling
    /// thread.
    ///
    /// As with [`Pending::wait`](crate::Pending::wait), this spins forever
    /// if nothing is draining the worker, including when it is called from
    /// the thread that is supposed to drain it.
    fn process_single_task(&self, task: Task) {
        TaskList::from(task).submit(self).wait();
    }
}

/// Selects which [`Worker`] implementation to build.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Submitted lists are queued, and run by whichever thread calls
    /// [`Worker::process_tasks`]. See [`ThreadedWorker`].
    Threaded,
    /// Submitted lists run inline, on the submitting thread. See
    /// [`InlineWorker`].
    Inline,
}

/// Counters describing what a [`Worker`] has done.
///
/// These are diagnostics. They are updated with relaxed atomics, so a
/// snapshot taken while producers or the worker loop are running may be
/// slightly out of date.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct Stats {
    /// The total number of lists submitted to the worker.
    pub submitted: usize,

    /// The number of submitted lists that have been drained.
    ///
    /// Once every submitted list has run, this is equal to `self.submitted`.
    pub drained: usize,

    /// The total number of tasks run by the worker.
    pub tasks_run: usize,
}

/// A [`Worker`] that queues submitted lists until they are drained by
/// [`Worker::process_tasks`].
///
/// Submitting is safe from any number of threads at once; the queue is
/// protected by a push lock. Draining should happen on a single thread.
pub struct ThreadedWorker {
    push_lock: Mutex<()>,
    queue: TaskQueue,
    counters: Counters,
}

/// A [`Worker`] that runs each submitted list immediately, on the submitting
/// thread.
///
/// Nothing is ever queued, so [`Worker::process_tasks`] always returns
/// `false`, and [`Pending::wait`](crate::Pending::wait) always returns
/// immediately.
pub struct InlineWorker {
    counters: Counters,
}

#[derive(Debug)]
struct Counters {
    submitted: AtomicUsize,
    drained: AtomicUsize,
    tasks_run: AtomicUsize,
}

/// Returns a new [`Worker`] of the kind selected by `mode`.
///
/// # Examples
///
/// ```
/// use hypha::{worker, Mode, TaskList};
///
/// let worker = worker::new(Mode::Inline);
///
/// let mut list = TaskList::new();
/// list.push(|| println!("hello from the worker!"));
/// list.submit(&*worker).wait();
/// ```
#[must_use]
pub fn new(mode: Mode) -> Arc<dyn Worker> {
    tracing::debug!(?mode, "building worker");
    match mode {
        Mode::Threaded => Arc::new(ThreadedWorker::new()),
        Mode::Inline => Arc::new(InlineWorker::new()),
    }
}

// === impl Mode ===

impl Default for Mode {
    /// Returns [`Mode::Threaded`] when the "std" feature is enabled, and
    /// [`Mode::Inline`] otherwise.
    fn default() -> Self {
        if cfg!(feature = "std") {
            Self::Threaded
        } else {
            Self::Inline
        }
    }
}

// === impl Stats ===

impl Stats {
    /// Returns the number of submitted lists that have not been drained yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.submitted.saturating_sub(self.drained)
    }
}

// === impl ThreadedWorker ===

impl ThreadedWorker {
    /// Returns a new `ThreadedWorker` with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            push_lock: Mutex::new(()),
            queue: TaskQueue::new(),
            counters: Counters::new(),
        }
    }
}

impl Worker for ThreadedWorker {
    fn add_task_list(&self, list: TaskList) {
        let tasks = list.len();
        self.counters.submitted.fetch_add(1, Relaxed);
        self.push_lock.with_lock(|_| self.queue.push(list));
        tracing::trace!(list.tasks = tasks, "task list queued");
    }

    fn process_tasks(&self) -> bool {
        let Some(list) = self.queue.pop() else {
            return false;
        };

        let ran = list.run();
        self.counters.record_drain(ran);
        true
    }

    fn mode(&self) -> Mode {
        Mode::Threaded
    }

    fn stats(&self) -> Stats {
        self.counters.snapshot()
    }
}

impl Default for ThreadedWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedWorker")
            .field("queue", &self.queue)
            .field("stats", &self.stats())
            .finish()
    }
}

// === impl InlineWorker ===

impl InlineWorker {
    /// Returns a new `InlineWorker`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Counters::new(),
        }
    }
}

impl Worker for InlineWorker {
    fn add_task_list(&self, list: TaskList) {
        self.counters.submitted.fetch_add(1, Relaxed);
        let ran = list.run();
        self.counters.record_drain(ran);
    }

    fn process_tasks(&self) -> bool {
        false
    }

    fn mode(&self) -> Mode {
        Mode::Inline
    }

    fn stats(&self) -> Stats {
        self.counters.snapshot()
    }
}

impl Default for InlineWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InlineWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineWorker")
            .field("stats", &self.stats())
            .finish()
    }
}

// === impl Counters ===

impl Counters {
    fn new() -> Self {
        Self {
            submitted: AtomicUsize::new(0),
            drained: AtomicUsize::new(0),
            tasks_run: AtomicUsize::new(0),
        }
    }

    fn record_drain(&self, ran: usize) {
        let drained = self.drained.fetch_add(1, Relaxed) + 1;
        let tasks_run = self.tasks_run.fetch_add(ran, Relaxed) + ran;
        tracing::debug!(list.tasks = ran, drained, tasks_run, "drained task list");
    }

    fn snapshot(&self) -> Stats {
        Stats {
            submitted: self.submitted.load(Relaxed),
            drained: self.drained.load(Relaxed),
            tasks_run: self.tasks_run.load(Relaxed),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::Pending;
    use proptest::prelude::*;
    use std::sync::Mutex as StdMutex;

    fn counting(counter: &Arc<AtomicUsize>, n: usize) -> TaskList {
        (0..n)
            .map(|_| {
                let counter = counter.clone();
                move || {
                    counter.fetch_add(1, Relaxed);
                }
            })
            .collect()
    }

    #[test]
    fn drain_runs_list_once() {
        let _trace = crate::test_util::trace_init();
        let worker = ThreadedWorker::new();
        let x = Arc::new(AtomicUsize::new(0));

        let pending = counting(&x, 3).submit(&worker);
        assert!(!pending.is_complete());
        assert_eq!(x.load(Relaxed), 0);

        assert!(worker.process_tasks());
        assert_eq!(x.load(Relaxed), 3);
        assert!(pending.is_complete());

        // nothing left to drain.
        assert!(!worker.process_tasks());
        assert_eq!(x.load(Relaxed), 3);
    }

    #[test]
    fn drain_completes_only_the_drained_list() {
        let _trace = crate::test_util::trace_init();
        let worker = ThreadedWorker::new();

        let first = TaskList::new().submit(&worker);
        let second = TaskList::new().submit(&worker);
        assert!(!first.is_complete());
        assert!(!second.is_complete());

        assert!(worker.process_tasks());
        assert!(first.is_complete());
        assert!(!second.is_complete());

        assert!(worker.process_tasks());
        assert!(second.is_complete());
    }

    #[test]
    fn lists_drain_in_submission_order() {
        let _trace = crate::test_util::trace_init();
        let worker = ThreadedWorker::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let pending: Vec<Pending> = (0..5)
            .map(|i| {
                let log = log.clone();
                TaskList::from(Task::new(move || log.lock().unwrap().push(i))).submit(&worker)
            })
            .collect();

        while worker.process_tasks() {}
        assert!(pending.iter().all(Pending::is_complete));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn add_single_task_does_not_wait() {
        let worker = ThreadedWorker::new();
        let x = Arc::new(AtomicUsize::new(0));

        let x2 = x.clone();
        worker.add_single_task(Task::new(move || {
            x2.fetch_add(1, Relaxed);
        }));
        // returned without anything draining the worker.
        assert_eq!(x.load(Relaxed), 0);
        assert_eq!(worker.stats().pending(), 1);

        assert!(worker.process_tasks());
        assert_eq!(x.load(Relaxed), 1);
    }

    #[test]
    fn process_single_task_observes_effects() {
        let _trace = crate::test_util::trace_init();
        let worker = Arc::new(ThreadedWorker::new());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let drainer = crate::loom::thread::spawn({
            let worker = worker.clone();
            let stop = stop.clone();
            move || {
                while !stop.load(Acquire) {
                    if !worker.process_tasks() {
                        std::thread::yield_now();
                    }
                }
            }
        });

        for i in 0..16 {
            let slot = Arc::new(StdMutex::new(None));
            let s = slot.clone();
            worker.process_single_task(Task::new(move || *s.lock().unwrap() = Some(i)));
            assert_eq!(*slot.lock().unwrap(), Some(i));
        }

        stop.store(true, Release);
        drainer.join().unwrap();
    }

    #[test]
    fn inline_runs_during_submit() {
        let _trace = crate::test_util::trace_init();
        let worker = InlineWorker::new();
        let x = Arc::new(AtomicUsize::new(0));

        let pending = counting(&x, 3).submit(&worker);
        assert_eq!(x.load(Relaxed), 3);
        assert!(pending.is_complete());
        pending.wait();

        // nothing is ever queued.
        assert!(!worker.process_tasks());
    }

    #[test]
    fn stats_count_lists_and_tasks() {
        let worker = ThreadedWorker::new();
        let x = Arc::new(AtomicUsize::new(0));

        let _a = counting(&x, 2).submit(&worker);
        let _b = counting(&x, 3).submit(&worker);
        assert_eq!(
            worker.stats(),
            Stats {
                submitted: 2,
                drained: 0,
                tasks_run: 0,
            }
        );

        assert!(worker.process_tasks());
        assert_eq!(worker.stats().pending(), 1);
        assert!(worker.process_tasks());
        assert_eq!(
            worker.stats(),
            Stats {
                submitted: 2,
                drained: 2,
                tasks_run: 5,
            }
        );
    }

    #[test]
    fn new_selects_mode() {
        assert_eq!(new(Mode::Threaded).mode(), Mode::Threaded);
        assert_eq!(new(Mode::Inline).mode(), Mode::Inline);
        #[cfg(feature = "std")]
        assert_eq!(Mode::default(), Mode::Threaded);
    }

    proptest! {
        #[test]
        fn tasks_run_in_push_order(n in 0usize..64) {
            let worker = ThreadedWorker::new();
            let log = Arc::new(StdMutex::new(Vec::with_capacity(n)));

            let list: TaskList = (0..n)
                .map(|i| {
                    let log = log.clone();
                    move || log.lock().unwrap().push(i)
                })
                .collect();
            prop_assert_eq!(list.len(), n);

            let pending = list.submit(&worker);
            prop_assert!(!pending.is_complete());
            prop_assert!(worker.process_tasks());
            prop_assert!(pending.is_complete());
            prop_assert_eq!(&*log.lock().unwrap(), &(0..n).collect::<Vec<_>>());
        }

        #[test]
        fn lists_never_interleave(sizes in proptest::collection::vec(0usize..8, 1..8)) {
            let worker = ThreadedWorker::new();
            let log = Arc::new(StdMutex::new(Vec::new()));

            for (list_idx, &size) in sizes.iter().enumerate() {
                let list: TaskList = (0..size)
                    .map(|task_idx| {
                        let log = log.clone();
                        move || log.lock().unwrap().push((list_idx, task_idx))
                    })
                    .collect();
                let _ = list.submit(&worker);
            }

            while worker.process_tasks() {}

            let expected: Vec<_> = sizes
                .iter()
                .enumerate()
                .flat_map(|(list_idx, &size)| (0..size).map(move |task_idx| (list_idx, task_idx)))
                .collect();
            prop_assert_eq!(&*log.lock().unwrap(), &expected);
        }
    }
}

#[cfg(all(test, loom))]
mod loom {
    use super::*;
    use crate::loom::{self, sync::Arc, thread};

    #[test]
    fn wait_observes_task_effects() {
        loom::model(|| {
            let worker = Arc::new(ThreadedWorker::new());
            let value = Arc::new(AtomicUsize::new(0));

            let drainer = thread::spawn({
                let worker = worker.clone();
                move || {
                    while !worker.process_tasks() {
                        thread::yield_now();
                    }
                }
            });

            let mut list = TaskList::new();
            let v = value.clone();
            list.push(move || v.store(42, Relaxed));
            let pending = list.submit(&*worker);

            pending.wait();
            // the completion flag's release/acquire pair makes the task's
            // relaxed store visible here.
            assert_eq!(value.load(Relaxed), 42);

            drainer.join().unwrap();
        })
    }

    #[test]
    fn concurrent_lists_do_not_interleave() {
        let mut model = loom::model::Builder::new();
        model.preemption_bound = Some(2);
        model.check(|| {
            let worker = Arc::new(ThreadedWorker::new());
            let log = Arc::new(loom::sync::Mutex::new(Vec::new()));

            let producers: Vec<_> = (0..2)
                .map(|producer| {
                    let worker = worker.clone();
                    let log = log.clone();
                    thread::spawn(move || {
                        let list: TaskList = (0..2)
                            .map(|task| {
                                let log = log.clone();
                                move || log.lock().unwrap().push((producer, task))
                            })
                            .collect();
                        let _ = list.submit(&*worker);
                    })
                })
                .collect();

            let mut drained = 0;
            while drained < 2 {
                if worker.process_tasks() {
                    drained += 1;
                } else {
                    thread::yield_now();
                }
            }

            for producer in producers {
                producer.join().unwrap();
            }

            let log = log.lock().unwrap();
            assert_eq!(log.len(), 4);
            for batch in log.chunks(2) {
                assert_eq!(batch[0].0, batch[1].0, "lists interleaved: {:?}", *log);
                assert_eq!((batch[0].1, batch[1].1), (0, 1));
            }
        })
    }
}
