//! The queue of submitted task lists.
//!
//! This is a thin adapter over `cordyceps`' intrusive [`MpscQueue`]: any number
//! of producers may [`push`](TaskQueue::push) concurrently, and a single
//! consumer [`pop`](TaskQueue::pop)s whole [`TaskList`]s in the order they
//! were pushed. The queue never looks inside a list.
use crate::task::TaskList;
use alloc::boxed::Box;
use cordyceps::{
    mpsc_queue::{Links, MpscQueue, TryDequeueError},
    Linked,
};
use core::{fmt, ptr::NonNull};
use maitake_sync::util::Backoff;

pub(crate) struct TaskQueue {
    inner: MpscQueue<Batch>,
}

/// A [`TaskList`] while it sits in a [`TaskQueue`].
pub(crate) struct Batch {
    links: Links<Batch>,
    list: TaskList,
}

// === impl TaskQueue ===

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: MpscQueue::new_with_stub(Batch::new(TaskList::new())),
        }
    }

    /// Pushes a list to the back of the queue.
    ///
    /// Successive pushes from the same thread are always popped in the order
    /// they were pushed.
    pub(crate) fn push(&self, list: TaskList) {
        self.inner.enqueue(Batch::new(list));
    }

    /// Pops the list at the front of the queue, if there is one.
    ///
    /// This does not wait for lists to be pushed. It returns `None` if the
    /// queue is empty, or if another thread is popping from it at the same
    /// time. If a producer is in the middle of a push, this backs off briefly
    /// until that push has landed, rather than reporting the queue as empty.
    pub(crate) fn pop(&self) -> Option<TaskList> {
        let mut boff = Backoff::new();
        loop {
            match self.inner.try_dequeue() {
                Ok(batch) => return Some(batch.list),
                Err(TryDequeueError::Empty) => return None,
                Err(TryDequeueError::Busy) => {
                    tracing::debug!("task queue is already being drained by another thread");
                    return None;
                }
                Err(TryDequeueError::Inconsistent) => boff.spin(),
            }
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("inner", &self.inner)
            .finish()
    }
}

// === impl Batch ===

impl Batch {
    fn new(list: TaskList) -> Box<Self> {
        Box::new(Self {
            links: Links::new(),
            list,
        })
    }
}

unsafe impl Linked<Links<Self>> for Batch {
    type Handle = Box<Self>;

    fn into_ptr(handle: Box<Self>) -> NonNull<Self> {
        NonNull::from(Box::leak(handle))
    }

    /// # Safety
    ///
    /// `ptr` must have come from [`Batch::into_ptr`], and the queue must have
    /// given up its reference to it.
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Box<Self> {
        Box::from_raw(ptr.as_ptr())
    }

    unsafe fn links(target: NonNull<Self>) -> NonNull<Links<Self>> {
        // Safety: `target` points to a live `Batch`, so projecting to one of
        // its fields produces a valid, non-null pointer. A reference is never
        // created, since producers may be writing to the links concurrently.
        let links = core::ptr::addr_of_mut!((*target.as_ptr()).links);
        NonNull::new_unchecked(links)
    }
}
