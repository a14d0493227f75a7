//! Priority-ordered intrusive task queues.
//!
//! Every task queue in the kernel — the ready queue, and each
//! synchronization primitive's wait queue — is the same data structure: a
//! singly linked list of tasks ordered by ascending priority value
//! (strongest priority first), FIFO among equal priorities. A task carries
//! its own link field ([`crate::task::Tcb::link`]), so membership costs no
//! allocation and a task is never on more than one such queue at a time.

use crate::task::Tcb;

/// A priority-ordered intrusive queue of `&'static Tcb`.
///
/// `Default`-constructed empty; there is no `new` because the const
/// constructor lives on [`Tcb`] alongside the link field it shares with this
/// type.
pub struct TaskQueue {
    head: core::cell::Cell<Option<&'static Tcb>>,
}

impl TaskQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            head: core::cell::Cell::new(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    /// The highest-priority (lowest value) task, without removing it.
    pub fn peek(&self) -> Option<&'static Tcb> {
        self.head.get()
    }

    /// Insert `task`, placing it after every task of strictly greater or
    /// equal priority already queued — i.e. after any existing tasks of the
    /// same priority, preserving FIFO order among ties.
    ///
    /// Takes `&'static self` because it stamps `task` with a back-pointer to
    /// this queue ([`Tcb::set_current_queue`]), so that whoever next touches
    /// `task` — in particular [`crate::sched::Kernel::set_ready`], called
    /// from tick context with no idea which primitive a timed-out task was
    /// waiting on — can unlink it from here before splicing it into another
    /// queue. Without that, reusing `task.link` for a different queue while
    /// the old one still chains through it would corrupt the old queue.
    pub fn add(&'static self, task: &'static Tcb) {
        let prio = task.priority();

        let mut prev: Option<&'static Tcb> = None;
        let mut cur = self.head.get();
        while let Some(c) = cur {
            if c.priority() > prio {
                break;
            }
            prev = Some(c);
            cur = c.link.get();
        }

        task.link.set(cur);
        match prev {
            Some(p) => p.link.set(Some(task)),
            None => self.head.set(Some(task)),
        }
        task.set_current_queue(Some(self));
    }

    /// Remove and return the highest-priority task, if any.
    pub fn pop_front(&self) -> Option<&'static Tcb> {
        let head = self.head.get()?;
        self.head.set(head.link.get());
        head.link.set(None);
        head.set_current_queue(None);
        Some(head)
    }

    /// Remove a specific task from wherever it sits in the queue.
    ///
    /// Returns `true` if `task` was found and unlinked. Used when a wait is
    /// abandoned before being satisfied (e.g. a timed-out semaphore take
    /// must be pulled back out of the semaphore's wait queue).
    pub fn remove(&self, task: &'static Tcb) -> bool {
        let mut prev: Option<&'static Tcb> = None;
        let mut cur = self.head.get();
        while let Some(c) = cur {
            if core::ptr::eq(c, task) {
                match prev {
                    Some(p) => p.link.set(c.link.get()),
                    None => self.head.set(c.link.get()),
                }
                c.link.set(None);
                c.set_current_queue(None);
                return true;
            }
            prev = Some(c);
            cur = c.link.get();
        }
        false
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
