//! Condition variables.

use crate::critical::CriticalSection;
use crate::mutex::Mutex;
use crate::port::Port;
use crate::queue::TaskQueue;
use crate::sched::Kernel;
use crate::task::{BlockReason, Tcb, TaskState, WakeupReason};

/// A condition variable, always paired with the [`Mutex`] that protects the
/// condition it signals.
pub struct CondVar<P: Port, const TIMER_QUEUE_CAP: usize> {
    kernel: &'static Kernel<P, TIMER_QUEUE_CAP>,
    mutex: &'static Mutex<P, TIMER_QUEUE_CAP>,
    wait: TaskQueue,
}

impl<P: Port, const TIMER_QUEUE_CAP: usize> CondVar<P, TIMER_QUEUE_CAP> {
    pub const fn new(
        kernel: &'static Kernel<P, TIMER_QUEUE_CAP>,
        mutex: &'static Mutex<P, TIMER_QUEUE_CAP>,
    ) -> Self {
        Self {
            kernel,
            mutex,
            wait: TaskQueue::new(),
        }
    }

    /// Atomically release the paired mutex and block until signalled or
    /// `wait_ticks` elapses, then re-acquire the mutex before returning.
    /// `task` must currently hold the mutex.
    ///
    /// Returns `true` if the wait ended because of a signal/broadcast,
    /// `false` if it timed out. Either way the mutex is held again on
    /// return.
    pub fn wait(&'static self, task: &'static Tcb, wait_ticks: u32) -> bool {
        let _ = self.mutex.unlock(task);

        {
            let cs = CriticalSection::<P>::enter();
            self.wait.add(task);
            self.kernel
                .block_current(cs, task, BlockReason::WaitCondVar, wait_ticks);
        }

        // On a timeout, `Kernel::set_ready` has already unlinked us from
        // `self.wait` via the task's queue back-pointer.
        let signalled = task.wakeup_reason() != WakeupReason::WaitTimeout;

        let _ = self.mutex.lock(task, crate::port::TASK_MAX_WAIT);
        signalled
    }

    /// Wake the highest-priority waiter, if any. Returns whether a task was
    /// woken.
    pub fn signal(&self) -> bool {
        let _cs = CriticalSection::<P>::enter();
        match self.wait.pop_front() {
            Some(task) => {
                self.kernel.set_ready(task, WakeupReason::CondVarSignalled);
                true
            }
            None => false,
        }
    }

    /// Wake every waiter that hasn't since been suspended. Returns whether
    /// the wait queue was non-empty.
    pub fn broadcast(&self) -> bool {
        let _cs = CriticalSection::<P>::enter();
        if self.wait.is_empty() {
            return false;
        }
        while let Some(task) = self.wait.pop_front() {
            if task.state() != TaskState::Suspended {
                self.kernel.set_ready(task, WakeupReason::CondVarSignalled);
            }
        }
        true
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const TIMER_QUEUE_CAP: usize> Sync for CondVar<P, TIMER_QUEUE_CAP> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Kernel;
    use crate::test_support::TestPort;

    fn leak_task(prio: u8) -> &'static Tcb {
        Box::leak(Box::new(Tcb::new(|_| {}, 0, 0, prio)))
    }

    #[test]
    fn signal_wakes_exactly_one_waiter() {
        let idle = leak_task(255);
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle])), idle)));
        let mutex: &'static Mutex<TestPort, 4> = Box::leak(Box::new(Mutex::new(kernel)));
        let cv: &'static CondVar<TestPort, 4> = Box::leak(Box::new(CondVar::new(kernel, mutex)));

        let first = leak_task(50);
        let second = leak_task(50);
        first.enter_blocked(BlockReason::WaitCondVar, crate::port::TASK_MAX_WAIT);
        second.enter_blocked(BlockReason::WaitCondVar, crate::port::TASK_MAX_WAIT);
        cv.wait.add(first);
        cv.wait.add(second);

        assert!(cv.signal());
        assert_eq!(first.wakeup_reason(), WakeupReason::CondVarSignalled);
        assert_eq!(second.state(), TaskState::Blocked);
        assert!(!cv.wait.is_empty());
    }

    #[test]
    fn broadcast_skips_waiters_suspended_in_the_meantime() {
        let idle = leak_task(255);
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle])), idle)));
        let mutex: &'static Mutex<TestPort, 4> = Box::leak(Box::new(Mutex::new(kernel)));
        let cv: &'static CondVar<TestPort, 4> = Box::leak(Box::new(CondVar::new(kernel, mutex)));

        let awake = leak_task(50);
        let suspended = leak_task(50);
        awake.enter_blocked(BlockReason::WaitCondVar, crate::port::TASK_MAX_WAIT);
        suspended.enter_blocked(BlockReason::WaitCondVar, crate::port::TASK_MAX_WAIT);
        cv.wait.add(awake);
        cv.wait.add(suspended);
        // `Kernel::suspend` can't reach a task sitting in a primitive's
        // wait queue, so a suspended waiter stays linked here with its
        // state overwritten directly, same as `Kernel::suspend` would do.
        suspended.set_state(TaskState::Suspended);

        assert!(cv.broadcast());
        assert_eq!(awake.wakeup_reason(), WakeupReason::CondVarSignalled);
        assert_eq!(suspended.state(), TaskState::Suspended);
        assert!(cv.wait.is_empty());
    }
}
