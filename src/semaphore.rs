//! Counting semaphores.

use core::cell::Cell;

use crate::critical::CriticalSection;
use crate::error::{GiveError, TakeError};
use crate::port::Port;
use crate::queue::TaskQueue;
use crate::sched::Kernel;
use crate::task::{BlockReason, Tcb, WakeupReason};

/// A counting semaphore.
///
/// Giving a unit while a task is already waiting hands it directly to that
/// task rather than incrementing the count and letting the waiter discover
/// it later — `count` only ever reflects units nobody is yet waiting for.
pub struct Semaphore<P: Port, const TIMER_QUEUE_CAP: usize> {
    kernel: &'static Kernel<P, TIMER_QUEUE_CAP>,
    count: Cell<u32>,
    max_count: u32,
    wait: TaskQueue,
}

impl<P: Port, const TIMER_QUEUE_CAP: usize> Semaphore<P, TIMER_QUEUE_CAP> {
    pub const fn new(kernel: &'static Kernel<P, TIMER_QUEUE_CAP>, initial_count: u32, max_count: u32) -> Self {
        Self {
            kernel,
            count: Cell::new(initial_count),
            max_count,
            wait: TaskQueue::new(),
        }
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// Take a unit, waiting up to `wait_ticks` if none is immediately
    /// available.
    pub fn take(&'static self, task: &'static Tcb, wait_ticks: u32) -> Result<(), TakeError> {
        let cs = CriticalSection::<P>::enter();

        if self.count.get() != 0 {
            self.count.set(self.count.get() - 1);
            return Ok(());
        }

        if wait_ticks == crate::port::TASK_NO_WAIT {
            return Err(TakeError::WouldBlock);
        }

        self.wait.add(task);
        self.kernel
            .block_current(cs, task, BlockReason::WaitSemaphore, wait_ticks);

        if task.wakeup_reason() == WakeupReason::SemaphoreTaken {
            Ok(())
        } else {
            // A timeout has already unlinked us from `self.wait` by way of
            // `Kernel::set_ready`'s generic queue back-pointer cleanup.
            Err(TakeError::Timeout)
        }
    }

    /// Give a unit back: hand it directly to the highest-priority waiter if
    /// one exists, otherwise increment the count.
    pub fn give(&self) -> Result<(), GiveError> {
        let _cs = CriticalSection::<P>::enter();

        if self.count.get() == self.max_count {
            return Err(GiveError::Overflow);
        }

        match self.wait.pop_front() {
            Some(task) => self.kernel.set_ready(task, WakeupReason::SemaphoreTaken),
            None => self.count.set(self.count.get() + 1),
        }
        Ok(())
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const TIMER_QUEUE_CAP: usize> Sync for Semaphore<P, TIMER_QUEUE_CAP> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Kernel;
    use crate::task::TaskState;
    use crate::test_support::TestPort;

    fn leak_task(prio: u8) -> &'static Tcb {
        Box::leak(Box::new(Tcb::new(|_| {}, 0, 0, prio)))
    }

    fn leak_kernel(tasks: &'static [&'static Tcb], idle: &'static Tcb) -> &'static Kernel<TestPort, 4> {
        Box::leak(Box::new(Kernel::new(tasks, idle)))
    }

    #[test]
    fn take_decrements_and_give_increments_when_nobody_waits() {
        let idle = leak_task(255);
        let kernel = leak_kernel(Box::leak(Box::new([idle])), idle);
        let sem: &'static Semaphore<TestPort, 4> = Box::leak(Box::new(Semaphore::new(kernel, 1, 3)));

        assert_eq!(sem.take(idle, crate::port::TASK_NO_WAIT), Ok(()));
        assert_eq!(sem.count(), 0);
        assert_eq!(sem.give(), Ok(()));
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn take_without_a_unit_and_no_wait_fails_fast() {
        let idle = leak_task(255);
        let kernel = leak_kernel(Box::leak(Box::new([idle])), idle);
        let sem: &'static Semaphore<TestPort, 4> = Box::leak(Box::new(Semaphore::new(kernel, 0, 3)));

        assert_eq!(sem.take(idle, crate::port::TASK_NO_WAIT), Err(TakeError::WouldBlock));
    }

    #[test]
    fn give_overflow_is_rejected() {
        let idle = leak_task(255);
        let kernel = leak_kernel(Box::leak(Box::new([idle])), idle);
        let sem: &'static Semaphore<TestPort, 4> = Box::leak(Box::new(Semaphore::new(kernel, 2, 2)));

        assert_eq!(sem.give(), Err(GiveError::Overflow));
    }

    #[test]
    fn give_hands_a_unit_directly_to_a_waiter_without_touching_count() {
        let idle = leak_task(255);
        let waiter = leak_task(50);
        let kernel = leak_kernel(Box::leak(Box::new([idle, waiter])), idle);
        let sem: &'static Semaphore<TestPort, 4> = Box::leak(Box::new(Semaphore::new(kernel, 0, 3)));

        waiter.enter_blocked(BlockReason::WaitSemaphore, crate::port::TASK_MAX_WAIT);
        sem.wait.add(waiter);

        assert_eq!(sem.give(), Ok(()));
        assert_eq!(sem.count(), 0);
        assert_eq!(waiter.state(), TaskState::Ready);
        assert_eq!(waiter.wakeup_reason(), WakeupReason::SemaphoreTaken);
    }
}
