//! ~~Mutices~~ Mutexes, with optional priority inheritance.

use core::cell::Cell;

use crate::critical::CriticalSection;
use crate::error::{LockError, UnlockError};
use crate::port::Port;
use crate::queue::TaskQueue;
use crate::sched::Kernel;
use crate::task::{BlockReason, Tcb, WakeupReason};

/// A mutex: mutual exclusion with an owning task and, when the
/// `priority_inheritance` feature is enabled, dynamic priority inheritance.
///
/// Unlike a semaphore, a mutex has an owner: only the task that locked it
/// may unlock it, and locking it twice from the same task without an
/// intervening unlock is a logic error this mutex doesn't defend against
/// either (nested ownership accounting is out of scope — see the
/// crate-level docs).
pub struct Mutex<P: Port, const TIMER_QUEUE_CAP: usize> {
    kernel: &'static Kernel<P, TIMER_QUEUE_CAP>,
    locked: Cell<bool>,
    owner: Cell<Option<&'static Tcb>>,
    /// The owner's priority before it was boosted by inheritance, or `None`
    /// if no boost is currently in effect. Restored verbatim on unlock —
    /// there is deliberately no accounting for a task holding more than one
    /// boosted mutex at once (a priority-inverting task that acquires a
    /// second inheriting mutex while already boosted will have its
    /// pre-boost priority overwritten with whatever was first recorded).
    owner_default_priority: Cell<Option<u8>>,
    wait: TaskQueue,
}

impl<P: Port, const TIMER_QUEUE_CAP: usize> Mutex<P, TIMER_QUEUE_CAP> {
    pub const fn new(kernel: &'static Kernel<P, TIMER_QUEUE_CAP>) -> Self {
        Self {
            kernel,
            locked: Cell::new(false),
            owner: Cell::new(None),
            owner_default_priority: Cell::new(None),
            wait: TaskQueue::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn owner(&self) -> Option<&'static Tcb> {
        self.owner.get()
    }

    /// Lock the mutex, waiting up to `wait_ticks` ([`crate::port::TASK_NO_WAIT`]
    /// to not wait, [`crate::port::TASK_MAX_WAIT`] to wait forever) if it's
    /// already held.
    pub fn lock(&'static self, task: &'static Tcb, wait_ticks: u32) -> Result<(), LockError> {
        let cs = CriticalSection::<P>::enter();

        #[cfg(feature = "priority_inheritance")]
        if let Some(owner) = self.owner.get() {
            if task.priority() < owner.priority() {
                if self.owner_default_priority.get().is_none() {
                    self.owner_default_priority.set(Some(owner.priority()));
                }
                self.kernel.set_task_priority(owner, task.priority());
            }
        }

        if !self.locked.get() {
            self.locked.set(true);
            self.owner.set(Some(task));
            return Ok(());
        }

        if wait_ticks == crate::port::TASK_NO_WAIT {
            return Err(LockError::WouldBlock);
        }

        self.wait.add(task);
        self.kernel
            .block_current(cs, task, BlockReason::WaitMutex, wait_ticks);

        let _cs = CriticalSection::<P>::enter();
        if task.wakeup_reason() == WakeupReason::MutexLocked && self.owner.get().map_or(false, |o| core::ptr::eq(o, task))
        {
            Ok(())
        } else {
            // On a genuine timeout, `Kernel::set_ready` already unlinked us
            // from `self.wait` (via the task's queue back-pointer) before
            // waking us, so there's nothing left here to clean up.
            Err(LockError::Timeout)
        }
    }

    /// Try to lock without waiting; equivalent to
    /// `lock(task, TASK_NO_WAIT)`.
    pub fn try_lock(&'static self, task: &'static Tcb) -> Result<(), LockError> {
        self.lock(task, crate::port::TASK_NO_WAIT)
    }

    /// Unlock the mutex. `task` must be the current owner.
    pub fn unlock(&self, task: &'static Tcb) -> Result<(), UnlockError> {
        let cs = CriticalSection::<P>::enter();

        if !self.owner.get().map_or(false, |o| core::ptr::eq(o, task)) {
            return Err(UnlockError::NotOwner);
        }
        if !self.locked.get() {
            return Err(UnlockError::NotLocked);
        }

        if let Some(default_priority) = self.owner_default_priority.take() {
            self.kernel.set_task_priority(task, default_priority);
        }

        let mut switch_required = false;
        match self.wait.pop_front() {
            Some(next_owner) => {
                self.owner.set(Some(next_owner));
                self.kernel.set_ready(next_owner, WakeupReason::MutexLocked);
                if next_owner.priority() <= task.priority() {
                    switch_required = true;
                }
            }
            None => {
                self.locked.set(false);
                self.owner.set(None);
            }
        }

        drop(cs);
        if switch_required {
            self.kernel.yield_now();
        }
        Ok(())
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const TIMER_QUEUE_CAP: usize> Sync for Mutex<P, TIMER_QUEUE_CAP> {}
