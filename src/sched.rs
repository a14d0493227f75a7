//! The kernel state singleton: the ready queue, the current task, and the
//! fixed-priority scheduling decision.

use core::cell::Cell;

use crate::critical::CriticalSection;
use crate::port::Port;
use crate::queue::TaskQueue;
use crate::task::{BlockReason, Tcb, TaskState, WakeupReason};
use crate::timer::TimerService;

/// The kernel's process-wide state: the ready queue, the currently running
/// task, and (by way of [`TimerService`]) the software timer list.
///
/// There is exactly one `Kernel` per application, typically held in a
/// `static`. It is generic over the platform [`Port`] and over
/// `TIMER_QUEUE_CAP`, the capacity of the deferred timer-handler queue (see
/// [`crate::timer`]).
pub struct Kernel<P: Port, const TIMER_QUEUE_CAP: usize> {
    /// Every task known to the kernel, fixed at construction. Not a queue —
    /// used only by the tick handler to scan for expiring sleep/wait
    /// timeouts (see [`Tcb::remaining_ticks`]) and by [`Kernel::start`] to
    /// find the idle task.
    tasks: &'static [&'static Tcb],
    ready: TaskQueue,
    current: Cell<Option<&'static Tcb>>,
    idle: &'static Tcb,
    pub(crate) timers: TimerService<P, TIMER_QUEUE_CAP>,
    _port: core::marker::PhantomData<P>,
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const TIMER_QUEUE_CAP: usize> Sync for Kernel<P, TIMER_QUEUE_CAP> {}

impl<P: Port, const TIMER_QUEUE_CAP: usize> Kernel<P, TIMER_QUEUE_CAP> {
    /// Build the kernel state. `tasks` must list every task that will ever
    /// run, including `idle` and the timer service's own task; `idle` must
    /// also appear in `tasks`.
    pub const fn new(tasks: &'static [&'static Tcb], idle: &'static Tcb) -> Self {
        Self {
            tasks,
            ready: TaskQueue::new(),
            current: Cell::new(None),
            idle,
            timers: TimerService::new(),
            _port: core::marker::PhantomData,
        }
    }

    /// The task currently owning the CPU, if the scheduler has started.
    pub fn current_task(&self) -> Option<&'static Tcb> {
        self.current.get()
    }

    /// Add `task` to the ready queue. Used at boot to bring up every
    /// statically defined task (including internal ones, like the timer
    /// service's task and the idle task) before [`Kernel::start`].
    pub fn start_task(&'static self, task: &'static Tcb) {
        let _cs = CriticalSection::<P>::enter();
        task.set_state(TaskState::Ready);
        self.ready.add(task);
    }

    /// Mark `task` ready again after a block, recording why it woke. If it
    /// was counted down for a timeout, that accounting is cleared. If `task`
    /// is still linked into a primitive's wait queue — as it is when woken
    /// by a timeout rather than by that primitive itself — it's unlinked
    /// from there first, via its queue back-pointer, before joining the
    /// ready queue; a task's `link` field can only ever serve one queue at a
    /// time.
    pub(crate) fn set_ready(&'static self, task: &'static Tcb, reason: WakeupReason) {
        if let Some(q) = task.current_queue() {
            q.remove(task);
        }
        task.clear_wait_bookkeeping();
        task.set_state(TaskState::Ready);
        task.set_wakeup_reason(reason);
        self.ready.add(task);
    }

    /// Block the calling task. The caller must already have placed `task`
    /// on the relevant primitive's wait queue (if any) before calling this;
    /// `task_block` only transitions state and reschedules.
    ///
    /// Must be called with interrupts already disabled, and releases them
    /// (via `cs`) before requesting the actual context switch. The
    /// scheduling decision itself happens exactly once, inside
    /// `yield_now`'s own critical section — `task`'s state is already
    /// `Blocked` by the time that runs, so it won't be re-added to the
    /// ready queue.
    pub(crate) fn block_current(
        &'static self,
        cs: CriticalSection<P>,
        task: &'static Tcb,
        reason: BlockReason,
        ticks: u32,
    ) {
        task.enter_blocked(reason, ticks);
        drop(cs);
        self.yield_now();
    }

    /// Run the fixed-priority scheduling decision: if the head of the ready
    /// queue is strictly better-or-equal priority than whatever is
    /// currently running, swap them. Must be called with interrupts
    /// disabled.
    pub(crate) fn schedule(&'static self) {
        let Some(next) = self.ready.peek() else {
            return;
        };

        match self.current.get() {
            Some(cur) if cur.state() == TaskState::Running => {
                if next.priority() > cur.priority() {
                    // Current task still has strictly better priority than
                    // anything ready; nothing to do.
                    return;
                }
                cur.set_state(TaskState::Ready);
                self.ready.add(cur);
            }
            _ => {}
        }

        let next = self.ready.pop_front().expect("peeked above");
        next.set_state(TaskState::Running);
        self.current.set(Some(next));

        // SAFETY: interrupts are disabled by the caller's critical section.
        unsafe { P::trigger_switch() };
    }

    /// Voluntarily give up the CPU. Privileged builds can disable
    /// interrupts and reschedule inline; unprivileged ones must trap
    /// through a supervisor call to regain the privilege needed to touch
    /// kernel state.
    pub fn yield_now(&'static self) {
        if P::TASKS_RUN_PRIV {
            let _cs = CriticalSection::<P>::enter();
            self.schedule();
        } else {
            self.supervisor_yield();
        }
    }

    /// Reschedule from a context that is already privileged and holds no
    /// critical section of its own — the supervisor-call trap handler, for
    /// unprivileged builds.
    fn supervisor_yield(&'static self) {
        let _cs = CriticalSection::<P>::enter();
        self.schedule();
    }

    /// Put the calling task to sleep for `ticks` timer ticks. Returns once
    /// the sleep expires or the task is otherwise resumed.
    pub fn sleep(&'static self, task: &'static Tcb, ticks: u32) {
        let cs = CriticalSection::<P>::enter();
        self.block_current(cs, task, BlockReason::Sleep, ticks);
    }

    /// Remove `task` from scheduling entirely until [`Kernel::resume`].
    ///
    /// If `task` is currently blocked on a primitive's wait queue, it stays
    /// there — suspension only ever pulls a task out of the ready queue,
    /// since that is the only queue `Kernel` has visibility into. A
    /// primitive that later goes to wake a suspended-while-waiting task
    /// must check for and skip `TaskState::Suspended`, as
    /// `CondVar::broadcast` does.
    pub fn suspend(&'static self, task: &'static Tcb) {
        let _cs = CriticalSection::<P>::enter();

        let was_running = self.current.get().map_or(false, |c| core::ptr::eq(c, task));
        if !was_running {
            self.ready.remove(task);
        }
        task.set_state(TaskState::Suspended);

        if was_running {
            self.schedule();
        }
    }

    /// Resume a previously suspended task.
    pub fn resume(&'static self, task: &'static Tcb) {
        let _cs = CriticalSection::<P>::enter();
        if task.state() == TaskState::Suspended {
            self.set_ready(task, WakeupReason::Resumed);
            self.schedule();
        }
    }

    /// Change `task`'s effective priority, repositioning it in the ready
    /// queue if it's currently sitting in one so queue order stays
    /// priority-sorted. Used by priority inheritance: a mutex boosts its
    /// owner's priority on contended lock, and restores it on unlock. If
    /// `task` is instead sitting in a primitive's wait queue, the caller
    /// (the primitive) is responsible for repositioning it there — `Kernel`
    /// doesn't know which wait queue, if any, that is.
    ///
    /// Must be called with interrupts already disabled.
    pub(crate) fn set_task_priority(&'static self, task: &'static Tcb, new_priority: u8) {
        if task.state() == TaskState::Ready {
            self.ready.remove(task);
            task.set_priority(new_priority);
            self.ready.add(task);
        } else {
            task.set_priority(new_priority);
        }
    }

    /// The periodic tick handler: advances software timers, expires any
    /// task sleep/wait timeouts, and re-runs the scheduling decision.
    /// Intended to be called from the platform's tick interrupt with
    /// interrupts already disabled.
    pub fn tick(&'static self) {
        self.timers.process(self);

        for &task in self.tasks {
            if task.state() != TaskState::Blocked {
                continue;
            }
            let remaining = task.remaining_ticks();
            if remaining == 0 {
                // no timeout armed (e.g. MAX_WAIT, or an untimed block)
                continue;
            }
            let remaining = remaining - 1;
            task.set_remaining_ticks(remaining);
            if remaining == 0 {
                let reason = if task.block_reason() == BlockReason::Sleep {
                    WakeupReason::SleepTimeout
                } else {
                    WakeupReason::WaitTimeout
                };
                self.set_ready(task, reason);
            }
        }

        self.schedule();
    }

    /// Start the scheduler: bring up the idle task if it isn't already
    /// ready, pick the highest-priority ready task, and drop into task
    /// execution. Never returns.
    ///
    /// # Safety
    /// Must be called exactly once, before any other `Kernel` method, from
    /// the platform's reset/init code with interrupts disabled and no task
    /// code having run yet.
    pub unsafe fn start(&'static self) -> ! {
        if self.idle.state() == TaskState::Suspended {
            self.start_task(self.idle);
        }

        let first = self.ready.pop_front().expect("idle task is always ready");
        first.set_state(TaskState::Running);
        self.current.set(Some(first));

        P::set_stack_pointer(first.stack_pointer());
        P::switch_to_task_mode(P::TASKS_RUN_PRIV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestPort;

    fn leak_task(entry: fn(usize), prio: u8) -> &'static Tcb {
        Box::leak(Box::new(Tcb::new(entry, 0, 0, prio)))
    }

    fn noop(_: usize) {}

    #[test]
    fn equal_priority_tasks_round_robin() {
        let idle = leak_task(noop, 255);
        let a = leak_task(noop, 10);
        let b = leak_task(noop, 10);
        let c = leak_task(noop, 10);
        let tasks: &'static [&'static Tcb] = Box::leak(Box::new([idle, a, b, c]));
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(tasks, idle)));

        kernel.start_task(idle);
        kernel.start_task(a);
        kernel.start_task(b);
        kernel.start_task(c);

        kernel.schedule();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), a));

        kernel.yield_now();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), b));

        kernel.yield_now();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), c));

        kernel.yield_now();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), a));
    }

    #[test]
    fn tick_preempts_onto_a_higher_priority_task_woken_by_timeout() {
        let idle = leak_task(noop, 255);
        let low = leak_task(noop, 200);
        let high = leak_task(noop, 10);
        let tasks: &'static [&'static Tcb] = Box::leak(Box::new([idle, low, high]));
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(tasks, idle)));

        kernel.start_task(idle);
        kernel.start_task(low);
        kernel.schedule();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), low));

        // `high` sleeps for 3 ticks while `low` keeps running.
        high.set_state(TaskState::Blocked);
        high.enter_blocked(BlockReason::Sleep, 3);

        kernel.tick();
        kernel.tick();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), low));

        kernel.tick();
        assert_eq!(high.wakeup_reason(), WakeupReason::SleepTimeout);
        assert!(core::ptr::eq(kernel.current_task().unwrap(), high));
    }

    #[test]
    fn suspend_removes_a_ready_task_and_resume_restores_it() {
        let idle = leak_task(noop, 255);
        let a = leak_task(noop, 10);
        let tasks: &'static [&'static Tcb] = Box::leak(Box::new([idle, a]));
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(tasks, idle)));

        kernel.start_task(idle);
        kernel.start_task(a);
        kernel.suspend(a);
        assert_eq!(a.state(), TaskState::Suspended);

        kernel.schedule();
        assert!(core::ptr::eq(kernel.current_task().unwrap(), idle));

        kernel.resume(a);
        assert_eq!(a.wakeup_reason(), WakeupReason::Resumed);
        assert!(core::ptr::eq(kernel.current_task().unwrap(), a));
    }
}
