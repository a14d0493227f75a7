//! Software timers and the deferred handler-dispatch service built on top of
//! them.
//!
//! A timer's countdown is driven from the tick interrupt, which cannot
//! afford to run arbitrary, possibly-blocking user handler code with
//! interrupts disabled. Instead, an expiring timer's handler is pushed onto
//! a fixed-capacity queue and run later by a dedicated task — the highest
//! priority task in the system — so handler execution happens in ordinary,
//! preemptible task context. This mirrors the reference timer service's
//! split between `processTimers` (tick context, cheap) and `timerTask`
//! (task context, runs the handlers), except the handler queue here is a
//! fixed-capacity ring buffer rather than a malloc'd linked list: timers are
//! a tick-path service, and tick paths don't allocate.

use core::cell::Cell;

use arrayvec::ArrayVec;

use crate::critical::CriticalSection;
use crate::port::Port;
use crate::sched::Kernel;
use crate::task::{BlockReason, Tcb, WakeupReason};

/// Whether a timer fires once or keeps reloading its own interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Periodic,
}

/// A software timer.
///
/// Like a [`Tcb`](crate::task::Tcb), a `Timer` is created once as a `'static`
/// value and started/stopped by reference; there is no dynamic timer
/// allocation.
pub struct Timer {
    handler: fn(),
    interval_ticks: Cell<u32>,
    ticks_to_expire: Cell<u32>,
    mode: Cell<TimerMode>,
    running: Cell<bool>,
    next: Cell<Option<&'static Timer>>,
}

impl Timer {
    pub const fn new(handler: fn(), mode: TimerMode) -> Self {
        Self {
            handler,
            interval_ticks: Cell::new(0),
            ticks_to_expire: Cell::new(0),
            mode: Cell::new(mode),
            running: Cell::new(false),
            next: Cell::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl Sync for Timer {}

/// The timer list and the deferred-handler queue, owned by [`Kernel`].
///
/// `CAP` bounds how many expired-but-not-yet-run handlers can be queued at
/// once; a tick that would overflow it drops the oldest expiry and the
/// timer's own interval reload still happens; a sustained overrun should be
/// treated as a sign the timer task's priority or handler cost needs
/// revisiting, not something the kernel can absorb silently forever.
pub struct TimerService<P: Port, const CAP: usize> {
    list: Cell<Option<&'static Timer>>,
    handlers: critical::HandlerQueue<CAP>,
    /// The dedicated task that drains `handlers`. Set once by
    /// [`TimerService::bind_task`] before the scheduler starts.
    task: Cell<Option<&'static Tcb>>,
    _port: core::marker::PhantomData<P>,
}

mod critical {
    use super::*;

    /// A fixed-capacity FIFO of pending handlers, guarded only by the
    /// caller already holding the kernel's critical section — there is no
    /// separate lock here, matching every other piece of kernel state.
    pub struct HandlerQueue<const CAP: usize> {
        inner: core::cell::RefCell<ArrayVec<fn(), CAP>>,
    }

    impl<const CAP: usize> HandlerQueue<CAP> {
        pub const fn new() -> Self {
            Self {
                inner: core::cell::RefCell::new(ArrayVec::new_const()),
            }
        }

        pub fn push(&self, handler: fn()) -> bool {
            let mut q = self.inner.borrow_mut();
            if q.is_full() {
                false
            } else {
                q.push(handler);
                true
            }
        }

        pub fn pop(&self) -> Option<fn()> {
            let mut q = self.inner.borrow_mut();
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        }

        pub fn is_empty(&self) -> bool {
            self.inner.borrow().is_empty()
        }
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const CAP: usize> Sync for TimerService<P, CAP> {}

impl<P: Port, const CAP: usize> TimerService<P, CAP> {
    pub const fn new() -> Self {
        Self {
            list: Cell::new(None),
            handlers: critical::HandlerQueue::new(),
            task: Cell::new(None),
            _port: core::marker::PhantomData,
        }
    }

    /// Register the task that will run queued handlers. Must be called
    /// once, before the scheduler starts.
    pub fn bind_task(&self, task: &'static Tcb) {
        self.task.set(Some(task));
    }

    /// Start (or restart) `timer` with the given interval. A no-op if the
    /// timer is already running: callers that want to change the interval
    /// must `stop` first.
    pub fn start(&self, timer: &'static Timer, interval_ticks: u32) {
        let _cs = CriticalSection::<P>::enter();
        if timer.running.get() {
            return;
        }
        timer.running.set(true);
        timer.interval_ticks.set(interval_ticks);
        timer.ticks_to_expire.set(interval_ticks);
        timer.next.set(self.list.get());
        self.list.set(Some(timer));
    }

    /// Stop `timer`, removing it from the running list.
    pub fn stop(&self, timer: &'static Timer) {
        let _cs = CriticalSection::<P>::enter();
        if !timer.running.get() {
            return;
        }
        timer.running.set(false);
        self.unlink(timer);
    }

    fn unlink(&self, timer: &'static Timer) {
        let mut prev: Option<&'static Timer> = None;
        let mut cur = self.list.get();
        while let Some(c) = cur {
            if core::ptr::eq(c, timer) {
                match prev {
                    Some(p) => p.next.set(c.next.get()),
                    None => self.list.set(c.next.get()),
                }
                timer.next.set(None);
                return;
            }
            prev = Some(c);
            cur = c.next.get();
        }
    }

    /// Advance every running timer by one tick, queueing handlers for any
    /// that expire and waking the timer task if it was waiting on one.
    /// Called from [`Kernel::tick`] with interrupts already disabled.
    pub(crate) fn process(&self, kernel: &'static Kernel<P, CAP>) {
        let mut cur = self.list.get();
        while let Some(timer) = cur {
            let next = timer.next.get();

            let remaining = timer.ticks_to_expire.get();
            let remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                self.handlers.push(timer.handler);

                if let Some(task) = self.task.get() {
                    if task.block_reason() == BlockReason::WaitTimer {
                        kernel.set_ready(task, WakeupReason::TimerTimeout);
                    }
                }

                timer.ticks_to_expire.set(timer.interval_ticks.get());
                if timer.mode.get() == TimerMode::OneShot {
                    timer.running.set(false);
                    self.unlink(timer);
                }
            } else {
                timer.ticks_to_expire.set(remaining);
            }

            cur = next;
        }
    }

    /// The timer task's own entry point: drain queued handlers forever,
    /// blocking (with no timeout) whenever the queue runs dry.
    pub fn run_handlers_forever(&self, kernel: &'static Kernel<P, CAP>) {
        let task = self.task.get().expect("TimerService::bind_task not called");
        loop {
            match self.handlers.pop() {
                Some(handler) => handler(),
                None => {
                    let cs = CriticalSection::<P>::enter();
                    if self.handlers.is_empty() {
                        // 0 ticks here means "don't arm a timeout", not
                        // TASK_NO_WAIT's "don't block" — this task blocks
                        // until `TimerService::process` explicitly wakes it.
                        kernel.block_current(cs, task, BlockReason::WaitTimer, 0);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Kernel;
    use crate::task::TaskState;
    use crate::test_support::TestPort;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static FIRE_COUNT: AtomicUsize = AtomicUsize::new(0);

    fn fire() {
        FIRE_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    fn leak_task(prio: u8) -> &'static Tcb {
        Box::leak(Box::new(Tcb::new(|_| {}, 0, 0, prio)))
    }

    /// Drain whatever handlers `process` queued and run them — standing in
    /// for the dedicated timer task, which (being a real blocking loop)
    /// can't be driven synchronously from a single-threaded test.
    fn drain<P: Port, const CAP: usize>(timers: &TimerService<P, CAP>) -> usize {
        let mut n = 0;
        while let Some(handler) = timers.handlers.pop() {
            handler();
            n += 1;
        }
        n
    }

    #[test]
    fn stop_before_expiry_prevents_the_handler_from_firing() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let idle = leak_task(255);
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle])), idle)));
        let timer: &'static Timer = Box::leak(Box::new(Timer::new(fire, TimerMode::OneShot)));

        kernel.timers.start(timer, 5);
        assert!(timer.is_running());
        kernel.timers.stop(timer);
        assert!(!timer.is_running());

        for _ in 0..10 {
            kernel.timers.process(kernel);
        }
        drain(&kernel.timers);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_shot_fires_once_and_stops_itself() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let idle = leak_task(255);
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle])), idle)));
        let timer: &'static Timer = Box::leak(Box::new(Timer::new(fire, TimerMode::OneShot)));

        kernel.timers.start(timer, 3);
        kernel.timers.process(kernel);
        kernel.timers.process(kernel);
        assert!(timer.is_running());
        kernel.timers.process(kernel);
        assert!(!timer.is_running());
        assert_eq!(drain(&kernel.timers), 1);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);

        for _ in 0..5 {
            kernel.timers.process(kernel);
        }
        assert_eq!(drain(&kernel.timers), 0);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_reloads_and_fires_repeatedly() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let idle = leak_task(255);
        let kernel: &'static Kernel<TestPort, 4> = Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle])), idle)));
        let timer: &'static Timer = Box::leak(Box::new(Timer::new(fire, TimerMode::Periodic)));

        kernel.timers.start(timer, 2);
        for _ in 0..6 {
            kernel.timers.process(kernel);
        }
        assert!(timer.is_running());
        assert_eq!(drain(&kernel.timers), 3);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn expiry_wakes_a_timer_task_blocked_waiting_for_it() {
        let idle = leak_task(255);
        let timer_task = leak_task(0);
        let kernel: &'static Kernel<TestPort, 4> =
            Box::leak(Box::new(Kernel::new(Box::leak(Box::new([idle, timer_task])), idle)));
        kernel.timers.bind_task(timer_task);
        let timer: &'static Timer = Box::leak(Box::new(Timer::new(fire, TimerMode::OneShot)));

        timer_task.enter_blocked(BlockReason::WaitTimer, 0);
        kernel.timers.start(timer, 1);
        kernel.timers.process(kernel);

        assert_eq!(timer_task.state(), TaskState::Ready);
        assert_eq!(timer_task.wakeup_reason(), WakeupReason::TimerTimeout);
    }
}
