//! Task control blocks and the task-level operations built on top of them.

use core::cell::Cell;

/// A task's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run, waiting in the ready queue.
    Ready,
    /// Currently the task executing on the CPU.
    Running,
    /// Waiting on a primitive, a timeout, or both.
    Blocked,
    /// Explicitly taken out of scheduling by [`crate::sched::Kernel::suspend`].
    Suspended,
}

/// Why a task most recently entered [`TaskState::Blocked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    None,
    Sleep,
    WaitSemaphore,
    WaitMutex,
    WaitMsgQueueData,
    WaitMsgQueueSpace,
    WaitCondVar,
    WaitTimer,
}

/// Why a task most recently left [`TaskState::Blocked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupReason {
    None,
    WaitTimeout,
    SleepTimeout,
    SemaphoreTaken,
    MutexLocked,
    MsgQueueDataAvailable,
    MsgQueueSpaceAvailable,
    CondVarSignalled,
    TimerTimeout,
    Resumed,
}

/// A statically allocated task control block.
///
/// Tasks are created with [`Tcb::new`] as `'static` values (typically inside
/// a macro-generated `static`, mirroring `TASK_DEFINE`); there is no dynamic
/// task creation. Every mutable field is a `Cell`, not because the kernel is
/// multi-threaded — it isn't — but because a `Tcb` is shared by `&'static`
/// reference from many call sites (the scheduler, the owning wait queue, the
/// task's own code) that all run on the single core, one at a time, with
/// interrupts disabled around any multi-step update. See
/// [`crate::critical::CriticalSection`].
pub struct Tcb {
    entry: fn(usize),
    param: usize,
    sp: Cell<usize>,
    priority: Cell<u8>,
    base_priority: Cell<u8>,
    state: Cell<TaskState>,
    block_reason: Cell<BlockReason>,
    wakeup_reason: Cell<WakeupReason>,
    /// Ticks remaining on an outstanding sleep or wait timeout. Not a queue:
    /// every task's counter is inspected directly by the tick handler's
    /// scan (see `Kernel::tick`), so this field alone realizes what the
    /// data model calls the "blocked-timeout list" — there is no separate
    /// intrusive structure for it, which keeps `link` the task's only
    /// queue-membership pointer at any given instant.
    remaining_ticks: Cell<u32>,
    /// Link used by whichever single queue currently holds this task: the
    /// ready queue, or exactly one primitive's wait queue. Never both.
    pub(crate) link: Cell<Option<&'static Tcb>>,
    /// Back-pointer to whichever [`crate::queue::TaskQueue`] this task is
    /// presently linked into via `link`, if any. Lets code that doesn't know
    /// (or care) which specific wait queue a task came from — chiefly
    /// [`crate::sched::Kernel::set_ready`], woken from tick context on a
    /// timeout — unlink it generically before moving it to the ready queue.
    current_queue: Cell<Option<&'static crate::queue::TaskQueue>>,
}

impl Tcb {
    /// Define a task. `priority` is the task's base (non-inherited)
    /// priority; `param` is passed verbatim to `entry` when the task first
    /// runs. The task starts out [`TaskState::Suspended`] — not on any
    /// queue — until `Kernel::start_task` adds it to the ready queue.
    pub const fn new(entry: fn(usize), param: usize, sp: usize, priority: u8) -> Self {
        Self {
            entry,
            param,
            sp: Cell::new(sp),
            priority: Cell::new(priority),
            base_priority: Cell::new(priority),
            state: Cell::new(TaskState::Suspended),
            block_reason: Cell::new(BlockReason::None),
            wakeup_reason: Cell::new(WakeupReason::None),
            remaining_ticks: Cell::new(0),
            link: Cell::new(None),
            current_queue: Cell::new(None),
        }
    }

    #[inline]
    pub fn entry(&self) -> fn(usize) {
        self.entry
    }

    #[inline]
    pub fn param(&self) -> usize {
        self.param
    }

    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.sp.get()
    }

    #[inline]
    pub fn set_stack_pointer(&self, sp: usize) {
        self.sp.set(sp);
    }

    /// The task's *effective* priority: its base priority, or the priority
    /// it has been boosted to by priority inheritance, whichever is
    /// stronger (numerically smaller).
    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority.get()
    }

    #[inline]
    pub fn base_priority(&self) -> u8 {
        self.base_priority.get()
    }

    #[inline]
    pub(crate) fn set_priority(&self, p: u8) {
        self.priority.set(p);
    }

    #[inline]
    pub(crate) fn set_base_priority(&self, p: u8) {
        self.base_priority.set(p);
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    #[inline]
    pub(crate) fn set_state(&self, s: TaskState) {
        self.state.set(s);
    }

    #[inline]
    pub fn block_reason(&self) -> BlockReason {
        self.block_reason.get()
    }

    #[inline]
    pub fn wakeup_reason(&self) -> WakeupReason {
        self.wakeup_reason.get()
    }

    #[inline]
    pub(crate) fn set_wakeup_reason(&self, r: WakeupReason) {
        self.wakeup_reason.set(r);
    }

    #[inline]
    pub(crate) fn remaining_ticks(&self) -> u32 {
        self.remaining_ticks.get()
    }

    #[inline]
    pub(crate) fn set_remaining_ticks(&self, t: u32) {
        self.remaining_ticks.set(t);
    }

    /// Mark this task blocked, recording why and (if finite) how many ticks
    /// until it times out on its own. `ticks == TASK_MAX_WAIT` means "wait
    /// forever", stored internally as `0` — the same sentinel an untimed
    /// block already uses — so the tick handler's decrement step, which
    /// only touches tasks with `remaining_ticks() > 0`, leaves it alone.
    /// The caller is responsible for having already placed the task on the
    /// relevant primitive's wait queue, if any — `Tcb` itself doesn't know
    /// which queue, if any, it's sitting on.
    pub(crate) fn enter_blocked(&self, reason: BlockReason, ticks: u32) {
        self.state.set(TaskState::Blocked);
        self.block_reason.set(reason);
        self.remaining_ticks
            .set(if ticks == crate::port::TASK_MAX_WAIT { 0 } else { ticks });
    }

    pub(crate) fn clear_wait_bookkeeping(&self) {
        self.block_reason.set(BlockReason::None);
        self.remaining_ticks.set(0);
    }

    #[inline]
    pub(crate) fn current_queue(&self) -> Option<&'static crate::queue::TaskQueue> {
        self.current_queue.get()
    }

    #[inline]
    pub(crate) fn set_current_queue(&self, q: Option<&'static crate::queue::TaskQueue>) {
        self.current_queue.set(q);
    }
}

impl core::fmt::Debug for Tcb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tcb")
            .field("priority", &self.priority.get())
            .field("base_priority", &self.base_priority.get())
            .field("state", &self.state.get())
            .field("block_reason", &self.block_reason.get())
            .field("wakeup_reason", &self.wakeup_reason.get())
            .finish()
    }
}

// SAFETY: a `Tcb` is only ever mutated with interrupts disabled, and this
// kernel never runs on more than one core, so there is no data race for
// `Sync` to guard against beyond what `CriticalSection` already enforces by
// construction.
unsafe impl Sync for Tcb {}
