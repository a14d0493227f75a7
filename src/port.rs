//! The interface the kernel expects the platform to provide, and the small
//! set of tunables a platform selects at build time.
//!
//! Everything in this module is deliberately *not* implemented here. The
//! processor-specific register-stacking trampoline, the initial stack frame
//! layout for a freshly created task, and the periodic tick source all live
//! on the other side of [`Port`]. The kernel only ever calls through this
//! trait; it never pokes hardware directly.

/// Hardware/platform services the kernel core consumes.
///
/// All methods are `unsafe fn`: calling them outside of the narrow contexts
/// the kernel uses them in (boot, and inside a matching critical section)
/// can corrupt kernel state or the running task's stack.
pub trait Port {
    /// Opaque interrupt-enable state returned by [`Port::acquire`], handed
    /// back unchanged to [`Port::release`]. Lets critical sections nest:
    /// the innermost `release` restores whatever the outermost `acquire`
    /// observed, not "interrupts on" unconditionally.
    type RestoreState: Copy;

    /// Globally disable interrupts and return the previous state.
    ///
    /// # Safety
    /// Must be paired with a matching [`Port::release`] using the returned
    /// value before the caller returns to a context that expects interrupts
    /// to be in their original state.
    unsafe fn acquire() -> Self::RestoreState;

    /// Restore the interrupt state captured by a prior [`Port::acquire`].
    ///
    /// # Safety
    /// `state` must be the value returned by the [`Port::acquire`] call this
    /// is paired with.
    unsafe fn release(state: Self::RestoreState);

    /// Request the deferred, lowest-priority context-switch exception.
    ///
    /// The kernel calls this once it has already updated `current` to the
    /// task that should run next; the actual register save/restore happens
    /// later, once all higher-priority interrupts have been serviced.
    ///
    /// # Safety
    /// Must only be called with interrupts disabled (i.e. from within a
    /// critical section or from an interrupt handler).
    unsafe fn trigger_switch();

    /// Install `sp` as the stack pointer of the task about to run, and drop
    /// to task execution (privileged or not, per `privileged`). Used exactly
    /// once, by [`crate::sched::Kernel::start`].
    ///
    /// # Safety
    /// May only be called while bootstrapping the scheduler, before any task
    /// code has run.
    unsafe fn set_stack_pointer(sp: usize);

    /// Switch CPU mode and never return; the next instruction executed is
    /// the entry point of the first scheduled task.
    ///
    /// # Safety
    /// See [`Port::set_stack_pointer`].
    unsafe fn switch_to_task_mode(privileged: bool) -> !;

    /// Whether tasks run in privileged mode ([`Port::TASKS_RUN_PRIV`]).
    ///
    /// Cooperative yields from task context branch on this: a privileged
    /// build can disable interrupts and reschedule inline, an unprivileged
    /// one must trap through a supervisor call to regain the privilege
    /// needed to touch kernel state.
    const TASKS_RUN_PRIV: bool;
}

/// `TASK_LOWEST_PRIORITY` — the idle task's priority, and the numerically
/// largest (i.e. weakest) priority value a task may hold.
pub const TASK_LOWEST_PRIORITY: u8 = 255;

/// `TASK_HIGHEST_PRIORITY` — numerically smallest (i.e. strongest) priority.
pub const TASK_HIGHEST_PRIORITY: u8 = 0;

/// `TASK_NO_WAIT` — don't block; fail immediately if not immediately
/// satisfiable.
pub const TASK_NO_WAIT: u32 = 0;

/// `TASK_MAX_WAIT` — block with no timeout.
pub const TASK_MAX_WAIT: u32 = u32::MAX;
