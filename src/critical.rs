//! The kernel-wide critical section.
//!
//! Every kernel operation that touches shared state — a task's priority, a
//! queue's head pointer, a mutex's owner — does so with interrupts globally
//! disabled. [`CriticalSection`] is the RAII guard for that: acquiring one
//! disables interrupts (nestably, via [`Port::acquire`]/[`Port::release`]),
//! and dropping it restores whatever state was observed on entry.
//!
//! There's no compile-time-checked token machinery here, unlike some
//! critical-section designs: on a single core there is only ever one
//! execution context able to observe kernel state at a time, so a plain
//! guard carrying the saved interrupt state is enough.

use core::marker::PhantomData;

use crate::port::Port;

/// Proof that interrupts are currently disabled, held for the lifetime of
/// the guard.
pub struct CriticalSection<P: Port> {
    restore: P::RestoreState,
    _not_send: PhantomData<*const ()>,
}

impl<P: Port> CriticalSection<P> {
    /// Disable interrupts, returning a guard that restores them on drop.
    ///
    /// Safe to call from task or interrupt context; nests correctly with
    /// any currently-held `CriticalSection` because `Port::acquire` reports
    /// whether interrupts were already off.
    #[inline]
    pub fn enter() -> Self {
        // SAFETY: paired with `release` in `Drop`, which runs exactly once.
        let restore = unsafe { P::acquire() };
        Self {
            restore,
            _not_send: PhantomData,
        }
    }
}

impl<P: Port> Drop for CriticalSection<P> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `self.restore` came from the matching `P::acquire` call.
        unsafe { P::release(self.restore) };
    }
}
