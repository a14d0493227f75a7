//! Per-operation error types.
//!
//! Each synchronization primitive returns its own small `Result` error type
//! rather than funneling everything through one kernel-wide error enum —
//! the failure modes of a mutex lock and a message send don't overlap enough
//! to make a shared enum meaningful.

use core::fmt;

/// Failure of [`crate::mutex::Mutex::lock`] / `try_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The mutex is held by another task and the caller asked not to wait.
    WouldBlock,
    /// The mutex is held by another task and the wait timed out.
    Timeout,
}

/// Failure of [`crate::mutex::Mutex::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockError {
    /// The calling task does not own the mutex.
    NotOwner,
    /// The calling task is recorded as owner, but the mutex isn't locked.
    /// Only reachable if internal bookkeeping has already gone wrong
    /// elsewhere; kept as a distinct outcome because the reference
    /// implementation reports it separately from `NotOwner`.
    NotLocked,
}

/// Failure of [`crate::semaphore::Semaphore::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// No unit was available and the caller asked not to wait.
    WouldBlock,
    /// No unit became available before the wait timed out.
    Timeout,
}

/// Failure of [`crate::semaphore::Semaphore::give`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveError {
    /// The count is already at its configured maximum.
    Overflow,
}

/// Failure of [`crate::msgqueue::MsgQueue::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The queue is full and the caller asked not to wait.
    WouldBlock,
    /// The queue stayed full until the wait timed out.
    Timeout,
}

/// Failure of [`crate::msgqueue::MsgQueue::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    /// The queue is empty and the caller asked not to wait.
    WouldBlock,
    /// The queue stayed empty until the wait timed out.
    Timeout,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::WouldBlock => f.write_str("mutex is locked"),
            LockError::Timeout => f.write_str("timed out waiting for mutex"),
        }
    }
}

impl fmt::Display for UnlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockError::NotOwner => f.write_str("calling task does not own this mutex"),
            UnlockError::NotLocked => f.write_str("mutex is not locked"),
        }
    }
}

impl fmt::Display for TakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeError::WouldBlock => f.write_str("no semaphore unit available"),
            TakeError::Timeout => f.write_str("timed out waiting for semaphore unit"),
        }
    }
}

impl fmt::Display for GiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveError::Overflow => f.write_str("semaphore count already at maximum"),
        }
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::WouldBlock => f.write_str("message queue is full"),
            SendError::Timeout => f.write_str("timed out waiting for queue space"),
        }
    }
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiveError::WouldBlock => f.write_str("message queue is empty"),
            ReceiveError::Timeout => f.write_str("timed out waiting for queue data"),
        }
    }
}
