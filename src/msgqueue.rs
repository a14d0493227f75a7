//! Bounded FIFO message queues for fixed-size items.

use core::cell::Cell;

use crate::critical::CriticalSection;
use crate::error::{ReceiveError, SendError};
use crate::port::Port;
use crate::queue::TaskQueue;
use crate::sched::Kernel;
use crate::task::{BlockReason, Tcb, WakeupReason};

/// A bounded FIFO queue of `CAPACITY` items, each `ITEM_SIZE` bytes.
///
/// The backing storage is `[[u8; ITEM_SIZE]; CAPACITY]` rather than a flat
/// `[u8; ITEM_SIZE * CAPACITY]` buffer with modulo-arithmetic indexing —
/// stable Rust can't compute `ITEM_SIZE * CAPACITY` in a const generic
/// position, so indexing by item rather than by byte gets the same
/// ring-buffer behavior without it.
pub struct MsgQueue<P: Port, const TIMER_QUEUE_CAP: usize, const ITEM_SIZE: usize, const CAPACITY: usize> {
    kernel: &'static Kernel<P, TIMER_QUEUE_CAP>,
    buffer: Cell<[[u8; ITEM_SIZE]; CAPACITY]>,
    read_index: Cell<usize>,
    write_index: Cell<usize>,
    item_count: Cell<usize>,
    producer_wait: TaskQueue,
    consumer_wait: TaskQueue,
}

impl<P: Port, const TIMER_QUEUE_CAP: usize, const ITEM_SIZE: usize, const CAPACITY: usize>
    MsgQueue<P, TIMER_QUEUE_CAP, ITEM_SIZE, CAPACITY>
{
    pub const fn new(kernel: &'static Kernel<P, TIMER_QUEUE_CAP>) -> Self {
        Self {
            kernel,
            buffer: Cell::new([[0u8; ITEM_SIZE]; CAPACITY]),
            read_index: Cell::new(0),
            write_index: Cell::new(0),
            item_count: Cell::new(0),
            producer_wait: TaskQueue::new(),
            consumer_wait: TaskQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.item_count.get()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count.get() == 0
    }

    pub fn is_full(&self) -> bool {
        self.item_count.get() == CAPACITY
    }

    fn write_locked(&self, item: &[u8; ITEM_SIZE]) {
        let mut buf = self.buffer.get();
        buf[self.write_index.get()] = *item;
        self.buffer.set(buf);
        self.write_index.set((self.write_index.get() + 1) % CAPACITY);
        self.item_count.set(self.item_count.get() + 1);

        if let Some(consumer) = self.consumer_wait.pop_front() {
            self.kernel.set_ready(consumer, WakeupReason::MsgQueueDataAvailable);
        }
    }

    fn read_locked(&self) -> [u8; ITEM_SIZE] {
        let buf = self.buffer.get();
        let item = buf[self.read_index.get()];
        self.read_index.set((self.read_index.get() + 1) % CAPACITY);
        self.item_count.set(self.item_count.get() - 1);

        if let Some(producer) = self.producer_wait.pop_front() {
            self.kernel.set_ready(producer, WakeupReason::MsgQueueSpaceAvailable);
        }
        item
    }

    /// Send one item, waiting up to `wait_ticks` if the queue is full.
    pub fn send(&'static self, task: &'static Tcb, item: &[u8; ITEM_SIZE], wait_ticks: u32) -> Result<(), SendError> {
        let cs = CriticalSection::<P>::enter();

        if !self.is_full() {
            self.write_locked(item);
            return Ok(());
        }

        if wait_ticks == crate::port::TASK_NO_WAIT {
            return Err(SendError::WouldBlock);
        }

        self.producer_wait.add(task);
        self.kernel
            .block_current(cs, task, BlockReason::WaitMsgQueueSpace, wait_ticks);

        let _cs = CriticalSection::<P>::enter();
        if task.wakeup_reason() == WakeupReason::MsgQueueSpaceAvailable && !self.is_full() {
            self.write_locked(item);
            Ok(())
        } else {
            // A timeout already unlinked us from `self.producer_wait` via
            // the task's queue back-pointer in `Kernel::set_ready`.
            Err(SendError::Timeout)
        }
    }

    /// Receive one item, waiting up to `wait_ticks` if the queue is empty.
    pub fn receive(&'static self, task: &'static Tcb, wait_ticks: u32) -> Result<[u8; ITEM_SIZE], ReceiveError> {
        let cs = CriticalSection::<P>::enter();

        if !self.is_empty() {
            return Ok(self.read_locked());
        }

        if wait_ticks == crate::port::TASK_NO_WAIT {
            return Err(ReceiveError::WouldBlock);
        }

        self.consumer_wait.add(task);
        self.kernel
            .block_current(cs, task, BlockReason::WaitMsgQueueData, wait_ticks);

        let _cs = CriticalSection::<P>::enter();
        if task.wakeup_reason() == WakeupReason::MsgQueueDataAvailable && !self.is_empty() {
            Ok(self.read_locked())
        } else {
            // A timeout already unlinked us from `self.consumer_wait` via
            // the task's queue back-pointer in `Kernel::set_ready`.
            Err(ReceiveError::Timeout)
        }
    }
}

// SAFETY: see the identical justification on `Tcb`.
unsafe impl<P: Port, const TIMER_QUEUE_CAP: usize, const ITEM_SIZE: usize, const CAPACITY: usize> Sync
    for MsgQueue<P, TIMER_QUEUE_CAP, ITEM_SIZE, CAPACITY>
{
}
