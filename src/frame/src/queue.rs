//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The process-wide queue registry.
//!
//! Every logical submission queue owns a pair of monotonic command indices:
//! the signal value of the last command buffer *submitted* to it and of the
//! last one *completed* by it. Persistent resources carry per-queue wait
//! indices expressed in these values, which is what makes cross-frame (and
//! cross-queue) accesses safe: before touching such a resource, a frame
//! waits until the owning queue's completed index reaches the stored value.
//!
//! The registry is a process-wide table of [`MAX_QUEUES`] slots. Counters
//! use relaxed atomics: only the owning queue's executor advances them, and
//! monotonicity is asserted on every write. Completion writes additionally
//! broadcast a per-queue condition variable so that
//! [`Queue::wait_for_command_completion`] can block without busy-waiting.
use lazy_static::lazy_static;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use nagare_base::{QueueId, MAX_QUEUES};

#[cfg(test)]
#[path = "./queue_test.rs"]
mod queue_test;

#[derive(Debug, Default)]
struct QueueSlot {
    last_submitted: AtomicU64,
    last_completed: AtomicU64,
    last_submission_time: AtomicU64,
    last_completion_time: AtomicU64,
    lock: Mutex<()>,
    completion: Condvar,
}

#[derive(Debug)]
struct QueueRegistry {
    slots: [QueueSlot; MAX_QUEUES],
    allocated: AtomicU8,
}

lazy_static! {
    static ref REGISTRY: QueueRegistry = QueueRegistry {
        slots: Default::default(),
        allocated: AtomicU8::new(0),
    };
    static ref EPOCH: Instant = Instant::now();
}

fn now_nanos() -> u64 {
    EPOCH.elapsed().as_nanos() as u64
}

impl QueueRegistry {
    fn allocate(&self) -> QueueId {
        loop {
            let bits = self.allocated.load(Ordering::Acquire);
            let free = !bits;
            if free == 0 {
                panic!("out of queues");
            }
            let index = free.trailing_zeros() as QueueId;
            if self
                .allocated
                .compare_exchange_weak(
                    bits,
                    bits | (1 << index),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let slot = &self.slots[index as usize];
                slot.last_submitted.store(0, Ordering::Relaxed);
                slot.last_completed.store(0, Ordering::Relaxed);
                slot.last_submission_time.store(0, Ordering::Relaxed);
                slot.last_completion_time.store(0, Ordering::Relaxed);
                return index;
            }
            std::hint::spin_loop();
        }
    }

    fn dispose(&self, index: QueueId) {
        // The counters remain readable until the slot is reused.
        self.allocated
            .fetch_and(!(1 << index), Ordering::AcqRel);
    }

    fn slot(&self, index: QueueId) -> &QueueSlot {
        &self.slots[index as usize]
    }
}

/// The signal value of the last command buffer completed on the given
/// queue. Valid for any queue id, including disposed ones.
pub fn last_completed_command_on(queue: QueueId) -> u64 {
    REGISTRY.slot(queue).last_completed.load(Ordering::Relaxed)
}

/// The signal value of the last command buffer submitted to the given queue.
pub fn last_submitted_command_on(queue: QueueId) -> u64 {
    REGISTRY.slot(queue).last_submitted.load(Ordering::Relaxed)
}

/// Block until the given queue's completed command index reaches `index`.
pub fn wait_for_command_completion_on(queue: QueueId, index: u64) {
    let slot = REGISTRY.slot(queue);
    if slot.last_completed.load(Ordering::Relaxed) >= index {
        return;
    }
    let mut guard = slot.lock.lock();
    while slot.last_completed.load(Ordering::Relaxed) < index {
        slot.completion.wait(&mut guard);
    }
}

/// A logical submission queue.
///
/// At most [`MAX_QUEUES`] queues may exist at any point in time; exceeding
/// the limit is a caller bug and panics. Dropping a `Queue` releases its
/// slot for reuse.
#[derive(Debug)]
pub struct Queue {
    index: QueueId,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            index: REGISTRY.allocate(),
        }
    }

    pub fn id(&self) -> QueueId {
        self.index
    }

    pub fn last_submitted_command(&self) -> u64 {
        last_submitted_command_on(self.index)
    }

    pub fn last_completed_command(&self) -> u64 {
        last_completed_command_on(self.index)
    }

    /// Monotonic nanoseconds of the last submission, zero if none.
    pub fn last_submission_time(&self) -> u64 {
        REGISTRY
            .slot(self.index)
            .last_submission_time
            .load(Ordering::Relaxed)
    }

    /// Monotonic nanoseconds of the last completion, zero if none.
    pub fn last_completion_time(&self) -> u64 {
        REGISTRY
            .slot(self.index)
            .last_completion_time
            .load(Ordering::Relaxed)
    }

    /// Record the submission of the command buffer with signal value
    /// `index`.
    pub fn did_submit_command(&self, index: u64) {
        let slot = REGISTRY.slot(self.index);
        let prev = slot.last_submitted.fetch_max(index, Ordering::Relaxed);
        assert!(prev <= index, "submitted command indices must be monotonic");
        slot.last_submission_time
            .store(now_nanos(), Ordering::Relaxed);
    }

    /// Record the completion of the command buffer with signal value
    /// `index` and wake up every waiter.
    pub fn did_complete_command(&self, index: u64) {
        let slot = REGISTRY.slot(self.index);
        debug_assert!(
            slot.last_submitted.load(Ordering::Relaxed) >= index,
            "completed a command that was never submitted"
        );
        let prev = slot.last_completed.fetch_max(index, Ordering::Relaxed);
        assert!(prev <= index, "completed command indices must be monotonic");
        slot.last_completion_time
            .store(now_nanos(), Ordering::Relaxed);

        // Taking the lock before broadcasting closes the race against a
        // waiter that checked the predicate but has not parked yet.
        let _guard = slot.lock.lock();
        slot.completion.notify_all();
    }

    /// Block until `last_completed_command() >= index`.
    pub fn wait_for_command_completion(&self, index: u64) {
        wait_for_command_completion_on(self.index, index);
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        REGISTRY.dispose(self.index);
    }
}
