//! The work queue between the producer and the consumer pool.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
    time::Duration,
};

/// Ids per batch handed through the queue.
pub const BATCH_SIZE: usize = 256;

// Batches the queue may buffer before `push` blocks the producer.
const QUEUE_CAPACITY: usize = 64;

struct Inner {
    batches: VecDeque<Vec<i64>>,
    tombstone: bool,
}

/// Bounded FIFO of block-id batches with a terminal tombstone.
///
/// The tombstone is never popped, so every consumer observes it after
/// the real batches drain.
pub struct BlockQueue {
    inner: Mutex<Inner>,
    cv: Condvar,
    capacity: usize,
}

impl BlockQueue {
    pub fn bounded() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    /// An unbounded queue, for serial runs where the producer finishes
    /// before the first pop happens.
    pub fn unbounded() -> Self {
        Self::with_capacity(usize::MAX)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                batches: VecDeque::new(),
                tombstone: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    /// Appends a batch, blocking while the queue is full. No batch is
    /// ever dropped.
    pub fn push(&self, batch: Vec<i64>) {
        let guard = self.inner.lock().expect("lock is poisoned");
        let mut guard = self
            .cv
            .wait_while(guard, |inner| inner.batches.len() >= self.capacity)
            .expect("lock is poisoned");

        guard.batches.push_back(batch);
        self.cv.notify_all();
    }

    /// Pops the next batch, blocking while the queue is empty. Returns
    /// `None` once the tombstone is the head of the queue.
    pub fn pop(&self) -> Option<Vec<i64>> {
        let guard = self.inner.lock().expect("lock is poisoned");
        let mut guard = self
            .cv
            .wait_while(guard, |inner| inner.batches.is_empty() && !inner.tombstone)
            .expect("lock is poisoned");

        let batch = guard.batches.pop_front();
        if batch.is_some() {
            // Room freed for the producer; possibly exposed the
            // tombstone to the other consumers.
            self.cv.notify_all();
        }
        batch
    }

    /// Marks the end of the stream. The producer posts this exactly
    /// once, after every real batch.
    pub fn set_tombstone(&self) {
        let mut guard = self.inner.lock().expect("lock is poisoned");
        guard.tombstone = true;
        self.cv.notify_all();
    }

    /// Waits until either `timeout` elapses or the queue head becomes
    /// the tombstone. Returns `true` on timeout with work still
    /// pending; used to pace the progress report.
    pub fn idle_wait(&self, timeout: Duration) -> bool {
        let guard = self.inner.lock().expect("lock is poisoned");
        let (_guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, |inner| {
                !(inner.tombstone && inner.batches.is_empty())
            })
            .expect("lock is poisoned");

        result.timed_out()
    }
}
