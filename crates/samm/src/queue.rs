//! Bounded cleanup queue.
//!
//! Single consumer (the worker thread), many producers (threads exiting
//! scopes). Strict FIFO. `push` refuses when full and hands the batch back,
//! so the producer can run it synchronously - nothing is ever dropped.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::scope::AllocKind;

/// One scope's detached tracking record, queued for cleanup.
#[derive(Debug)]
pub struct CleanupBatch {
    pub ptrs: Vec<usize>,
    pub kinds: Vec<AllocKind>,
}

impl CleanupBatch {
    pub fn new(ptrs: Vec<usize>, kinds: Vec<AllocKind>) -> Self {
        debug_assert_eq!(ptrs.len(), kinds.len());
        Self { ptrs, kinds }
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, AllocKind)> + '_ {
        self.ptrs.iter().copied().zip(self.kinds.iter().copied())
    }
}

struct QueueInner {
    batches: VecDeque<CleanupBatch>,
    shutdown: bool,
    /// Accumulated batch-processing time; guarded here because it is the
    /// one non-atomic statistic.
    cleanup_time: Duration,
}

/// The bounded FIFO between scope exits and the worker.
pub(crate) struct CleanupQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    capacity: usize,
}

impl CleanupQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                batches: VecDeque::with_capacity(capacity),
                shutdown: false,
                cleanup_time: Duration::ZERO,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a batch, or hand it back if the queue is full.
    pub(crate) fn push(&self, batch: CleanupBatch) -> std::result::Result<(), CleanupBatch> {
        {
            let mut inner = self.inner.lock();
            if inner.batches.len() >= self.capacity {
                return Err(batch);
            }
            inner.batches.push_back(batch);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until a batch is available or shutdown is requested with the
    /// queue drained. `None` means the worker should exit.
    pub(crate) fn pop_blocking(&self) -> Option<CleanupBatch> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(batch) = inner.batches.pop_front() {
                return Some(batch);
            }
            if inner.shutdown {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    pub(crate) fn request_shutdown(&self) {
        self.inner.lock().shutdown = true;
        self.not_empty.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().batches.len()
    }

    pub(crate) fn add_cleanup_time(&self, elapsed: Duration) {
        self.inner.lock().cleanup_time += elapsed;
    }

    pub(crate) fn cleanup_time_ms(&self) -> u64 {
        self.inner.lock().cleanup_time.as_millis() as u64
    }
}
