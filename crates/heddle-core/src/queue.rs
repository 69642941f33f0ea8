//! Cancellable multi-producer / multi-consumer FIFO.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Unbounded FIFO with a sticky cancel flag.
///
/// Design intent:
/// - Cancel stops new pushes immediately but never drops queued items:
///   a blocked `pop` returns `None` only once the queue is both
///   canceled *and* drained.
/// - Every `push` wakes one consumer, `cancel` wakes all of them, so a
///   blocked `pop` cannot miss progress.
pub struct CancelQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    canceled: bool,
}

impl<T> CancelQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                canceled: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Append to the tail. Returns false (and drops `value`) once the
    /// queue is canceled.
    pub fn push(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.canceled {
            return false;
        }
        inner.items.push_back(value);
        self.not_empty.notify_one();
        true
    }

    /// Block until an item is available or the queue is canceled and
    /// drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(value) = inner.items.pop_front() {
                return Some(value);
            }
            if inner.canceled {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Set the cancel flag and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.canceled = true;
        self.not_empty.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.lock().canceled
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl<T> Default for CancelQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for CancelQueue<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
