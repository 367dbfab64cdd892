//! Generic trait for queue benchmarking.

use std::collections::VecDeque;
use std::sync::Mutex;
use ticketq::{BoundedQueue, DynamicQueue, DynamicQueueConfig, TicketQueue};

/// Generic interface for a bounded MPMC queue.
pub trait GenericQueue<T>: Send + Sync + 'static {
    fn with_capacity(capacity: usize) -> Self;
    fn push(&self, item: T) -> Result<(), T>;
    fn pop(&self) -> Option<T>;
}

// region ticketq

impl<T: Send + 'static> GenericQueue<T> for BoundedQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity).unwrap()
    }

    fn push(&self, item: T) -> Result<(), T> {
        self.write(item)
    }

    fn pop(&self) -> Option<T> {
        self.read()
    }
}

impl<T: Send + 'static> GenericQueue<T> for DynamicQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self::with_config(DynamicQueueConfig::new(capacity).min_capacity(1)).unwrap()
    }

    fn push(&self, item: T) -> Result<(), T> {
        self.write(item)
    }

    fn pop(&self) -> Option<T> {
        self.read()
    }
}

// endregion

// region crossbeam

impl<T: Send + 'static> GenericQueue<T> for crossbeam_queue::ArrayQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity)
    }

    fn push(&self, item: T) -> Result<(), T> {
        self.push(item)
    }

    fn pop(&self) -> Option<T> {
        self.pop()
    }
}

// endregion

// region mutex

/// A `VecDeque` behind a `Mutex`, the baseline.
pub struct MutexQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Send + 'static> GenericQueue<T> for MutexQueue<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock().unwrap();

        if inner.len() == self.capacity {
            return Err(item);
        }

        inner.push_back(item);

        Ok(())
    }

    fn pop(&self) -> Option<T> {
        self.inner.lock().unwrap().pop_front()
    }
}

// endregion
