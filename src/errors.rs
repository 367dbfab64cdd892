//! Errors that can occur while constructing a queue.
//!
//! The queue operations themselves never fail with an error:
//! a full or empty queue is reported by handing the value back (`Err(value)`)
//! or by returning `None`, and a failed expansion of a [`DynamicQueue`]
//! silently degrades into blocking.
//!
//! [`DynamicQueue`]: crate::mpmc::DynamicQueue
use thiserror::Error;

/// Represents the possible errors that can occur when creating a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was configured with zero capacity.
    #[error("a queue with capacity 0 is impossible")]
    ZeroCapacity,
    /// The capacity together with the padding slots doesn't fit into `usize`.
    #[error("capacity {0} is too large")]
    CapacityOverflow(usize),
    /// The allocator couldn't provide the memory for the slots.
    #[error("failed to allocate {0} slots")]
    AllocationFailed(usize),
}
