//! This module contains the implementation of the MPMC ticket queues.
//!
//! [`bounded`]: A fixed-capacity queue, use [`BoundedQueue`].
//!
//! [`dynamic`]: A queue that starts small and grows up to its capacity,
//! use [`DynamicQueue`].
//!
//! Both queues implement [`TicketQueue`], which contains every operation.
mod bounded;
mod dynamic;

pub use bounded::*;
pub use dynamic::*;

use crate::ticket::TicketSource;
use std::time::{Duration, Instant};

/// A multi-producer multi-consumer FIFO queue that hands out tickets.
///
/// Every push takes the next push ticket and every pop takes the next pop ticket,
/// so pushes are totally ordered among themselves and so are pops.
/// The element of the `n`-th push is received by the `n`-th pop.
///
/// The trait is sealed, it is implemented by [`BoundedQueue`] and [`DynamicQueue`].
///
/// # Operations
///
/// | push                                     | pop                                  | behavior                          |
/// |------------------------------------------|--------------------------------------|-----------------------------------|
/// | [`write`](Self::write)                   | [`read`](Self::read)                 | never waits                       |
/// | [`write_if_not_full`](Self::write_if_not_full) | [`read_if_not_empty`](Self::read_if_not_empty) | may wait for an in-flight operation |
/// | [`try_write_until`](Self::try_write_until) | [`try_read_until`](Self::try_read_until) | waits until the deadline       |
/// | [`blocking_write`](Self::blocking_write) | [`blocking_read`](Self::blocking_read) | waits as long as needed         |
///
/// # Example
///
/// ```
/// use ticketq::{BoundedQueue, TicketQueue};
///
/// let queue = BoundedQueue::new(2).unwrap();
///
/// queue.write(1).unwrap();
/// queue.blocking_write(2);
///
/// assert_eq!(queue.write(3), Err(3));
/// assert_eq!(queue.read(), Some(1));
/// assert_eq!(queue.blocking_read_with_ticket(), (1, 2));
/// assert!(queue.is_empty());
/// ```
pub trait TicketQueue<T>: TicketSource<T> {
    /// Returns the maximum number of elements the queue can hold.
    fn capacity(&self) -> usize;

    /// Returns the number of elements the queue can hold without growing.
    fn allocated_capacity(&self) -> usize;

    /// Pushes the `value` if it can be done without waiting.
    ///
    /// # Errors
    ///
    /// Returns the `value` back if the queue is full.
    fn write(&self, value: T) -> Result<(), T> {
        match self.try_obtain_ready_push_claim() {
            Some(claim) => {
                claim.enqueue(self.push_spin_cutoff(), value);

                Ok(())
            }
            None => Err(value),
        }
    }

    /// Pushes the `value` if the queue is not full.
    ///
    /// Unlike [`write`](Self::write), it succeeds if the slot is going to be freed
    /// by a pop that has already started, so it may wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the `value` back if the queue is full.
    fn write_if_not_full(&self, value: T) -> Result<(), T> {
        match self.try_obtain_promised_push_claim() {
            Ok(claim) => {
                claim.enqueue(self.push_spin_cutoff(), value);

                Ok(())
            }
            Err(_) => Err(value),
        }
    }

    /// Pushes the `value`, waiting while the queue is full.
    fn blocking_write(&self, value: T) {
        self.blocking_push_claim()
            .enqueue(self.push_spin_cutoff(), value);
    }

    /// Pushes the `value`, waiting while the queue is full but not after the `deadline`.
    ///
    /// An expired `deadline` still lets it push if the queue is not full.
    ///
    /// # Errors
    ///
    /// Returns the `value` back if the `deadline` has elapsed.
    fn try_write_until(&self, value: T, deadline: Instant) -> Result<(), T> {
        loop {
            match self.try_obtain_promised_push_claim() {
                Ok(claim) => {
                    claim.enqueue(self.push_spin_cutoff(), value);

                    return Ok(());
                }
                Err(observed) => {
                    if !observed.try_wait_for_enqueue_turn_until(self.push_spin_cutoff(), deadline)
                    {
                        return Err(value);
                    }
                }
            }
        }
    }

    /// Pushes the `value`, waiting while the queue is full but not longer than the `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the `value` back if the `timeout` has elapsed.
    fn try_write_for(&self, value: T, timeout: Duration) -> Result<(), T> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_write_until(value, deadline),
            None => {
                self.blocking_write(value);

                Ok(())
            }
        }
    }

    /// Pops a value if it can be done without waiting.
    fn read(&self) -> Option<T> {
        self.read_with_ticket().map(|(_, value)| value)
    }

    /// Pops a value if it can be done without waiting.
    /// Returns it with its pop ticket.
    fn read_with_ticket(&self) -> Option<(u64, T)> {
        self.try_obtain_ready_pop_claim().map(|claim| {
            let ticket = claim.ticket();

            (ticket, claim.dequeue(self.pop_spin_cutoff()))
        })
    }

    /// Pops a value if the queue is not empty.
    ///
    /// Unlike [`read`](Self::read), it succeeds if the value is being written
    /// by a push that has already started, so it may wait for it to finish.
    fn read_if_not_empty(&self) -> Option<T> {
        self.try_obtain_promised_pop_claim()
            .ok()
            .map(|claim| claim.dequeue(self.pop_spin_cutoff()))
    }

    /// Pops a value, waiting while the queue is empty.
    fn blocking_read(&self) -> T {
        self.blocking_pop_claim().dequeue(self.pop_spin_cutoff())
    }

    /// Pops a value, waiting while the queue is empty.
    /// Returns it with its pop ticket.
    fn blocking_read_with_ticket(&self) -> (u64, T) {
        let claim = self.blocking_pop_claim();
        let ticket = claim.ticket();

        (ticket, claim.dequeue(self.pop_spin_cutoff()))
    }

    /// Pops a value, waiting while the queue is empty but not after the `deadline`.
    ///
    /// An expired `deadline` still lets it pop if the queue is not empty.
    fn try_read_until(&self, deadline: Instant) -> Option<T> {
        loop {
            match self.try_obtain_promised_pop_claim() {
                Ok(claim) => return Some(claim.dequeue(self.pop_spin_cutoff())),
                Err(observed) => {
                    if !observed.try_wait_for_dequeue_turn_until(self.pop_spin_cutoff(), deadline) {
                        return None;
                    }
                }
            }
        }
    }

    /// Pops a value, waiting while the queue is empty but not longer than the `timeout`.
    fn try_read_for(&self, timeout: Duration) -> Option<T> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_read_until(deadline),
            None => Some(self.blocking_read()),
        }
    }

    /// Returns the number of pushes minus the number of pops.
    ///
    /// It is negative if there are pending pops,
    /// and it can exceed the capacity if there are pending pushes.
    /// It is linearizable.
    fn size(&self) -> i64 {
        self.dispenser().size()
    }

    /// Returns an unsynchronized estimate of [`size`](Self::size).
    fn size_guess(&self) -> i64 {
        self.dispenser().size_guess()
    }

    /// Returns `true` if there are no elements and no pending pushes.
    fn is_empty(&self) -> bool {
        self.size() <= 0
    }

    /// Returns `true` if the queue is at its maximum capacity.
    #[allow(clippy::cast_possible_wrap, reason = "Capacity is far below i64::MAX")]
    fn is_full(&self) -> bool {
        self.size() >= self.capacity() as i64
    }

    /// Returns the number of writes that have started, including the blocked ones.
    fn write_count(&self) -> u64 {
        self.dispenser().pushes()
    }

    /// Returns the number of reads that have started, including the blocked ones.
    fn read_count(&self) -> u64 {
        self.dispenser().pops()
    }
}
