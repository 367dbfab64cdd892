//! This module provides a multi-producer, multi-consumer queue with a fixed capacity.
//! Read more in [`BoundedQueue`].
use crate::config::QueueConfig;
use crate::errors::QueueError;
use crate::mpmc::TicketQueue;
use crate::ticket::{slot_padding, Claim, SlotArray, TicketDispenser, TicketSource};
use crate::turn_sequencer::SpinCutoff;
use std::fmt;

// Implementation notes for the ticket queue.
//
// Every operation first takes a ticket from one of two counters: pushes from
// the push counter, pops from the pop counter. The n-th push and the n-th pop
// both map to the same slot, so all the coordination that is left happens inside
// that slot, and the counters are the only words touched by every operation.
//
// A slot is reused once per lap (every `capacity` tickets). Its turn sequencer
// numbers the uses: the producer of lap k waits for turn 2k, the consumer of lap k
// waits for turn 2k + 1. Waiting for a turn spins for a while and then parks the
// thread, and completing a turn wakes only the threads that wait for the next one.
// So a blocking operation is just "take a ticket, wait for the turn".
//
// Non-blocking operations must not take a ticket they can't use right away.
// There are two flavors of it:
// - "ready" (`write`/`read`): take the ticket only if its slot is ready right now.
//   If the slot is not ready and the counter has not changed while we were
//   checking, the queue was full (or empty) at that moment;
// - "promised" (`write_if_not_full`/`read_if_not_empty`): take the ticket if the
//   counters say that there is room (or an element). The operation may then wait
//   for a complementary operation that has taken its ticket but not finished yet.
//
// Consecutive tickets are spread over the array by a stride to keep producers
// of neighbor tickets away from each other's cache lines.

/// A multi-producer, multi-consumer FIFO queue with a fixed capacity.
///
/// Producers and consumers take tickets, and each ticket maps to a slot
/// and a turn of that slot, so there is no global lock.
/// Every operation is available through [`TicketQueue`].
///
/// The queue is `Sync`, share it with an [`Arc`](std::sync::Arc) or by reference.
///
/// # Example
///
/// ```
/// use ticketq::{BoundedQueue, TicketQueue};
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(BoundedQueue::new(16).unwrap());
/// let producer = {
///     let queue = queue.clone();
///
///     thread::spawn(move || {
///         for i in 0..100 {
///             queue.blocking_write(i);
///         }
///     })
/// };
///
/// for i in 0..100 {
///     assert_eq!(queue.blocking_read(), i);
/// }
///
/// producer.join().unwrap();
/// ```
pub struct BoundedQueue<T> {
    dispenser: TicketDispenser,
    push_spin_cutoff: SpinCutoff,
    pop_spin_cutoff: SpinCutoff,
    array: SlotArray<T>,
}

impl<T> BoundedQueue<T> {
    /// Creates a new queue that can hold `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ZeroCapacity`] if `capacity` is zero,
    /// and the errors of [`with_config`](Self::with_config).
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(QueueConfig::new(capacity))
    }

    /// Creates a new queue with the given [`QueueConfig`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::ZeroCapacity`] if the capacity is zero, nothing is allocated then;
    /// - [`QueueError::CapacityOverflow`] if the padded array length overflows `usize`;
    /// - [`QueueError::AllocationFailed`] if the slots can't be allocated.
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        let capacity = config.capacity();

        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let array = SlotArray::try_new(capacity, 0)?;

        tracing::debug!(
            capacity,
            stride = array.stride(),
            padding = slot_padding::<T>(),
            spin_policy = ?config.get_spin_policy(),
            "created a bounded queue"
        );

        Ok(Self {
            dispenser: TicketDispenser::new(),
            push_spin_cutoff: SpinCutoff::new(config.get_spin_policy()),
            pop_spin_cutoff: SpinCutoff::new(config.get_spin_policy()),
            array,
        })
    }
}

impl<T> TicketSource<T> for BoundedQueue<T> {
    #[inline(always)]
    fn dispenser(&self) -> &TicketDispenser {
        &self.dispenser
    }

    #[inline(always)]
    fn push_spin_cutoff(&self) -> &SpinCutoff {
        &self.push_spin_cutoff
    }

    #[inline(always)]
    fn pop_spin_cutoff(&self) -> &SpinCutoff {
        &self.pop_spin_cutoff
    }

    #[inline]
    fn blocking_push_claim(&self) -> Claim<'_, T> {
        Claim::new(self.dispenser.take_push(), &self.array)
    }

    #[inline]
    fn blocking_pop_claim(&self) -> Claim<'_, T> {
        Claim::new(self.dispenser.take_pop(), &self.array)
    }

    fn try_obtain_ready_push_claim(&self) -> Option<Claim<'_, T>> {
        let mut ticket = self.dispenser.pushes();

        loop {
            let claim = Claim::new(ticket, &self.array);

            if claim.may_enqueue() {
                match self.dispenser.try_take_push(ticket) {
                    Ok(()) => return Some(claim),
                    Err(current) => ticket = current,
                }
            } else {
                let prev = ticket;

                ticket = self.dispenser.pushes();

                // The slot check was bracketed by two equal reads of the counter,
                // so the queue was full in between.
                if prev == ticket {
                    return None;
                }
            }
        }
    }

    #[allow(clippy::cast_possible_wrap, reason = "Capacity is far below i64::MAX")]
    fn try_obtain_promised_push_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>> {
        let mut pushes = self.dispenser.pushes();

        loop {
            let pops = self.dispenser.pops();

            // It is negative if there are pending pops.
            // A stale `pushes` only makes the queue look emptier, and the CAS below catches it.
            if pushes.wrapping_sub(pops) as i64 >= self.array.capacity() as i64 {
                return Err(Claim::new(pushes, &self.array));
            }

            match self.dispenser.try_take_push(pushes) {
                Ok(()) => return Ok(Claim::new(pushes, &self.array)),
                Err(current) => pushes = current,
            }
        }
    }

    fn try_obtain_ready_pop_claim(&self) -> Option<Claim<'_, T>> {
        let mut ticket = self.dispenser.pops();

        loop {
            let claim = Claim::new(ticket, &self.array);

            if claim.may_dequeue() {
                match self.dispenser.try_take_pop(ticket) {
                    Ok(()) => return Some(claim),
                    Err(current) => ticket = current,
                }
            } else {
                let prev = ticket;

                ticket = self.dispenser.pops();

                if prev == ticket {
                    return None;
                }
            }
        }
    }

    fn try_obtain_promised_pop_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>> {
        let mut pops = self.dispenser.pops();

        loop {
            let pushes = self.dispenser.pushes();

            if pops >= pushes {
                // Empty, or empty with pending pops.
                return Err(Claim::new(pops, &self.array));
            }

            match self.dispenser.try_take_pop(pops) {
                Ok(()) => return Ok(Claim::new(pops, &self.array)),
                Err(current) => pops = current,
            }
        }
    }
}

impl<T> TicketQueue<T> for BoundedQueue<T> {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.array.capacity()
    }

    #[inline(always)]
    fn allocated_capacity(&self) -> usize {
        self.array.capacity()
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("dispenser", &self.dispenser)
            .field("array", &self.array)
            .field("push_spin_cutoff", &self.push_spin_cutoff)
            .field("pop_spin_cutoff", &self.pop_spin_cutoff)
            .finish()
    }
}

#[cfg(all(test, not(ticketq_loom)))]
mod tests {
    use super::*;
    use crate::config::SpinPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_bounded_zero_capacity() {
        assert_eq!(
            BoundedQueue::<u64>::new(0).err(),
            Some(QueueError::ZeroCapacity)
        );
        assert_eq!(
            BoundedQueue::<u64>::with_config(QueueConfig::new(0).spin_policy(SpinPolicy::Fixed(0)))
                .err(),
            Some(QueueError::ZeroCapacity)
        );
    }

    #[test]
    fn test_bounded_capacity_four_scenario() {
        let queue = Arc::new(BoundedQueue::new(4).unwrap());

        for i in 1..=4 {
            assert_eq!(queue.write(i), Ok(()));
        }

        assert_eq!(queue.write(5), Err(5));
        assert!(queue.is_full());

        let written = Arc::new(AtomicUsize::new(0));
        let writer = {
            let queue = queue.clone();
            let written = written.clone();

            thread::spawn(move || {
                queue.blocking_write(5);
                written.store(1, Ordering::Release);
            })
        };

        thread::sleep(Duration::from_millis(50));

        assert_eq!(written.load(Ordering::Acquire), 0);
        assert_eq!(queue.blocking_read(), 1);

        writer.join().unwrap();

        assert_eq!(written.load(Ordering::Acquire), 1);

        for i in 2..=5 {
            assert_eq!(queue.read(), Some(i));
        }

        assert_eq!(queue.read(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded_capacity_bound() {
        let queue = BoundedQueue::new(3).unwrap();

        for round in 0..10 {
            let mut pushed = 0;

            while queue.write(round).is_ok() {
                pushed += 1;

                assert!(queue.size() <= queue.capacity() as i64);
            }

            assert_eq!(pushed, 3);
            assert_eq!(queue.size(), 3);
            assert_eq!(queue.write_if_not_full(round), Err(round));

            while queue.read_if_not_empty().is_some() {}

            assert_eq!(queue.size(), 0);
        }

        assert_eq!(queue.write_count(), 30);
        assert_eq!(queue.read_count(), 30);
        assert_eq!(queue.allocated_capacity(), 3);
    }

    #[test]
    fn test_bounded_capacity_one() {
        let queue = BoundedQueue::new(1).unwrap();

        for i in 0..100 {
            queue.write(i).unwrap();

            assert_eq!(queue.write(i), Err(i));
            assert_eq!(queue.read_with_ticket(), Some((i as u64, i)));
        }
    }

    #[test]
    fn test_bounded_expired_deadline_changes_nothing() {
        let queue = BoundedQueue::with_config(QueueConfig::new(2).spin_policy(SpinPolicy::Fixed(0)))
            .unwrap();
        let past = Instant::now();

        assert_eq!(queue.try_read_until(past), None);
        assert_eq!(queue.try_read_for(Duration::ZERO), None);
        assert_eq!((queue.write_count(), queue.read_count()), (0, 0));

        // An expired deadline still lets a non-blocking attempt through.
        assert_eq!(queue.try_write_until(1, past), Ok(()));
        assert_eq!(queue.try_write_for(2, Duration::ZERO), Ok(()));
        assert_eq!(queue.try_write_until(3, past), Err(3));
        assert_eq!((queue.write_count(), queue.read_count()), (2, 0));

        assert_eq!(queue.try_read_until(past), Some(1));
        assert_eq!(queue.try_write_for(3, Duration::from_millis(10)), Ok(()));
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn test_bounded_timed_ops_wait() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        let reader = {
            let queue = queue.clone();

            thread::spawn(move || queue.try_read_for(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.write(7).unwrap();

        assert_eq!(reader.join().unwrap(), Some(7));

        queue.write(8).unwrap();

        let writer = {
            let queue = queue.clone();

            thread::spawn(move || queue.try_write_for(9, Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));

        assert_eq!(queue.blocking_read(), 8);
        assert_eq!(writer.join().unwrap(), Ok(()));
        assert_eq!(queue.blocking_read(), 9);
    }

    #[test]
    fn test_bounded_drop_drops_remaining_values() {
        let drops = Arc::new(AtomicUsize::new(0));

        {
            let queue = BoundedQueue::new(8).unwrap();

            for _ in 0..5 {
                queue.write(DropCounter(drops.clone())).unwrap();
            }

            drop(queue.read());

            assert_eq!(drops.load(Ordering::Relaxed), 1);
        }

        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_bounded_zero_sized_values() {
        let queue = BoundedQueue::new(5).unwrap();

        for _ in 0..5 {
            queue.write(()).unwrap();
        }

        assert_eq!(queue.write(()), Err(()));
        queue.blocking_read();

        assert_eq!(queue.size_guess(), 4);
    }
}
