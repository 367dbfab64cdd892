//! This module provides a multi-producer, multi-consumer queue that grows
//! up to its capacity. Read more in [`DynamicQueue`].
use crate::backoff::Backoff;
use crate::cache_padded::CachePaddedAtomicU64;
use crate::config::DynamicQueueConfig;
use crate::errors::QueueError;
use crate::hints::cold_path;
use crate::loom_bindings::sync::atomic::AtomicPtr;
use crate::mpmc::TicketQueue;
use crate::ticket::{slot_padding, Claim, SlotArray, TicketDispenser, TicketSource};
use crate::turn_sequencer::SpinCutoff;
use std::marker::PhantomData;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::{fmt, ptr};

// Implementation notes for the growable queue.
//
// It works exactly like the bounded queue, but the slot array can be replaced
// by a bigger one. Tickets are never renumbered: the new array starts at an
// offset, and a ticket below it still belongs to the array that was current
// when it was issued. So the replaced ("closed") arrays are kept in a log
// and drained by the operations that hold their tickets.
//
// The current array and the log are guarded by a seqlock:
// the state word is `closed_count << 1 | LOCKED`.
// An expansion locks the state, appends the current array to the log,
// publishes the new one and stores the state with the incremented count.
// A reader loads the state, then the current array, then the state again,
// and retries if the state was locked or has changed.
//
// The offset of a new array is `1 + max(push ticket, pop ticket)`. Every ticket
// below it has been issued, or may be issued by an operation that has read
// the state before the lock, so it must keep mapping to the old array.
//
// Only producers expand: a push that would block while the current array is full.
// The push that triggers an expansion still holds (or observes) a ticket of the old
// array, so the non-blocking pushes may fail for the few tickets that land in
// a just-closed array until the consumers free their slots.

/// The lock bit of the state.
const LOCKED: u64 = 1;

/// A consistent view of the seqlock-protected data.
struct Snapshot<'queue, T> {
    state: u64,
    current: &'queue SlotArray<T>,
}

impl<T> Snapshot<'_, T> {
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation, reason = "It is below the log length")]
    fn closed_count(&self) -> usize {
        (self.state >> 1) as usize
    }
}

/// A multi-producer, multi-consumer FIFO queue that starts small and grows
/// up to its capacity.
///
/// It starts with [`DynamicQueueConfig::initial_capacity`] slots
/// and multiplies them by the expansion multiplier every time a producer
/// finds the current array full, until it reaches the capacity.
/// It never shrinks. Every operation is available through [`TicketQueue`].
///
/// [`write_if_not_full`](TicketQueue::write_if_not_full) and
/// [`try_write_until`](TicketQueue::try_write_until) may fail right after an expansion
/// although the queue is not full: the tickets that land in the replaced array
/// have to wait for the consumers there. It lasts only for these few tickets.
///
/// # Example
///
/// ```
/// use ticketq::{DynamicQueue, DynamicQueueConfig, TicketQueue};
///
/// let queue = DynamicQueue::with_config(DynamicQueueConfig::new(1000).min_capacity(1))
///     .unwrap();
///
/// assert_eq!(queue.allocated_capacity(), 1);
///
/// queue.write("first").unwrap();
///
/// // The array is full: the queue grows, but this ticket still lands in the old array.
/// assert_eq!(queue.write("second"), Err("second"));
/// assert_eq!(queue.allocated_capacity(), 10);
///
/// assert_eq!(queue.read(), Some("first"));
/// queue.write("second").unwrap();
/// queue.write("third").unwrap();
///
/// assert_eq!(queue.read(), Some("second"));
/// assert_eq!(queue.read(), Some("third"));
/// ```
pub struct DynamicQueue<T> {
    dispenser: TicketDispenser,
    push_spin_cutoff: SpinCutoff,
    pop_spin_cutoff: SpinCutoff,
    state: CachePaddedAtomicU64,
    current: AtomicPtr<SlotArray<T>>,
    closed: Box<[AtomicPtr<SlotArray<T>>]>,
    capacity: usize,
    expansion_multiplier: usize,
    _owns: PhantomData<SlotArray<T>>,
}

impl<T> DynamicQueue<T> {
    /// Creates a new queue that can grow up to `capacity` elements
    /// with the default starting capacity and multiplier.
    ///
    /// # Errors
    ///
    /// The same as [`with_config`](Self::with_config).
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(DynamicQueueConfig::new(capacity))
    }

    /// Creates a new queue with the given [`DynamicQueueConfig`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::ZeroCapacity`] if the capacity is zero, nothing is allocated then;
    /// - [`QueueError::CapacityOverflow`] if the padded array length overflows `usize`;
    /// - [`QueueError::AllocationFailed`] if the first array can't be allocated.
    pub fn with_config(config: DynamicQueueConfig) -> Result<Self, QueueError> {
        let capacity = config.capacity();

        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let array = SlotArray::try_new(config.initial_capacity(), 0)?;
        let closed = (0..config.max_expansions())
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        tracing::debug!(
            capacity,
            initial_capacity = array.capacity(),
            expansion_multiplier = config.get_expansion_multiplier(),
            max_expansions = config.max_expansions(),
            stride = array.stride(),
            padding = slot_padding::<T>(),
            spin_policy = ?config.get_spin_policy(),
            "created a dynamic queue"
        );

        Ok(Self {
            dispenser: TicketDispenser::new(),
            push_spin_cutoff: SpinCutoff::new(config.get_spin_policy()),
            pop_spin_cutoff: SpinCutoff::new(config.get_spin_policy()),
            state: CachePaddedAtomicU64::new(0),
            current: AtomicPtr::new(Box::into_raw(Box::new(array))),
            closed,
            capacity,
            expansion_multiplier: config.get_expansion_multiplier(),
            _owns: PhantomData,
        })
    }

    /// Returns how many times the queue has grown.
    pub fn expansion_count(&self) -> usize {
        self.read_section().closed_count()
    }

    /// Tries to enter the seqlock read section.
    /// Returns `None` if an expansion is in progress or has happened meanwhile.
    #[inline]
    fn try_read_section(&self) -> Option<Snapshot<'_, T>> {
        let state = self.state.load(Acquire);

        if state & LOCKED != 0 {
            return None;
        }

        let current = self.current.load(Acquire);

        if self.state.load(Acquire) != state {
            return None;
        }

        Some(Snapshot {
            state,
            // SAFETY: published arrays are freed only in `drop`.
            current: unsafe { &*current },
        })
    }

    #[inline]
    fn read_section(&self) -> Snapshot<'_, T> {
        let backoff = Backoff::new();

        loop {
            if let Some(snapshot) = self.try_read_section() {
                return snapshot;
            }

            backoff.snooze();
        }
    }

    /// Returns the array the `ticket` maps to: the current one,
    /// or the newest closed array whose offset doesn't exceed the `ticket`.
    fn locate<'queue>(&'queue self, snapshot: &Snapshot<'queue, T>, ticket: u64) -> &'queue SlotArray<T> {
        if ticket >= snapshot.current.offset() {
            return snapshot.current;
        }

        let found = self.closed[..snapshot.closed_count()]
            .iter()
            .rev()
            // SAFETY: the first `closed_count` entries were published before the state.
            .map(|entry| unsafe { &*entry.load(Acquire) })
            .find(|array| array.offset() <= ticket);

        debug_assert!(found.is_some(), "ticket {ticket} precedes every array");

        found.unwrap_or(snapshot.current)
    }

    /// Tries to replace the current array, whose capacity is `capacity`, with a bigger one.
    ///
    /// Returns `true` if the caller should retry because the state has changed,
    /// and `false` if the queue can't grow.
    #[cold]
    #[allow(clippy::cast_possible_truncation, reason = "It is below the log length")]
    fn try_expand(&self, state: u64, capacity: usize) -> bool {
        if capacity == self.capacity {
            return false;
        }

        if self
            .state
            .compare_exchange(state, state | LOCKED, AcqRel, Relaxed)
            .is_err()
        {
            // Another thread is expanding or has expanded.
            return true;
        }

        let closed_count = (state >> 1) as usize;
        let Some(entry) = self.closed.get(closed_count) else {
            debug_assert!(false, "the log of closed arrays is full");

            self.state.store(state, Release);

            return false;
        };

        let offset = 1 + self.dispenser.pushes().max(self.dispenser.pops());
        let new_capacity = self
            .expansion_multiplier
            .saturating_mul(capacity)
            .min(self.capacity);

        match SlotArray::try_new(new_capacity, offset) {
            Ok(array) => {
                entry.store(self.current.load(Relaxed), Release);
                self.current
                    .store(Box::into_raw(Box::new(array)), Release);
                self.state.store((closed_count as u64 + 1) << 1, Release);

                tracing::debug!(
                    old_capacity = capacity,
                    new_capacity,
                    offset,
                    closed_count = closed_count + 1,
                    "expanded a dynamic queue"
                );

                true
            }
            Err(err) => {
                cold_path();

                self.state.store(state, Release);

                tracing::warn!(
                    capacity,
                    new_capacity,
                    error = %err,
                    "failed to expand a dynamic queue, writers will block instead"
                );

                false
            }
        }
    }
}

impl<T> TicketSource<T> for DynamicQueue<T> {
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

    fn blocking_push_claim(&self) -> Claim<'_, T> {
        let ticket = self.dispenser.take_push();
        let backoff = Backoff::new();

        loop {
            let Some(snapshot) = self.try_read_section() else {
                backoff.snooze();

                continue;
            };
            let current = snapshot.current;

            if ticket < current.offset() {
                // The queue has expanded after the ticket was issued.
                return Claim::new(ticket, self.locate(&snapshot, ticket));
            }

            let claim = Claim::new(ticket, current);

            if claim.may_enqueue()
                || self.dispenser.pops() + current.capacity() as u64 > ticket
            {
                // Ready, or the pop that frees the slot is in progress.
                return claim;
            }

            if !self.try_expand(snapshot.state, current.capacity()) {
                return claim;
            }
        }
    }

    fn blocking_pop_claim(&self) -> Claim<'_, T> {
        let ticket = self.dispenser.take_pop();
        let snapshot = self.read_section();

        Claim::new(ticket, self.locate(&snapshot, ticket))
    }

    fn try_obtain_ready_push_claim(&self) -> Option<Claim<'_, T>> {
        let backoff = Backoff::new();

        loop {
            let ticket = self.dispenser.pushes();
            let Some(snapshot) = self.try_read_section() else {
                backoff.snooze();

                continue;
            };
            let array = self.locate(&snapshot, ticket);
            let claim = Claim::new(ticket, array);

            if claim.may_enqueue() {
                if self.dispenser.try_take_push(ticket).is_ok() {
                    return Some(claim);
                }

                backoff.spin();

                continue;
            }

            if ticket != self.dispenser.pushes() {
                continue;
            }

            // Likely full. Only the current array can grow.
            if ptr::eq(array, snapshot.current) && self.try_expand(snapshot.state, array.capacity())
            {
                continue;
            }

            return None;
        }
    }

    #[allow(clippy::cast_possible_wrap, reason = "Capacity is far below i64::MAX")]
    fn try_obtain_promised_push_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>> {
        let backoff = Backoff::new();

        loop {
            let ticket = self.dispenser.pushes();
            let pops = self.dispenser.pops();
            let Some(snapshot) = self.try_read_section() else {
                backoff.snooze();

                continue;
            };
            let array = self.locate(&snapshot, ticket);

            if ticket.wrapping_sub(pops) as i64 >= array.capacity() as i64 {
                if ptr::eq(array, snapshot.current)
                    && self.try_expand(snapshot.state, array.capacity())
                {
                    continue;
                }

                return Err(Claim::new(ticket, array));
            }

            if self.dispenser.try_take_push(ticket).is_ok() {
                return Ok(Claim::new(ticket, array));
            }

            backoff.spin();
        }
    }

    fn try_obtain_ready_pop_claim(&self) -> Option<Claim<'_, T>> {
        let backoff = Backoff::new();

        loop {
            let ticket = self.dispenser.pops();
            let Some(snapshot) = self.try_read_section() else {
                backoff.snooze();

                continue;
            };
            let claim = Claim::new(ticket, self.locate(&snapshot, ticket));

            if claim.may_dequeue() {
                if self.dispenser.try_take_pop(ticket).is_ok() {
                    return Some(claim);
                }

                backoff.spin();
            } else if ticket == self.dispenser.pops() {
                return None;
            }
        }
    }

    fn try_obtain_promised_pop_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>> {
        let backoff = Backoff::new();

        loop {
            let ticket = self.dispenser.pops();
            let pushes = self.dispenser.pushes();
            let Some(snapshot) = self.try_read_section() else {
                backoff.snooze();

                continue;
            };
            let array = self.locate(&snapshot, ticket);

            if ticket >= pushes {
                return Err(Claim::new(ticket, array));
            }

            if self.dispenser.try_take_pop(ticket).is_ok() {
                return Ok(Claim::new(ticket, array));
            }

            backoff.spin();
        }
    }
}

impl<T> TicketQueue<T> for DynamicQueue<T> {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the capacity of the current array.
    ///
    /// The closed arrays that are still being drained are not counted.
    fn allocated_capacity(&self) -> usize {
        self.read_section().current.capacity()
    }
}

impl<T> Drop for DynamicQueue<T> {
    #[allow(clippy::cast_possible_truncation, reason = "It is below the log length")]
    fn drop(&mut self) {
        let closed_count = (self.state.load(Relaxed) >> 1) as usize;

        for entry in &self.closed[..closed_count] {
            // SAFETY: the entry was published by an expansion and nobody else references it.
            drop(unsafe { Box::from_raw(entry.load(Relaxed)) });
        }

        // SAFETY: the current array is always a leaked box that nobody else references.
        drop(unsafe { Box::from_raw(self.current.load(Relaxed)) });
    }
}

impl<T> fmt::Debug for DynamicQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.read_section();

        f.debug_struct("DynamicQueue")
            .field("capacity", &self.capacity)
            .field("expansion_multiplier", &self.expansion_multiplier)
            .field("dispenser", &self.dispenser)
            .field("current", snapshot.current)
            .field("closed_count", &snapshot.closed_count())
            .finish_non_exhaustive()
    }
}
