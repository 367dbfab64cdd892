//! This module contains the machinery that both ticket queues share:
//! the [`TicketDispenser`], the [`SlotArray`] that maps tickets to slots and turns,
//! the [`Claim`] of a ticket and the sealed [`TicketSource`] trait.
use crate::cache_padded::{CachePaddedAtomicU64, DESTRUCTIVE_INTERFERENCE_SIZE};
use crate::errors::QueueError;
use crate::hints::assert_hint;
use crate::slot::Slot;
use crate::turn_sequencer::SpinCutoff;
use std::fmt;
use std::mem::size_of;
use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::time::Instant;

/// The spin cutoff is updated only by the waiters whose ticket is a multiple of it.
pub(crate) const ADAPTATION_FREQ: u64 = 128;

/// The strides that are tried for a new array, see [`compute_stride`].
const STRIDE_PRIMES: [usize; 9] = [2, 3, 5, 7, 11, 13, 17, 19, 23];

/// Returns how many unused slots pad the array on each side.
///
/// The padding is at least one cache line,
/// so the first and the last slots don't share it with neighboring allocations.
#[inline(always)]
pub(crate) const fn slot_padding<T>() -> usize {
    (DESTRUCTIVE_INTERFERENCE_SIZE - 1) / size_of::<Slot<T>>() + 1
}

/// Picks the stride that makes consecutive tickets land far from each other.
///
/// Among the primes that neither divide nor are divided by the `capacity`
/// it chooses the one that maximizes the distance between two adjacent tickets
/// modulo the `capacity`. The stride is therefore coprime to the `capacity`
/// and the mapping stays a bijection over one lap. It returns 1 if nothing is better.
pub(crate) fn compute_stride(capacity: usize) -> usize {
    let mut best_stride = 1;
    let mut best_separation = 1;

    for stride in STRIDE_PRIMES {
        if stride % capacity == 0 || capacity % stride == 0 {
            continue;
        }

        let separation = (stride % capacity).min(capacity - stride % capacity);

        if separation > best_separation {
            best_stride = stride;
            best_separation = separation;
        }
    }

    best_stride
}

/// The pair of monotonic counters that hand out push and pop tickets.
///
/// Each counter occupies its own cache line.
pub struct TicketDispenser {
    push: CachePaddedAtomicU64,
    pop: CachePaddedAtomicU64,
}

impl TicketDispenser {
    pub(crate) fn new() -> Self {
        Self {
            push: CachePaddedAtomicU64::new(0),
            pop: CachePaddedAtomicU64::new(0),
        }
    }

    /// Returns the next push ticket.
    #[inline(always)]
    pub(crate) fn pushes(&self) -> u64 {
        self.push.load(Acquire)
    }

    /// Returns the next pop ticket.
    #[inline(always)]
    pub(crate) fn pops(&self) -> u64 {
        self.pop.load(Acquire)
    }

    /// Unconditionally takes the next push ticket.
    #[inline(always)]
    pub(crate) fn take_push(&self) -> u64 {
        self.push.fetch_add(1, AcqRel)
    }

    /// Unconditionally takes the next pop ticket.
    #[inline(always)]
    pub(crate) fn take_pop(&self) -> u64 {
        self.pop.fetch_add(1, AcqRel)
    }

    /// Takes the push `ticket` if it is still the next one.
    #[inline(always)]
    pub(crate) fn try_take_push(&self, ticket: u64) -> Result<(), u64> {
        self.push
            .compare_exchange(ticket, ticket + 1, AcqRel, Acquire)
            .map(|_| ())
    }

    /// Takes the pop `ticket` if it is still the next one.
    #[inline(always)]
    pub(crate) fn try_take_pop(&self, ticket: u64) -> Result<(), u64> {
        self.pop
            .compare_exchange(ticket, ticket + 1, AcqRel, Acquire)
            .map(|_| ())
    }

    /// Returns the number of pushes minus the number of pops.
    ///
    /// The result is negative if there are pending pops.
    /// It is linearizable: one counter is read twice without the other one changing in between.
    #[allow(clippy::cast_possible_wrap, reason = "The difference is small")]
    pub(crate) fn size(&self) -> i64 {
        let mut pushes = self.pushes();
        let mut pops = self.pops();

        loop {
            let next_pushes = self.pushes();

            if pushes == next_pushes {
                // pushes is correct and pops was read in between
                return pushes.wrapping_sub(pops) as i64;
            }

            pushes = next_pushes;

            let next_pops = self.pops();

            if pops == next_pops {
                return pushes.wrapping_sub(pops) as i64;
            }

            pops = next_pops;
        }
    }

    /// Returns the size that is read without a consistency check.
    #[allow(clippy::cast_possible_wrap, reason = "The difference is small")]
    pub(crate) fn size_guess(&self) -> i64 {
        self.pushes().wrapping_sub(self.pops()) as i64
    }
}

impl fmt::Debug for TicketDispenser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketDispenser")
            .field("push", &self.pushes())
            .field("pop", &self.pops())
            .finish()
    }
}

/// An immutable array of slots together with everything needed to map tickets onto it.
///
/// Ticket `t` (with `t >= offset`) maps to slot
/// `((t - offset) * stride) % capacity + padding` and to turn `(t - offset) / capacity`.
pub struct SlotArray<T> {
    slots: Box<[Slot<T>]>,
    capacity: usize,
    stride: usize,
    offset: u64,
}

impl<T> SlotArray<T> {
    /// Allocates a new array for `capacity` elements whose first ticket is `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CapacityOverflow`] if the padded length overflows
    /// and [`QueueError::AllocationFailed`] if the memory can't be allocated.
    pub(crate) fn try_new(capacity: usize, offset: u64) -> Result<Self, QueueError> {
        assert_hint(capacity > 0, "the capacity of a slot array can't be zero");

        let len = slot_padding::<T>()
            .checked_mul(2)
            .and_then(|padding| padding.checked_add(capacity))
            .ok_or(QueueError::CapacityOverflow(capacity))?;
        let mut slots = Vec::new();

        slots
            .try_reserve_exact(len)
            .map_err(|_| QueueError::AllocationFailed(capacity))?;
        slots.extend((0..len).map(|_| Slot::new()));

        Ok(Self {
            slots: slots.into_boxed_slice(),
            capacity,
            stride: compute_stride(capacity),
            offset,
        })
    }

    /// Returns the number of usable slots.
    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the stride of the array.
    #[inline(always)]
    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the first ticket that maps to this array.
    #[inline(always)]
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the index of the slot the `ticket` maps to.
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation, reason = "The result is below the capacity")]
    fn index(&self, ticket: u64) -> usize {
        debug_assert!(ticket >= self.offset, "ticket {ticket} precedes the array");

        let capacity = self.capacity as u64;
        let lap_position = (ticket - self.offset) % capacity;

        ((lap_position * self.stride as u64) % capacity) as usize + slot_padding::<T>()
    }

    /// Returns the turn of the slot the `ticket` maps to.
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation, reason = "Turns wrap around")]
    fn turn(&self, ticket: u64) -> u32 {
        ((ticket - self.offset) / self.capacity as u64) as u32
    }

    /// Returns the slot and the turn the `ticket` maps to.
    #[inline(always)]
    fn locate(&self, ticket: u64) -> (&Slot<T>, u32) {
        (&self.slots[self.index(ticket)], self.turn(ticket))
    }
}

impl<T> fmt::Debug for SlotArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotArray")
            .field("capacity", &self.capacity)
            .field("stride", &self.stride)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// A ticket together with the array it maps to.
///
/// A claim is either reserved (the ticket was taken from the dispenser,
/// so the caller must finish the operation) or observed
/// (the ticket is only the next one, and the caller may only wait on it).
pub struct Claim<'array, T> {
    ticket: u64,
    array: &'array SlotArray<T>,
}

impl<'array, T> Claim<'array, T> {
    #[inline(always)]
    pub(crate) fn new(ticket: u64, array: &'array SlotArray<T>) -> Self {
        Self { ticket, array }
    }

    /// Returns the global ticket.
    #[inline(always)]
    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    #[inline(always)]
    fn update_spin_cutoff(&self) -> bool {
        self.ticket % ADAPTATION_FREQ == 0
    }

    /// Returns `true` if the slot is ready for the push of this ticket.
    #[inline(always)]
    pub(crate) fn may_enqueue(&self) -> bool {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.may_enqueue(turn)
    }

    /// Returns `true` if the slot is ready for the pop of this ticket.
    #[inline(always)]
    pub(crate) fn may_dequeue(&self) -> bool {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.may_dequeue(turn)
    }

    /// Pushes the `value` with the reserved ticket, blocking until the slot is empty.
    #[inline]
    pub(crate) fn enqueue(self, spin_cutoff: &SpinCutoff, value: T) {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.enqueue(turn, spin_cutoff, self.update_spin_cutoff(), value);
    }

    /// Pops a value with the reserved ticket, blocking until the slot is full.
    #[inline]
    pub(crate) fn dequeue(self, spin_cutoff: &SpinCutoff) -> T {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.dequeue(turn, spin_cutoff, self.update_spin_cutoff())
    }

    /// Waits until the slot is ready for the push of this ticket or until the `deadline`.
    pub(crate) fn try_wait_for_enqueue_turn_until(
        &self,
        spin_cutoff: &SpinCutoff,
        deadline: Instant,
    ) -> bool {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.try_wait_for_enqueue_turn_until(turn, spin_cutoff, self.update_spin_cutoff(), deadline)
    }

    /// Waits until the slot is ready for the pop of this ticket or until the `deadline`.
    pub(crate) fn try_wait_for_dequeue_turn_until(
        &self,
        spin_cutoff: &SpinCutoff,
        deadline: Instant,
    ) -> bool {
        let (slot, turn) = self.array.locate(self.ticket);

        slot.try_wait_for_dequeue_turn_until(turn, spin_cutoff, self.update_spin_cutoff(), deadline)
    }
}

impl<T> fmt::Debug for Claim<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("ticket", &self.ticket)
            .field("array", &self.array)
            .finish()
    }
}

/// The ticket-obtaining primitives of a ticket queue.
///
/// This trait is sealed: the crate implements it once per queue,
/// and [`TicketQueue`](crate::TicketQueue) builds every public operation on top of it.
pub trait TicketSource<T> {
    /// Returns the ticket counters.
    fn dispenser(&self) -> &TicketDispenser;

    /// Returns the spin cutoff of the producers.
    fn push_spin_cutoff(&self) -> &SpinCutoff;

    /// Returns the spin cutoff of the consumers.
    fn pop_spin_cutoff(&self) -> &SpinCutoff;

    /// Reserves a push ticket unconditionally.
    fn blocking_push_claim(&self) -> Claim<'_, T>;

    /// Reserves a pop ticket unconditionally.
    fn blocking_pop_claim(&self) -> Claim<'_, T>;

    /// Reserves a push ticket whose slot is empty right now.
    fn try_obtain_ready_push_claim(&self) -> Option<Claim<'_, T>>;

    /// Reserves a push ticket if the queue is not full.
    ///
    /// On failure returns the observed next push ticket to wait on.
    fn try_obtain_promised_push_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>>;

    /// Reserves a pop ticket whose slot is full right now.
    fn try_obtain_ready_pop_claim(&self) -> Option<Claim<'_, T>>;

    /// Reserves a pop ticket if the queue has a pushed element for it.
    ///
    /// On failure returns the observed next pop ticket to wait on.
    fn try_obtain_promised_pop_claim(&self) -> Result<Claim<'_, T>, Claim<'_, T>>;
}

#[cfg(all(test, not(ticketq_loom)))]
mod tests {
    use super::*;

    const fn gcd(a: usize, b: usize) -> usize {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }

    #[test]
    fn test_compute_stride() {
        assert_eq!(compute_stride(1), 1);
        assert_eq!(compute_stride(2), 1);
        assert_eq!(compute_stride(4), 1);
        assert_eq!(compute_stride(8), 3);
        assert_eq!(compute_stride(10), 3);

        for capacity in 1..1000 {
            assert_eq!(gcd(compute_stride(capacity), capacity), 1, "capacity: {capacity}");
        }
    }

    #[test]
    fn test_ticket_mapping_is_a_bijection_over_a_lap() {
        for capacity in [1, 2, 3, 4, 7, 10, 64, 100, 1000] {
            for offset in [0, 13] {
                let array = SlotArray::<u64>::try_new(capacity, offset).unwrap();
                let padding = slot_padding::<u64>();
                let mut seen = vec![false; capacity];

                for ticket in offset..offset + capacity as u64 {
                    let index = array.index(ticket);

                    assert!((padding..padding + capacity).contains(&index));
                    assert!(!seen[index - padding], "capacity: {capacity}, ticket: {ticket}");
                    assert_eq!(array.turn(ticket), 0);

                    seen[index - padding] = true;
                }

                assert_eq!(array.turn(offset + capacity as u64), 1);
                assert_eq!(array.index(offset + capacity as u64), array.index(offset));
            }
        }
    }

    #[test]
    fn test_slot_array_is_padded() {
        let array = SlotArray::<u8>::try_new(5, 0).unwrap();

        assert_eq!(array.slots.len(), 5 + 2 * slot_padding::<u8>());
        assert!(slot_padding::<u8>() * size_of::<Slot<u8>>() >= DESTRUCTIVE_INTERFERENCE_SIZE);
        assert_eq!(slot_padding::<[u8; 4096]>(), 1);
    }

    #[test]
    fn test_slot_array_rejects_overflowing_capacity() {
        assert_eq!(
            SlotArray::<u64>::try_new(usize::MAX, 0).err(),
            Some(QueueError::CapacityOverflow(usize::MAX))
        );
        assert_eq!(
            SlotArray::<u64>::try_new(usize::MAX / 2, 0).err(),
            Some(QueueError::AllocationFailed(usize::MAX / 2))
        );
    }

    #[test]
    fn test_dispenser_size() {
        let dispenser = TicketDispenser::new();

        assert_eq!(dispenser.size(), 0);

        dispenser.take_push();
        dispenser.take_push();
        dispenser.take_push();
        dispenser.take_pop();

        assert_eq!(dispenser.size(), 2);
        assert_eq!(dispenser.size_guess(), 2);

        dispenser.take_pop();
        dispenser.take_pop();
        dispenser.take_pop();

        assert_eq!(dispenser.size(), -1);
        assert_eq!(dispenser.try_take_push(2), Err(3));
        assert_eq!(dispenser.try_take_push(3), Ok(()));
        assert_eq!(dispenser.pushes(), 4);
    }
}
