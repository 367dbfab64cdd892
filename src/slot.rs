//! This module provides the [`Slot`]: one cell of a ticket queue.
//!
//! A slot alternates between being empty and being full, and its [`TurnSequencer`]
//! decides who may touch it: turn `2 * k` belongs to the `k`-th producer of the slot,
//! turn `2 * k + 1` belongs to the `k`-th consumer.
use crate::turn_sequencer::{SpinCutoff, TryWaitResult, TurnSequencer};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::time::Instant;

#[inline(always)]
const fn enqueue_turn(turn: u32) -> u32 {
    turn.wrapping_mul(2)
}

#[inline(always)]
const fn dequeue_turn(turn: u32) -> u32 {
    turn.wrapping_mul(2).wrapping_add(1)
}

/// A turn-guarded storage for exactly one value.
///
/// The value is initialized if and only if the uncompleted turn of the sequencer is odd.
pub(crate) struct Slot<T> {
    sequencer: TurnSequencer,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    /// Creates a new empty slot.
    pub(crate) fn new() -> Self {
        Self {
            sequencer: TurnSequencer::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Waits for the `turn`-th enqueue turn and writes the `value`.
    ///
    /// The caller must own the ticket that maps to this slot and `turn`.
    pub(crate) fn enqueue(
        &self,
        turn: u32,
        spin_cutoff: &SpinCutoff,
        update_spin_cutoff: bool,
        value: T,
    ) {
        self.sequencer
            .wait_for_turn(enqueue_turn(turn), spin_cutoff, update_spin_cutoff);

        // SAFETY: the turn gives us exclusive access to the empty slot.
        unsafe { (*self.value.get()).write(value) };

        self.sequencer.complete_turn(enqueue_turn(turn));
    }

    /// Waits for the `turn`-th dequeue turn and takes the value out.
    ///
    /// The caller must own the ticket that maps to this slot and `turn`.
    pub(crate) fn dequeue(&self, turn: u32, spin_cutoff: &SpinCutoff, update_spin_cutoff: bool) -> T {
        self.sequencer
            .wait_for_turn(dequeue_turn(turn), spin_cutoff, update_spin_cutoff);

        // SAFETY: the turn gives us exclusive access to the full slot.
        let value = unsafe { (*self.value.get()).assume_init_read() };

        self.sequencer.complete_turn(dequeue_turn(turn));

        value
    }

    /// Waits for the `turn`-th enqueue turn until the `deadline`.
    /// Returns `false` only if the `deadline` has elapsed. A turn that is already
    /// past also returns `true`, so the caller takes a fresh ticket.
    pub(crate) fn try_wait_for_enqueue_turn_until(
        &self,
        turn: u32,
        spin_cutoff: &SpinCutoff,
        update_spin_cutoff: bool,
        deadline: Instant,
    ) -> bool {
        self.sequencer.try_wait_for_turn(
            enqueue_turn(turn),
            spin_cutoff,
            update_spin_cutoff,
            Some(deadline),
        ) != TryWaitResult::TimedOut
    }

    /// Waits for the `turn`-th dequeue turn until the `deadline`.
    /// Returns `false` only if the `deadline` has elapsed. A turn that is already
    /// past also returns `true`, so the caller takes a fresh ticket.
    pub(crate) fn try_wait_for_dequeue_turn_until(
        &self,
        turn: u32,
        spin_cutoff: &SpinCutoff,
        update_spin_cutoff: bool,
        deadline: Instant,
    ) -> bool {
        self.sequencer.try_wait_for_turn(
            dequeue_turn(turn),
            spin_cutoff,
            update_spin_cutoff,
            Some(deadline),
        ) != TryWaitResult::TimedOut
    }

    /// Returns `true` if the `turn`-th enqueue would not block.
    #[inline]
    pub(crate) fn may_enqueue(&self, turn: u32) -> bool {
        self.sequencer.is_turn(enqueue_turn(turn))
    }

    /// Returns `true` if the `turn`-th dequeue would not block.
    #[inline]
    pub(crate) fn may_dequeue(&self, turn: u32) -> bool {
        self.sequencer.is_turn(dequeue_turn(turn))
    }

    /// Returns `true` if the slot holds a value that has not been dequeued.
    ///
    /// The result is meaningful only when no operation on the slot is in flight.
    pub(crate) fn holds_value(&self) -> bool {
        self.sequencer.uncompleted_turn_lsb() & 1 == 1
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.holds_value() {
            // SAFETY: an odd uncompleted turn means that the value was written and not read.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

// SAFETY: the sequencer serializes all accesses to the value.
unsafe impl<T: Send> Send for Slot<T> {}
// SAFETY: the sequencer serializes all accesses to the value, values are only moved in and out.
unsafe impl<T: Send> Sync for Slot<T> {}
