//! This module provides a [`Backoff`] for the short retry loops of the queues:
//! lost races on a ticket dispenser and seqlock read sections that overlapped an expansion.
//!
//! Waiting for a turn never uses it; the turn sequencer has its own adaptive spin cutoff
//! and parks the thread after it.
use crate::hints::likely;
use core::cell::Cell;
use core::fmt;

const SPIN_LIMIT: u32 = 6;

/// Performs exponential backoff in spin loops.
///
/// Each step of the back off procedure takes roughly twice as long as the previous step.
/// After [`SPIN_LIMIT`] steps [`Backoff::snooze`] yields the thread to the OS scheduler
/// instead of spinning.
pub(crate) struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    /// Creates a new `Backoff` instance.
    #[inline]
    pub(crate) fn new() -> Self {
        Self { step: Cell::new(0) }
    }

    /// Backs off in a lock-free loop.
    ///
    /// It should be used when we retry an operation because another thread made progress,
    /// for example, when a compare-and-swap on a ticket dispenser has failed.
    #[inline]
    pub(crate) fn spin(&self) {
        for _ in 0..1 << self.step.get().min(SPIN_LIMIT) {
            crate::loom_bindings::hint::spin_loop();
        }

        if self.step.get() <= SPIN_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// Backs off in a blocking loop.
    ///
    /// It should be used when we wait for another thread to make progress,
    /// for example, for an expansion that holds the seqlock.
    #[inline]
    pub(crate) fn snooze(&self) {
        if likely(self.step.get() <= SPIN_LIMIT) {
            for _ in 0..1 << self.step.get() {
                crate::loom_bindings::hint::spin_loop();
            }
        } else {
            crate::loom_bindings::thread::yield_now();
        }

        self.step.set(self.step.get().saturating_add(1));
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff")
            .field("step", &self.step)
            .finish()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
