//! This module provides the [`TurnSequencer`]: a single 32-bit atomic that lets many threads
//! take strictly ordered turns with minimal wakeups.
//!
//! # State encoding
//!
//! ```text
//! 31                                 6 5           0
//! +-----------------------------------+-------------+
//! |            current turn           | waiters max |
//! +-----------------------------------+-------------+
//! ```
//!
//! The low bits hold how far in the future the farthest registered waiter is
//! (saturated to 63). A thread that completes a turn decrements it and,
//! if it was not zero, unparks the threads that wait for the next turn.
//!
//! Parked threads are filtered by `turn % 32`, exactly like `FUTEX_WAKE_BITSET` with
//! 32 channels would do. A waiter for a far turn is woken spuriously at least once
//! every 32 turns and re-registers itself, so the saturation of the waiters delta
//! can't lose a wakeup.
use crate::cache_padded::CachePaddedAtomicU32;
use crate::config::SpinPolicy;
use crate::hints::unlikely;
use crate::loom_bindings::hint::spin_loop;
use crate::loom_bindings::parking::{self, Wake};
use crate::loom_bindings::sync::atomic::AtomicU32;
use std::fmt;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::time::Instant;

/// How many bits of the state hold the waiters delta.
const TURN_SHIFT: u32 = 6;
const WAITERS_MASK: u32 = (1 << TURN_SHIFT) - 1;
/// How many parking channels there are. Turns that are equal modulo it share a channel.
const CHANNELS: usize = 32;

/// The minimum spin count that the adaptation can choose.
pub const MIN_SPIN_LIMIT: u32 = 1 << 1;
/// The maximum spin count. If we have spun this much, spinning was pointless.
pub const MAX_SPIN_LIMIT: u32 = 1 << 10;

#[inline(always)]
const fn encode(current_sturn: u32, max_waiters_delta: u32) -> u32 {
    current_sturn
        | if max_waiters_delta > WAITERS_MASK {
            WAITERS_MASK
        } else {
            max_waiters_delta
        }
}

#[inline(always)]
const fn decode_current_sturn(state: u32) -> u32 {
    state & !WAITERS_MASK
}

#[inline(always)]
const fn decode_max_waiters_delta(state: u32) -> u32 {
    state & WAITERS_MASK
}

#[inline(always)]
const fn same_channel(a: usize, b: usize) -> bool {
    a % CHANNELS == b % CHANNELS
}

/// The result of [`TurnSequencer::try_wait_for_turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWaitResult {
    /// The turn has arrived.
    Success,
    /// The turn has already been completed.
    Past,
    /// The deadline has elapsed before the turn arrived.
    TimedOut,
}

/// The spin cutoff shared by all the slots of one side of a queue.
///
/// With [`SpinPolicy::Adaptive`] it is an exponential moving average of how long
/// the preceding turns took to arrive; the waiters update it only when asked to,
/// which the queues do on every 128th ticket to keep the fast path cheap.
pub struct SpinCutoff {
    cutoff: CachePaddedAtomicU32,
    policy: SpinPolicy,
}

impl SpinCutoff {
    /// Creates a new cutoff that follows the given [`SpinPolicy`].
    pub fn new(policy: SpinPolicy) -> Self {
        Self {
            cutoff: CachePaddedAtomicU32::new(0),
            policy,
        }
    }

    /// Returns the current learned cutoff. Zero means that nothing has been learned yet.
    pub fn get(&self) -> u32 {
        self.cutoff.load(Relaxed)
    }

    /// Returns the [`SpinPolicy`] of this cutoff.
    pub fn policy(&self) -> SpinPolicy {
        self.policy
    }

    #[inline(always)]
    fn should_adapt(&self, prev_thresh: u32, update_spin_cutoff: bool) -> bool {
        matches!(self.policy, SpinPolicy::Adaptive) && (update_spin_cutoff || prev_thresh == 0)
    }

    #[inline(always)]
    fn effective(&self, prev_thresh: u32, update_spin_cutoff: bool) -> u32 {
        match self.policy {
            SpinPolicy::Fixed(spins) => spins,
            SpinPolicy::Adaptive if update_spin_cutoff || prev_thresh == 0 => MAX_SPIN_LIMIT,
            SpinPolicy::Adaptive => prev_thresh,
        }
    }

    #[cold]
    fn adapt(&self, prev_thresh: u32, tries: u32) {
        // We allow ourselves to spin 2 * N when we think that N is required to succeed.
        let target = if tries >= MAX_SPIN_LIMIT {
            MIN_SPIN_LIMIT
        } else {
            tries.saturating_mul(2).clamp(MIN_SPIN_LIMIT, MAX_SPIN_LIMIT)
        };

        if prev_thresh == 0 {
            self.cutoff.store(target, Relaxed);
        } else {
            // Exponential moving average with alpha of 7/8. Try once, keep moving on failure.
            let delta = (i64::from(target) - i64::from(prev_thresh)) / 8;
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "The average stays between the two u32 operands"
            )]
            let next = (i64::from(prev_thresh) + delta) as u32;

            let _ = self
                .cutoff
                .compare_exchange_weak(prev_thresh, next, Relaxed, Relaxed);
        }
    }
}

impl Default for SpinCutoff {
    fn default() -> Self {
        Self::new(SpinPolicy::Adaptive)
    }
}

impl fmt::Debug for SpinCutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinCutoff")
            .field("cutoff", &self.get())
            .field("policy", &self.policy)
            .finish()
    }
}

/// A synchronization primitive that serializes threads by the turns they were given.
///
/// A thread that holds turn `t` calls [`complete_turn(t)`](Self::complete_turn)
/// exactly once; it makes turn `t + 1` current and wakes only the threads
/// that wait for it. Turns are 32-bit numbers compared wrap-safely,
/// so any starting turn is fine.
///
/// # Example
///
/// ```
/// use ticketq::turn_sequencer::{SpinCutoff, TurnSequencer};
///
/// let sequencer = TurnSequencer::new(0);
/// let cutoff = SpinCutoff::default();
///
/// sequencer.wait_for_turn(0, &cutoff, false);
/// sequencer.complete_turn(0);
///
/// assert!(sequencer.is_turn(1));
/// ```
pub struct TurnSequencer {
    state: AtomicU32,
}

impl TurnSequencer {
    /// Creates a new sequencer whose current turn is `first_turn`.
    pub fn new(first_turn: u32) -> Self {
        Self {
            state: AtomicU32::new(encode(first_turn << TURN_SHIFT, 0)),
        }
    }

    /// Returns the parking key of this sequencer.
    #[inline(always)]
    fn key(&self) -> usize {
        std::ptr::from_ref(&self.state) as usize
    }

    /// Returns `true` if `turn` is the current turn.
    #[inline]
    pub fn is_turn(&self, turn: u32) -> bool {
        decode_current_sturn(self.state.load(Acquire)) == turn << TURN_SHIFT
    }

    /// Blocks until `turn` becomes the current turn.
    ///
    /// It spins first (see [`SpinCutoff`]) and then parks the thread.
    /// The caller must guarantee that the preceding turns will be completed.
    pub fn wait_for_turn(&self, turn: u32, spin_cutoff: &SpinCutoff, update_spin_cutoff: bool) {
        let res = self.try_wait_for_turn(turn, spin_cutoff, update_spin_cutoff, None);

        debug_assert_eq!(
            res,
            TryWaitResult::Success,
            "waited for turn {turn} that has already been completed"
        );
    }

    /// Waits until `turn` becomes the current turn or until the `deadline` elapses.
    ///
    /// On [`TryWaitResult::TimedOut`] nothing has been changed
    /// except the waiters delta, which only causes one extra wakeup attempt.
    pub fn try_wait_for_turn(
        &self,
        turn: u32,
        spin_cutoff: &SpinCutoff,
        update_spin_cutoff: bool,
        deadline: Option<Instant>,
    ) -> TryWaitResult {
        let prev_thresh = spin_cutoff.get();
        let effective_spin_cutoff = spin_cutoff.effective(prev_thresh, update_spin_cutoff);
        let sturn = turn << TURN_SHIFT;
        let mut tries: u32 = 0;

        loop {
            let state = self.state.load(Acquire);
            let current_sturn = decode_current_sturn(state);

            if current_sturn == sturn {
                break;
            }

            // Wrap-safe version of `current_sturn > sturn`.
            if unlikely(sturn.wrapping_sub(current_sturn) >= u32::MAX / 2) {
                return TryWaitResult::Past;
            }

            tries = tries.saturating_add(1);

            if tries <= effective_spin_cutoff {
                spin_loop();

                continue;
            }

            let current_max_waiters_delta = decode_max_waiters_delta(state);
            let our_waiters_delta = sturn.wrapping_sub(current_sturn) >> TURN_SHIFT;
            let new_state = if our_waiters_delta <= current_max_waiters_delta {
                state
            } else {
                let new_state = encode(current_sturn, our_waiters_delta);

                if state != new_state
                    && self
                        .state
                        .compare_exchange(state, new_state, AcqRel, Relaxed)
                        .is_err()
                {
                    continue;
                }

                new_state
            };

            let wake = parking::park(
                self.key(),
                turn as usize,
                || self.state.load(Acquire) == new_state,
                deadline,
            );

            if wake == Wake::TimedOut {
                return TryWaitResult::TimedOut;
            }
        }

        if spin_cutoff.should_adapt(prev_thresh, update_spin_cutoff) {
            spin_cutoff.adapt(prev_thresh, tries);
        }

        TryWaitResult::Success
    }

    /// Completes `turn`, which must be the current turn, and wakes the waiters
    /// of the next one.
    pub fn complete_turn(&self, turn: u32) {
        let mut state = self.state.load(Acquire);

        loop {
            debug_assert_eq!(
                decode_current_sturn(state),
                turn << TURN_SHIFT,
                "completed turn {turn} is not the current one"
            );

            let max_waiters_delta = decode_max_waiters_delta(state);
            let new_state = encode(
                turn.wrapping_add(1) << TURN_SHIFT,
                max_waiters_delta.saturating_sub(1),
            );

            match self.state.compare_exchange(state, new_state, AcqRel, Acquire) {
                Ok(_) => {
                    if max_waiters_delta != 0 {
                        let next = turn.wrapping_add(1) as usize;

                        self.unpark_channel(next);
                    }

                    break;
                }
                Err(current) => state = current,
            }
        }
    }

    #[cold]
    fn unpark_channel(&self, turn: usize) {
        // A parked token is the turn its thread waits for.
        parking::unpark_filter(self.key(), |token| same_channel(token, turn));
    }

    /// Returns the least significant bits of the turn that has not been completed yet.
    ///
    /// It is meant for teardown: a slot whose uncompleted turn is odd holds a value.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "We want only the lowest bits"
    )]
    pub fn uncompleted_turn_lsb(&self) -> u8 {
        (self.state.load(Acquire) >> TURN_SHIFT) as u8
    }
}

impl Default for TurnSequencer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for TurnSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Relaxed);

        f.debug_struct("TurnSequencer")
            .field("turn", &(decode_current_sturn(state) >> TURN_SHIFT))
            .field("max_waiters_delta", &decode_max_waiters_delta(state))
            .finish()
    }
}
