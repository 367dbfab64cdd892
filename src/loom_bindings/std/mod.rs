mod mutex;

pub mod hint {
    pub use std::hint::spin_loop;
}

pub mod sync {
    pub use std::sync::Arc;

    pub use crate::loom_bindings::std::mutex::Mutex;

    pub mod atomic {
        pub use std::sync::atomic::{fence, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize};
    }
}

pub mod thread {
    #[inline]
    pub fn yield_now() {
        std::thread::yield_now();
    }

    pub use std::thread::{sleep, spawn, JoinHandle};
}

/// Parking of threads on an address, filtered by a token.
///
/// It is a thin wrapper over `parking_lot_core` that emulates `FUTEX_WAIT_BITSET` and
/// `FUTEX_WAKE_BITSET`: a thread parks with a token, and a waker unparks only the threads
/// whose token passes its filter.
pub mod parking {
    use parking_lot_core::{FilterOp, ParkResult, ParkToken, DEFAULT_UNPARK_TOKEN};
    use std::time::Instant;

    /// The reason [`park`] has returned.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Wake {
        /// Another thread has unparked us.
        Unparked,
        /// The validation has failed, the thread has not been parked.
        Invalid,
        /// The deadline has elapsed.
        TimedOut,
    }

    /// Parks the current thread on `key` with `token` if `validate` returns `true`.
    ///
    /// `validate` is called under the queue lock of the `key`,
    /// therefore it can't race with [`unpark_filter`] of the same `key`.
    pub fn park(
        key: usize,
        token: usize,
        validate: impl FnOnce() -> bool,
        deadline: Option<Instant>,
    ) -> Wake {
        // `validate` and the empty callbacks neither panic nor park.
        let res = unsafe {
            parking_lot_core::park(
                key,
                validate,
                || {},
                |_, _| {},
                ParkToken(token),
                deadline,
            )
        };

        match res {
            ParkResult::Unparked(_) => Wake::Unparked,
            ParkResult::Invalid => Wake::Invalid,
            ParkResult::TimedOut => Wake::TimedOut,
        }
    }

    /// Unparks all threads parked on `key` whose token satisfies `filter`.
    /// Returns their number.
    pub fn unpark_filter(key: usize, filter: impl Fn(usize) -> bool) -> usize {
        // The filter and the callback neither panic nor park.
        let res = unsafe {
            parking_lot_core::unpark_filter(
                key,
                |ParkToken(parked)| {
                    if filter(parked) {
                        FilterOp::Unpark
                    } else {
                        FilterOp::Skip
                    }
                },
                |_| DEFAULT_UNPARK_TOKEN,
            )
        };

        res.unparked_threads
    }
}
