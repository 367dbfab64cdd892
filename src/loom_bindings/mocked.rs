//! `loom` counterparts of the bindings in `std`.
//!
//! Parking is emulated by yielding: a parked thread always wakes up "spuriously"
//! and re-checks its condition, which is enough for the model checker to explore
//! the hand-offs between turns.

pub mod hint {
    pub use loom::hint::spin_loop;
}

pub mod sync {
    pub use loom::sync::{Arc, Mutex};

    pub mod atomic {
        pub use loom::sync::atomic::{fence, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize};
    }
}

pub mod thread {
    pub use loom::thread::{spawn, yield_now, JoinHandle};
}

pub mod parking {
    use std::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Wake {
        Unparked,
        Invalid,
        TimedOut,
    }

    pub fn park(
        _key: usize,
        _token: usize,
        validate: impl FnOnce() -> bool,
        deadline: Option<Instant>,
    ) -> Wake {
        if !validate() {
            return Wake::Invalid;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Wake::TimedOut;
        }

        loom::thread::yield_now();

        Wake::Unparked
    }

    pub fn unpark_filter(_key: usize, _filter: impl Fn(usize) -> bool) -> usize {
        0
    }
}
