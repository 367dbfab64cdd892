//! Ticket-based multi-producer multi-consumer FIFO queues.
//!
//! Every push takes the next push ticket and every pop takes the next pop ticket
//! from a pair of atomic counters; a ticket maps to one slot of an array and to a turn
//! of that slot. Each slot has its own [`TurnSequencer`](turn_sequencer::TurnSequencer),
//! so threads that wait for different slots never contend, and a blocked thread
//! spins for a learned while and then parks until exactly its turn arrives.
//!
//! - [`BoundedQueue`] has a fixed capacity;
//! - [`DynamicQueue`] starts small and grows up to its capacity.
//!
//! Both implement [`TicketQueue`] with non-blocking, blocking and deadline-bounded
//! operations.
//!
//! # Example
//!
//! ```
//! use ticketq::{BoundedQueue, DynamicQueue, TicketQueue};
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let queue = Arc::new(DynamicQueue::new(1024).unwrap());
//! let producers: Vec<_> = (0..4)
//!     .map(|p| {
//!         let queue = queue.clone();
//!
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 queue.blocking_write(p * 100 + i);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut sum = 0;
//!
//! for _ in 0..400 {
//!     sum += queue.blocking_read();
//! }
//!
//! for producer in producers {
//!     producer.join().unwrap();
//! }
//!
//! assert_eq!(sum, (0..400).sum::<i32>());
//!
//! let bounded = BoundedQueue::new(1).unwrap();
//!
//! assert_eq!(bounded.try_write_for(1, Duration::from_millis(1)), Ok(()));
//! assert_eq!(bounded.try_write_for(2, Duration::from_millis(1)), Err(2));
//! ```
#![deny(clippy::all)]
#![deny(clippy::assertions_on_result_states)]
#![deny(clippy::match_wild_err_arm)]
#![deny(clippy::allow_attributes_without_reason)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(
    clippy::missing_const_for_fn,
    reason = "Since we cannot make a constant function non-constant after its release,
    we need to look for a reason to make it constant, and not vice versa."
)]
#![allow(clippy::inline_always, reason = "We write highly optimized code.")]
#![allow(
    clippy::must_use_candidate,
    reason = "It is better to developer think about it."
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "This is acceptable most of the time."
)]
#![allow(
    clippy::missing_errors_doc,
    reason = "Unless the error is something special,
    the developer should document it."
)]
#![allow(clippy::redundant_pub_crate, reason = "It improves readability.")]
#![allow(clippy::struct_field_names, reason = "It improves readability.")]
#![allow(clippy::if_not_else, reason = "It improves readability.")]
#![allow(
    rustdoc::private_intra_doc_links,
    reason = "It allows to create more readable docs."
)]
pub(crate) mod backoff;
pub mod cache_padded;
pub mod config;
pub mod errors;
pub mod hints;
#[cfg(all(ticketq_loom, test))]
mod loom;
pub mod loom_bindings;
pub mod mpmc;
mod slot;
#[cfg(all(test, not(ticketq_loom)))]
mod test_lock;
mod ticket;
pub mod turn_sequencer;

pub use config::{DynamicQueueConfig, QueueConfig, SpinPolicy};
pub use errors::QueueError;
pub use mpmc::{BoundedQueue, DynamicQueue, TicketQueue};
