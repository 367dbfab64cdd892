//! This module abstracts over `loom` and `std::sync` depending on whether we
//! are running model tests or not.

#[cfg(not(all(test, ticketq_loom)))]
mod std;
#[cfg(not(all(test, ticketq_loom)))]
pub use self::std::*;

#[cfg(all(test, ticketq_loom))]
mod mocked;
#[cfg(all(test, ticketq_loom))]
pub use self::mocked::*;
