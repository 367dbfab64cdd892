//! This module contains a lock that serializes the heavy multi-threaded tests,
//! so they don't steal each other's cores.
use crate::loom_bindings::sync::Mutex;

/// Lock for tests.
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());
