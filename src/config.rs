//! Configuration of the queues.
//!
//! Both configs are plain values with builder-style setters:
//!
//! ```
//! use ticketq::{DynamicQueueConfig, SpinPolicy};
//!
//! let config = DynamicQueueConfig::new(10_000)
//!     .min_capacity(16)
//!     .expansion_multiplier(4)
//!     .spin_policy(SpinPolicy::Fixed(0));
//!
//! assert_eq!(config.capacity(), 10_000);
//! ```

/// How long a thread spins on a slot before it parks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinPolicy {
    /// The cutoff is an exponential moving average of how many spins
    /// the preceding turns needed. It is re-estimated on every 128th ticket.
    #[default]
    Adaptive,
    /// The thread spins exactly this many times before it parks.
    ///
    /// `Fixed(0)` parks immediately, which makes the tests deterministic.
    Fixed(u32),
}

/// The configuration of a [`BoundedQueue`](crate::mpmc::BoundedQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    capacity: usize,
    spin_policy: SpinPolicy,
}

impl QueueConfig {
    /// Creates a new config with the given capacity and the [`SpinPolicy::Adaptive`].
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            spin_policy: SpinPolicy::Adaptive,
        }
    }

    /// Sets the [`SpinPolicy`].
    #[must_use]
    pub const fn spin_policy(mut self, spin_policy: SpinPolicy) -> Self {
        self.spin_policy = spin_policy;

        self
    }

    /// Returns the capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the [`SpinPolicy`].
    pub const fn get_spin_policy(&self) -> SpinPolicy {
        self.spin_policy
    }
}

/// The configuration of a [`DynamicQueue`](crate::mpmc::DynamicQueue).
///
/// The queue starts with `min(min_capacity, capacity)` slots and multiplies
/// its capacity by `expansion_multiplier` until it reaches `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicQueueConfig {
    capacity: usize,
    min_capacity: usize,
    expansion_multiplier: usize,
    spin_policy: SpinPolicy,
}

impl DynamicQueueConfig {
    /// The default starting capacity.
    pub const DEFAULT_MIN_CAPACITY: usize = 10;
    /// The default expansion multiplier.
    pub const DEFAULT_EXPANSION_MULTIPLIER: usize = 10;

    /// Creates a new config with the given maximum capacity and the default
    /// starting capacity, multiplier and [`SpinPolicy`].
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            min_capacity: Self::DEFAULT_MIN_CAPACITY,
            expansion_multiplier: Self::DEFAULT_EXPANSION_MULTIPLIER,
            spin_policy: SpinPolicy::Adaptive,
        }
    }

    /// Sets the starting capacity. Zero is treated as one.
    #[must_use]
    pub const fn min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = if min_capacity == 0 { 1 } else { min_capacity };

        self
    }

    /// Sets the expansion multiplier. Values below two are treated as two.
    #[must_use]
    pub const fn expansion_multiplier(mut self, expansion_multiplier: usize) -> Self {
        self.expansion_multiplier = if expansion_multiplier < 2 {
            2
        } else {
            expansion_multiplier
        };

        self
    }

    /// Sets the [`SpinPolicy`].
    #[must_use]
    pub const fn spin_policy(mut self, spin_policy: SpinPolicy) -> Self {
        self.spin_policy = spin_policy;

        self
    }

    /// Returns the maximum capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the capacity of the first slot array.
    pub const fn initial_capacity(&self) -> usize {
        if self.min_capacity < self.capacity {
            self.min_capacity
        } else {
            self.capacity
        }
    }

    /// Returns the expansion multiplier.
    pub const fn get_expansion_multiplier(&self) -> usize {
        self.expansion_multiplier
    }

    /// Returns the [`SpinPolicy`].
    pub const fn get_spin_policy(&self) -> SpinPolicy {
        self.spin_policy
    }

    /// Returns how many times the queue can expand before it reaches its capacity.
    pub(crate) fn max_expansions(&self) -> usize {
        let mut expansions = 0;
        let mut expanded = self.initial_capacity();

        while expanded < self.capacity {
            expanded = expanded.saturating_mul(self.expansion_multiplier);
            expansions += 1;
        }

        expansions
    }
}

impl From<QueueConfig> for DynamicQueueConfig {
    fn from(config: QueueConfig) -> Self {
        Self::new(config.capacity).spin_policy(config.spin_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_config_clamps() {
        let config = DynamicQueueConfig::new(100)
            .min_capacity(0)
            .expansion_multiplier(1);

        assert_eq!(config.initial_capacity(), 1);
        assert_eq!(config.get_expansion_multiplier(), 2);
        // 1 -> 2 -> 4 -> 8 -> 16 -> 32 -> 64 -> 128
        assert_eq!(config.max_expansions(), 7);
    }

    #[test]
    fn test_dynamic_config_defaults() {
        let config = DynamicQueueConfig::new(1000);

        assert_eq!(config.initial_capacity(), 10);
        assert_eq!(config.get_expansion_multiplier(), 10);
        assert_eq!(config.get_spin_policy(), SpinPolicy::Adaptive);
        assert_eq!(config.max_expansions(), 2);

        let small = DynamicQueueConfig::new(4);

        assert_eq!(small.initial_capacity(), 4);
        assert_eq!(small.max_expansions(), 0);
    }
}
