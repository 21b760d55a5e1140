//! Position arithmetic shared by both queue strategies.
//!
//! Positions are `u64` counters that only move forward. They live on a ring
//! of length `L`, the largest multiple of the capacity that fits in `2^64`,
//! so that `position % capacity` stays continuous when a counter wraps. For
//! power-of-two capacities `L = 2^64` and this is ordinary wrapping
//! arithmetic.
//!
//! Occupancy is always an unsigned modular distance. Never compare two
//! positions with `<`: after a wrap the newer position is numerically smaller.

/// Counter ring for one queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ring {
    capacity: u64,
    /// `capacity - 1` when the capacity is a power of two.
    mask: Option<u64>,
    /// Last valid position, `L - 1`.
    last: u64,
    /// `2^64 - L`, the positions skipped at the wrap.
    gap: u64,
}

impl Ring {
    /// `capacity` must be non-zero.
    pub(crate) fn new(capacity: u64) -> Self {
        debug_assert!(capacity > 0);
        let gap = (u64::MAX % capacity + 1) % capacity;
        Ring {
            capacity,
            mask: capacity.is_power_of_two().then(|| capacity - 1),
            last: u64::MAX - gap,
            gap,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Highest distance the producer side may reach.
    #[inline]
    pub(crate) fn usable(&self) -> u64 {
        self.capacity - 1
    }

    #[inline]
    pub(crate) fn last(&self) -> u64 {
        self.last
    }

    /// Whether `position` lies on the ring.
    #[inline]
    pub(crate) fn contains(&self, position: u64) -> bool {
        position <= self.last
    }

    #[inline]
    pub(crate) fn next(&self, position: u64) -> u64 {
        if position == self.last {
            0
        } else {
            position + 1
        }
    }

    /// Number of positions from `behind` up to (excluding) `ahead`.
    #[inline]
    pub(crate) fn distance(&self, ahead: u64, behind: u64) -> u64 {
        if ahead >= behind {
            ahead - behind
        } else {
            ahead.wrapping_sub(behind).wrapping_sub(self.gap)
        }
    }

    /// Storage index for `position`.
    #[inline]
    pub(crate) fn slot(&self, position: u64) -> usize {
        let index = match self.mask {
            Some(mask) => position & mask,
            None => position % self.capacity,
        };
        index as usize
    }
}
