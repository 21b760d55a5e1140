//! Queue construction options.

use std::fmt;

use crate::commit::CommitQueue;
use crate::error::QueueError;
use crate::index::Ring;
use crate::status::StatusQueue;
use crate::sync::Arc;
use crate::{Consumer, Flavor, Producer, Queue};

/// Spin budget used by the slot-status strategy when none is configured.
pub const DEFAULT_SPIN_BUDGET: u32 = 64;

/// Which algorithm backs a queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Producers publish through an ordered commit counter. Consumers always
    /// see a contiguous prefix of committed slots, in reservation order. A
    /// producer stalled between reserving and committing holds back every
    /// later slot.
    #[default]
    CommitIndex,
    /// Every slot carries its own readiness flag. No producer can delay
    /// another's visibility, but there is no total order across slots and
    /// contention can surface as spurious full/empty results.
    SlotStatus,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CommitIndex => f.write_str("commit-index"),
            Strategy::SlotStatus => f.write_str("slot-status"),
        }
    }
}

/// How long a push or pop keeps retrying the CAS that claims a position.
///
/// The policy only covers claiming. Once a position is claimed the operation
/// runs to completion, waiting (spin + yield) for earlier commits or for the
/// previous lap of its slot as needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpinPolicy {
    /// Retry until the claim succeeds or the queue is observed full/empty.
    /// Some thread always makes progress; an individual one may not.
    Unbounded,
    /// Give up with a `Busy` error after this many attempts. Latency is
    /// predictable, but `Busy` does not mean the queue is full or empty.
    Bounded(u32),
}

impl SpinPolicy {
    pub(crate) fn budget(self) -> Option<u32> {
        match self {
            SpinPolicy::Unbounded => None,
            SpinPolicy::Bounded(n) => Some(n),
        }
    }
}

/// Builder for [`Queue`].
///
/// ```
/// use mpmc_ringbuffer::{Config, SpinPolicy, Strategy};
///
/// let queue = Config::new(1024)
///     .strategy(Strategy::SlotStatus)
///     .spin(SpinPolicy::Bounded(128))
///     .build::<u64>()
///     .unwrap();
/// assert_eq!(queue.usable_capacity(), 1023);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    capacity: usize,
    strategy: Strategy,
    spin: Option<SpinPolicy>,
    initial_position: u64,
}

impl Config {
    pub fn new(capacity: usize) -> Self {
        Config {
            capacity,
            strategy: Strategy::default(),
            spin: None,
            initial_position: 0,
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Overrides the strategy's default: unbounded for commit-index,
    /// [`DEFAULT_SPIN_BUDGET`] attempts for slot-status.
    pub fn spin(mut self, spin: SpinPolicy) -> Self {
        self.spin = Some(spin);
        self
    }

    /// Starts every position counter at `position` instead of zero.
    ///
    /// Only useful for exercising counter wraparound: seed near `u64::MAX`
    /// and the counters wrap after a handful of operations.
    pub fn initial_position(mut self, position: u64) -> Self {
        self.initial_position = position;
        self
    }

    pub fn spin_policy(&self) -> SpinPolicy {
        self.spin.unwrap_or(match self.strategy {
            Strategy::CommitIndex => SpinPolicy::Unbounded,
            Strategy::SlotStatus => SpinPolicy::Bounded(DEFAULT_SPIN_BUDGET),
        })
    }

    pub(crate) fn validate(&self) -> Result<Ring, QueueError> {
        if self.capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if self.spin_policy() == SpinPolicy::Bounded(0) {
            return Err(QueueError::ZeroSpinBudget);
        }

        let ring = Ring::new(self.capacity as u64);
        if !ring.contains(self.initial_position) {
            return Err(QueueError::InitialPosition {
                position: self.initial_position,
                limit: ring.last(),
            });
        }
        Ok(ring)
    }

    pub fn build<T: Send>(&self) -> Result<Queue<T>, QueueError> {
        let ring = self.validate()?;
        let spin = self.spin_policy();
        let flavor = match self.strategy {
            Strategy::CommitIndex => {
                Flavor::CommitIndex(CommitQueue::from_parts(ring, spin, self.initial_position))
            }
            Strategy::SlotStatus => {
                Flavor::SlotStatus(StatusQueue::from_parts(ring, spin, self.initial_position))
            }
        };
        Ok(Queue { flavor })
    }

    /// Builds the queue and returns a producer and a consumer sharing it.
    pub fn split<T: Send>(&self) -> Result<(Producer<T>, Consumer<T>), QueueError> {
        let queue = Arc::new(self.build()?);
        Ok((Arc::clone(&queue).into(), queue.into()))
    }
}
