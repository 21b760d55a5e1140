//! Bounded lock-free multi-producer/multi-consumer ring queue.
//!
//! Producers call `push`, consumers call `pop`; neither ever blocks. A full
//! or empty queue is reported immediately, and callers that want to wait loop
//! and yield themselves.
//!
//! Two algorithms are available, chosen through [`Config::strategy`]:
//!
//! - [`Strategy::CommitIndex`] (default): reservation and publication are
//!   separate counters and publication is strictly ordered. Consumers always
//!   see a contiguous prefix of the pushed values. A producer stalled between
//!   reserving and committing hides every later value until it resumes.
//! - [`Strategy::SlotStatus`]: every slot carries its own readiness flag and
//!   claims are retried within a bounded spin budget. No producer can delay
//!   another, at the price of no cross-slot ordering and `Busy` results under
//!   contention.
//!
//! A queue of capacity `n` holds at most `n - 1` values: the last slot's
//! worth of counter distance is what tells "full" apart from "empty".
//!
//! ```
//! let (producer, consumer) = mpmc_ringbuffer::new::<u32>(8).unwrap();
//!
//! let worker = std::thread::spawn(move || {
//!     for i in 0..100 {
//!         let mut value = i;
//!         while let Err(rejected) = producer.push(value) {
//!             value = rejected.into_inner();
//!             std::thread::yield_now();
//!         }
//!     }
//! });
//!
//! let mut received = Vec::new();
//! while received.len() < 100 {
//!     match consumer.pop() {
//!         Some(v) => received.push(v),
//!         None => std::thread::yield_now(),
//!     }
//! }
//! worker.join().unwrap();
//! assert_eq!(received, (0..100).collect::<Vec<_>>());
//! ```

use std::fmt;

pub mod commit;
pub mod config;
pub mod error;
mod index;
pub mod reference;
pub mod status;
mod sync;

pub use commit::CommitQueue;
pub use config::{Config, SpinPolicy, Strategy, DEFAULT_SPIN_BUDGET};
pub use error::{PopError, PushError, QueueError};
pub use status::StatusQueue;

use sync::Arc;

/// Creates a commit-index queue of `capacity` slots and returns a producer
/// and a consumer for it. Clone either handle to add more threads.
pub fn new<T: Send>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), QueueError> {
    Config::new(capacity).split()
}

pub(crate) enum Flavor<T> {
    CommitIndex(CommitQueue<T>),
    SlotStatus(StatusQueue<T>),
}

/// A bounded MPMC queue backed by either strategy.
pub struct Queue<T> {
    pub(crate) flavor: Flavor<T>,
}

impl<T: Send> Queue<T> {
    /// Commit-index queue with `capacity` slots, `capacity - 1` usable.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Config::new(capacity).build()
    }

    #[inline]
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        match &self.flavor {
            Flavor::CommitIndex(q) => q.push(value),
            Flavor::SlotStatus(q) => q.push(value),
        }
    }

    #[inline]
    pub fn try_pop(&self) -> Result<T, PopError> {
        match &self.flavor {
            Flavor::CommitIndex(q) => q.try_pop(),
            Flavor::SlotStatus(q) => q.try_pop(),
        }
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.try_pop().ok()
    }
}

impl<T> Queue<T> {
    /// Approximate occupancy, for diagnostics only.
    pub fn size(&self) -> usize {
        match &self.flavor {
            Flavor::CommitIndex(q) => q.size(),
            Flavor::SlotStatus(q) => q.size(),
        }
    }

    pub fn capacity(&self) -> usize {
        match &self.flavor {
            Flavor::CommitIndex(q) => q.capacity(),
            Flavor::SlotStatus(q) => q.capacity(),
        }
    }

    pub fn usable_capacity(&self) -> usize {
        self.capacity() - 1
    }

    /// Approximate, like [`Queue::size`].
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn strategy(&self) -> Strategy {
        match &self.flavor {
            Flavor::CommitIndex(_) => Strategy::CommitIndex,
            Flavor::SlotStatus(_) => Strategy::SlotStatus,
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.flavor {
            Flavor::CommitIndex(q) => fmt::Debug::fmt(q, f),
            Flavor::SlotStatus(q) => fmt::Debug::fmt(q, f),
        }
    }
}

/// Sending half. Cloning yields another producer on the same queue.
pub struct Producer<T> {
    inner: Arc<Queue<T>>,
}

impl<T: Send> Producer<T> {
    #[inline]
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        self.inner.push(value)
    }
}

impl<T> Producer<T> {
    pub fn queue(&self) -> &Queue<T> {
        &self.inner
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Producer {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[doc(hidden)]
impl<T> From<Arc<Queue<T>>> for Producer<T> {
    fn from(inner: Arc<Queue<T>>) -> Self {
        Producer { inner }
    }
}

/// Receiving half. Cloning yields another consumer on the same queue.
pub struct Consumer<T> {
    inner: Arc<Queue<T>>,
}

impl<T: Send> Consumer<T> {
    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    #[inline]
    pub fn try_pop(&self) -> Result<T, PopError> {
        self.inner.try_pop()
    }

    /// Pops until the queue reports empty (or, with a bounded spin policy,
    /// busy). Other consumers may take values concurrently.
    pub fn drain(&self) -> Drain<'_, T> {
        Drain { inner: &self.inner }
    }
}

impl<T> Consumer<T> {
    pub fn queue(&self) -> &Queue<T> {
        &self.inner
    }
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Consumer {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[doc(hidden)]
impl<T> From<Arc<Queue<T>>> for Consumer<T> {
    fn from(inner: Arc<Queue<T>>) -> Self {
        Consumer { inner }
    }
}

/// Iterator returned by [`Consumer::drain`].
///
/// Each `next()` is one independent pop; the iterator holds no claim on the
/// queue between calls.
pub struct Drain<'a, T: 'a> {
    inner: &'a Queue<T>,
}

impl<'a, T: Send> Iterator for Drain<'a, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.inner.pop()
    }
}
