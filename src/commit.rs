//! Commit-index strategy.
//!
//! Four monotonic positions partition the ring:
//!
//! ```text
//!   release <= read <= commit <= write
//!   |-- being read --|-- readable --|-- being written --|
//! ```
//!
//! A producer reserves `write` by CAS, fills the slot, then advances `commit`
//! past its position. Commits happen strictly in reservation order, so a
//! consumer sees a contiguous prefix of published slots. Consumers mirror
//! this: claim `read` by CAS, move the value out, then advance `release` in
//! claim order, which hands the slot back to producers.
//!
//! # Stalls
//!
//! A producer that stops between reserving and committing blocks every later
//! commit: the values behind it are written but invisible, and consumers see
//! an empty queue. A consumer that stops between claiming and releasing
//! likewise blocks slot reuse, and producers see a full queue. This is inherent
//! to ordered publication. Use [`Strategy::SlotStatus`] when stall resistance
//! matters more than strict FIFO commit order.
//!
//! [`Strategy::SlotStatus`]: crate::Strategy::SlotStatus

use std::fmt;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::config::{Config, SpinPolicy, Strategy};
use crate::error::{PopError, PushError, QueueError};
use crate::index::Ring;
use crate::sync::{AtomicIsize, AtomicU64, Ordering, Spinner, UnsafeCell};

/// Bounded MPMC queue publishing through an ordered commit counter.
pub struct CommitQueue<T> {
    // === Producer side ===
    /// Next position a producer reserves.
    write: CachePadded<AtomicU64>,
    /// Every position before this one is written and visible.
    commit: CachePadded<AtomicU64>,

    // === Consumer side ===
    /// Next position a consumer claims.
    read: CachePadded<AtomicU64>,
    /// Every position before this one has been moved out.
    release: CachePadded<AtomicU64>,

    /// Diagnostics only, never consulted by the protocol.
    size: CachePadded<AtomicIsize>,

    // === Read-only after construction ===
    ring: Ring,
    spin: SpinPolicy,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for CommitQueue<T> {}
unsafe impl<T: Send> Sync for CommitQueue<T> {}

impl<T: Send> CommitQueue<T> {
    /// Creates a queue with `capacity` slots, `capacity - 1` of them usable.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let config = Config::new(capacity).strategy(Strategy::CommitIndex);
        let ring = config.validate()?;
        Ok(Self::from_parts(ring, config.spin_policy(), 0))
    }

    pub(crate) fn from_parts(ring: Ring, spin: SpinPolicy, start: u64) -> Self {
        log::debug!(
            "commit-index queue: capacity={}, spin={:?}, start={}",
            ring.capacity(),
            spin,
            start
        );

        let slots = (0..ring.capacity())
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        CommitQueue {
            write: CachePadded::new(AtomicU64::new(start)),
            commit: CachePadded::new(AtomicU64::new(start)),
            read: CachePadded::new(AtomicU64::new(start)),
            release: CachePadded::new(AtomicU64::new(start)),
            size: CachePadded::new(AtomicIsize::new(0)),
            ring,
            spin,
            slots,
        }
    }

    /// Pushes `value`, or hands it back if the queue is full.
    ///
    /// Fails fast on a full queue. With a bounded spin policy it also gives
    /// up with [`PushError::Busy`] after too many lost reservations. Once a
    /// position is reserved the call waits for every earlier producer to
    /// commit before it returns.
    ///
    /// # Memory Ordering
    /// - `release` load: Acquire (consumers are done with the slot we reuse)
    /// - `write` CAS: AcqRel (reservation; orders later `read` observations)
    /// - `commit` CAS: Release (publishes the slot write)
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let mut spin = Spinner::new(self.spin.budget());

        let position = loop {
            // Sample release before write: the distance can only be
            // overestimated, never reported as room that isn't there.
            let release = self.release.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);

            if self.ring.distance(write, release) >= self.ring.usable() {
                return Err(PushError::Full(value));
            }

            if self
                .write
                .compare_exchange_weak(
                    write,
                    self.ring.next(write),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break write;
            }

            if !spin.snooze() {
                log::trace!("push gave up after {} reservation attempts", spin.rounds());
                return Err(PushError::Busy(value));
            }
        };

        // SAFETY: The CAS made `position` ours alone, and `release` showed
        // the previous lap of this slot already moved out.
        self.slots[self.ring.slot(position)].with_mut(|ptr| unsafe {
            (*ptr).write(value);
        });

        let next = self.ring.next(position);
        let mut wait = Spinner::new(None);
        while self
            .commit
            .compare_exchange_weak(position, next, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            wait.snooze();
            if wait.stalled() {
                log::warn!(
                    "commit of position {} is stalled behind an earlier reservation",
                    position
                );
            }
        }

        self.size.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pops the oldest committed value.
    ///
    /// # Memory Ordering
    /// - `read` load: Acquire (pairs with the claiming CAS of other consumers)
    /// - `commit` load: Acquire (the slot write is visible)
    /// - `release` CAS: Release (our move-out happens before the slot is reused)
    pub fn try_pop(&self) -> Result<T, PopError> {
        let mut spin = Spinner::new(self.spin.budget());

        let position = loop {
            let read = self.read.load(Ordering::Acquire);
            let commit = self.commit.load(Ordering::Acquire);

            // A stale `read` can overstate what is available; the CAS below
            // then fails and we reload.
            if self.ring.distance(commit, read) == 0 {
                return Err(PopError::Empty);
            }

            if self
                .read
                .compare_exchange_weak(
                    read,
                    self.ring.next(read),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break read;
            }

            if !spin.snooze() {
                log::trace!("pop gave up after {} claim attempts", spin.rounds());
                return Err(PopError::Busy);
            }
        };

        // SAFETY: `position` is below `commit`, so the slot is initialized,
        // and the CAS made us its only reader. Producers cannot reuse it until
        // `release` passes it below.
        let value = self.slots[self.ring.slot(position)]
            .with_mut(|ptr| unsafe { (*ptr).assume_init_read() });

        let next = self.ring.next(position);
        let mut wait = Spinner::new(None);
        while self
            .release
            .compare_exchange_weak(position, next, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            wait.snooze();
            if wait.stalled() {
                log::warn!(
                    "release of position {} is stalled behind an earlier claim",
                    position
                );
            }
        }

        self.size.fetch_sub(1, Ordering::Relaxed);
        Ok(value)
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.try_pop().ok()
    }
}

impl<T> CommitQueue<T> {
    /// Approximate number of queued values.
    ///
    /// Updated after each push and pop completes, so it may lag or lead the
    /// true occupancy under concurrency. Never use it to decide whether a push
    /// or pop will succeed.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

    /// Total slot count, including the one that is never filled.
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }

    pub fn usable_capacity(&self) -> usize {
        self.ring.usable() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> fmt::Debug for CommitQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitQueue")
            .field("capacity", &self.ring.capacity())
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("commit", &self.commit.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("release", &self.release.load(Ordering::Relaxed))
            .field("size", &self.size.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Drop for CommitQueue<T> {
    fn drop(&mut self) {
        let commit = self.commit.load(Ordering::Relaxed);
        let mut position = self.read.load(Ordering::Relaxed);
        let mut dropped = 0usize;

        while position != commit {
            // SAFETY: Positions in [read, commit) are committed and unread.
            self.slots[self.ring.slot(position)].with_mut(|ptr| unsafe {
                (*ptr).assume_init_drop();
            });
            position = self.ring.next(position);
            dropped += 1;
        }

        if dropped > 0 {
            log::trace!("dropped {} values left in commit-index queue", dropped);
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_in_order() {
        let queue = CommitQueue::new(128).unwrap();
        for i in 0..127 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.size(), 127);
        for i in 0..127 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn one_slot_is_reserved() {
        let queue = CommitQueue::new(4).unwrap();
        assert!(queue.push(1).is_ok());
        assert!(queue.push(2).is_ok());
        assert!(queue.push(3).is_ok());
        match queue.push(4) {
            Err(PushError::Full(4)) => {}
            other => panic!("expected Full(4), got {:?}", other),
        }

        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(4).is_ok());
        assert_eq!(queue.usable_capacity(), 3);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn capacity_one_never_accepts() {
        let queue = CommitQueue::new(1).unwrap();
        assert!(queue.push(()).unwrap_err().is_full());
        assert_eq!(queue.try_pop(), Err(PopError::Empty));
    }

    #[test]
    fn empty_until_next_push() {
        let queue = CommitQueue::new(8).unwrap();
        for _ in 0..10 {
            assert_eq!(queue.try_pop(), Err(PopError::Empty));
        }
        queue.push(5).unwrap();
        assert_eq!(queue.pop(), Some(5));
        for _ in 0..10 {
            assert_eq!(queue.try_pop(), Err(PopError::Empty));
        }
    }

    #[test]
    fn wraps_the_counters() {
        for capacity in [5usize, 8, 1024] {
            let ring = Ring::new(capacity as u64);
            let queue = CommitQueue::from_parts(ring, SpinPolicy::Unbounded, ring.last() - 5);

            let mut next_in = 0u64;
            let mut next_out = 0u64;
            for round in 0..5_000u64 {
                let burst = round % capacity as u64;
                for _ in 0..burst {
                    if queue.push(next_in).is_ok() {
                        next_in += 1;
                    }
                }
                while let Some(v) = queue.pop() {
                    assert_eq!(v, next_out);
                    next_out += 1;
                }
                assert_eq!(next_in, next_out);
            }
            assert!(next_in > 5_000, "capacity {} moved only {}", capacity, next_in);
        }
    }

    #[test]
    fn unread_values_are_dropped_with_the_queue() {
        let marker = Arc::new(());
        let queue = CommitQueue::new(8).unwrap();
        for _ in 0..5 {
            queue.push(Arc::clone(&marker)).unwrap();
        }
        drop(queue.pop());
        assert_eq!(Arc::strong_count(&marker), 5);
        drop(queue);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn stalled_producer_hides_later_commits() {
        let queue = CommitQueue::new(8).unwrap();

        // Reserve a position without committing it, as a producer frozen
        // between reservation and commit would.
        let reserved = queue.write.fetch_add(1, Ordering::AcqRel);
        assert_eq!(reserved, 0);

        let queue = Arc::new(queue);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(42))
        };

        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(queue.try_pop(), Err(PopError::Empty));
        assert!(!producer.is_finished());

        // Unfreeze: fill and commit the reserved position.
        queue.slots[0].with_mut(|ptr| unsafe {
            (*ptr).write(7);
        });
        queue.commit.store(1, Ordering::Release);

        producer.join().unwrap().unwrap();
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), Some(42));
    }

    #[test]
    fn stalled_consumer_holds_back_reuse() {
        let queue = CommitQueue::new(4).unwrap();
        for i in 1..=3 {
            queue.push(i).unwrap();
        }

        // Claim position 0 without releasing it, as a consumer frozen
        // between claim and release would.
        let claimed = queue.read.fetch_add(1, Ordering::AcqRel);
        assert_eq!(claimed, 0);
        assert!(queue.push(4).unwrap_err().is_full());

        let queue = Arc::new(queue);
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!consumer.is_finished());
        assert!(queue.push(4).unwrap_err().is_full());

        // Unfreeze: move the claimed value out and release its slot.
        let first = queue.slots[0].with_mut(|ptr| unsafe { (*ptr).assume_init_read() });
        assert_eq!(first, 1);
        queue.release.store(1, Ordering::Release);

        assert_eq!(consumer.join().unwrap(), Some(2));
        queue.push(4).unwrap();
        queue.push(5).unwrap();
        assert!(queue.push(6).unwrap_err().is_full());
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), Some(5));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn stale_counters_under_churn_do_not_panic() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 100_000;

        let queue = Arc::new(CommitQueue::new(2).unwrap());
        let pushed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let popped = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let pushed = Arc::clone(&pushed);
                let popped = Arc::clone(&popped);
                thread::spawn(move || {
                    for i in 0..ROUNDS {
                        if queue.push(i).is_ok() {
                            pushed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        if queue.pop().is_some() {
                            popped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        let panicked = workers
            .into_iter()
            .map(|w| w.join())
            .filter(Result::is_err)
            .count();
        assert_eq!(panicked, 0, "{} worker threads panicked", panicked);

        let mut left = 0;
        while queue.pop().is_some() {
            left += 1;
        }
        assert_eq!(
            pushed.load(std::sync::atomic::Ordering::Relaxed),
            popped.load(std::sync::atomic::Ordering::Relaxed) + left
        );
    }

    #[test]
    fn concurrent_no_loss_no_duplicates() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 20_000;

        let queue = Arc::new(CommitQueue::new(64).unwrap());
        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in p * PER_PRODUCER..(p + 1) * PER_PRODUCER {
                    let mut value = i;
                    while let Err(err) = queue.push(value) {
                        value = err.into_inner();
                        thread::yield_now();
                    }
                }
            }));
        }

        let received = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut consumers = Vec::new();
        for _ in 0..CONSUMERS {
            let queue = Arc::clone(&queue);
            let received = Arc::clone(&received);
            consumers.push(thread::spawn(move || {
                let mut local = Vec::new();
                while received.load(std::sync::atomic::Ordering::Relaxed)
                    < PRODUCERS * PER_PRODUCER
                {
                    match queue.pop() {
                        Some(v) => {
                            local.push(v);
                            received.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                        None => thread::yield_now(),
                    }
                }
                local
            }));
        }

        for producer in producers {
            producer.join().unwrap();
        }
        let mut all: Vec<usize> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
    }
}
