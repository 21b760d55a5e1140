//! Slot-status strategy.
//!
//! Every slot carries its own state, so a producer publishes its slot without
//! waiting for anyone else:
//!
//! ```text
//!   Unready --(producer claims)--> Writing --(value stored)--> Ready
//!   Ready --(consumer claims)--> Reading --(value taken)--> Unready
//! ```
//!
//! `Unready` and `Ready` are the resting states. `Writing` and `Reading` mark
//! the one thread moving a value in or out, which keeps the value exclusive
//! even when a slow thread from the previous lap still holds the slot.
//!
//! Fullness is detected one slot ahead: if the slot after the write position
//! is still `Ready`, consumers have not caught up and the push is refused.
//! Reservation CASes are retried within a spin budget; running out is
//! reported as `Busy`, distinct from `Full`/`Empty`.
//!
//! There is no total order across slots. With several producers, values may
//! become visible out of reservation order and a pop may report `Empty` while
//! later slots are already `Ready`.

use std::fmt;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::config::{Config, SpinPolicy, Strategy};
use crate::error::{PopError, PushError, QueueError};
use crate::index::Ring;
use crate::sync::{AtomicIsize, AtomicU64, AtomicU8, Ordering, Spinner, UnsafeCell};

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Unready = 0,
    Writing = 1,
    Ready = 2,
    Reading = 3,
}

impl State {
    fn from_u8(raw: u8) -> State {
        match raw {
            0 => State::Unready,
            1 => State::Writing,
            2 => State::Ready,
            _ => State::Reading,
        }
    }
}

struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            state: AtomicU8::new(State::Unready as u8),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Waits until the slot moves from `from` to `to` under our hand.
    fn take(&self, from: State, to: State, position: u64) {
        let mut wait = Spinner::new(None);
        while self
            .state
            .compare_exchange_weak(from as u8, to as u8, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            wait.snooze();
            if wait.stalled() {
                log::warn!(
                    "slot for position {} stuck waiting for {:?} -> {:?}",
                    position,
                    from,
                    to
                );
            }
        }
    }

    #[inline]
    fn set(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Bounded MPMC queue with a readiness flag per slot.
pub struct StatusQueue<T> {
    write: CachePadded<AtomicU64>,
    read: CachePadded<AtomicU64>,
    size: CachePadded<AtomicIsize>,
    ring: Ring,
    spin: SpinPolicy,
    slots: Box<[CachePadded<Slot<T>>]>,
}

unsafe impl<T: Send> Send for StatusQueue<T> {}
unsafe impl<T: Send> Sync for StatusQueue<T> {}

impl<T: Send> StatusQueue<T> {
    /// Creates a queue with `capacity` slots and the default spin budget.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let config = Config::new(capacity).strategy(Strategy::SlotStatus);
        let ring = config.validate()?;
        Ok(Self::from_parts(ring, config.spin_policy(), 0))
    }

    pub(crate) fn from_parts(ring: Ring, spin: SpinPolicy, start: u64) -> Self {
        log::debug!(
            "slot-status queue: capacity={}, spin={:?}, start={}",
            ring.capacity(),
            spin,
            start
        );

        let slots = (0..ring.capacity())
            .map(|_| CachePadded::new(Slot::new()))
            .collect();

        StatusQueue {
            write: CachePadded::new(AtomicU64::new(start)),
            read: CachePadded::new(AtomicU64::new(start)),
            size: CachePadded::new(AtomicIsize::new(0)),
            ring,
            spin,
            slots,
        }
    }

    #[inline]
    fn slot(&self, position: u64) -> &Slot<T> {
        &self.slots[self.ring.slot(position)]
    }

    /// Pushes `value`, or hands it back.
    ///
    /// [`PushError::Full`] when occupancy reached the usable capacity or the
    /// slot ahead is still unread; [`PushError::Busy`] when the spin budget
    /// ran out. Treat both as "retry later".
    ///
    /// # Memory Ordering
    /// - slot `Unready -> Writing`: Acquire (the previous reader is done)
    /// - slot `Ready` store: Release (publishes the value)
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let mut spin = Spinner::new(self.spin.budget());

        let position = loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);

            if self.ring.distance(write, read) >= self.ring.usable()
                || self.slot(self.ring.next(write)).state() == State::Ready
                || self.slot(write).state() != State::Unready
            {
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

        let slot = self.slot(position);
        slot.take(State::Unready, State::Writing, position);
        // SAFETY: `Writing` makes us the only thread touching the value.
        slot.value.with_mut(|ptr| unsafe {
            (*ptr).write(value);
        });
        slot.set(State::Ready);

        self.size.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pops the value at the read position, if it is ready.
    ///
    /// # Memory Ordering
    /// - slot `Ready -> Reading`: Acquire (the producer's write is visible)
    /// - slot `Unready` store: Release (the move-out precedes reuse)
    pub fn try_pop(&self) -> Result<T, PopError> {
        let mut spin = Spinner::new(self.spin.budget());

        let position = loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);

            if self.ring.distance(write, read) == 0 || self.slot(read).state() != State::Ready {
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

        let slot = self.slot(position);
        slot.take(State::Ready, State::Reading, position);
        // SAFETY: `Reading` makes us the only thread touching the value, and
        // `Ready` guaranteed it was initialized.
        let value = slot.value.with_mut(|ptr| unsafe { (*ptr).assume_init_read() });
        slot.set(State::Unready);

        self.size.fetch_sub(1, Ordering::Relaxed);
        Ok(value)
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.try_pop().ok()
    }
}

impl<T> StatusQueue<T> {
    /// Approximate number of queued values; see [`CommitQueue::size`].
    ///
    /// [`CommitQueue::size`]: crate::CommitQueue::size
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

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

impl<T> fmt::Debug for StatusQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusQueue")
            .field("capacity", &self.ring.capacity())
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("spin", &self.spin)
            .finish()
    }
}

impl<T> Drop for StatusQueue<T> {
    fn drop(&mut self) {
        let mut dropped = 0usize;
        for slot in self.slots.iter() {
            if State::from_u8(slot.state.load(Ordering::Relaxed)) == State::Ready {
                // SAFETY: `Ready` slots hold an initialized, unread value.
                slot.value.with_mut(|ptr| unsafe {
                    (*ptr).assume_init_drop();
                });
                dropped += 1;
            }
        }

        if dropped > 0 {
            log::trace!("dropped {} values left in slot-status queue", dropped);
        }
    }
}
