//! Synchronization primitives, switched to `loom` under `--cfg loom`.
//!
//! Every atomic, cell and yield in the crate goes through this module so the
//! loom model checker sees the same operations the real build performs.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicIsize, AtomicU64, AtomicU8, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::Arc;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicU8, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::Arc;

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;

/// `std` cell with the closure-based access API of `loom::cell::UnsafeCell`.
#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) const fn new(data: T) -> Self {
        UnsafeCell(std::cell::UnsafeCell::new(data))
    }

    #[inline(always)]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

/// Backoff rounds after which a post-claim wait is reported as a stall.
pub(crate) const STALL_WARN_SPINS: u32 = 1 << 16;

/// Spin-then-yield pacing between CAS attempts, with an optional budget.
pub(crate) struct Spinner {
    #[cfg(not(loom))]
    backoff: crossbeam_utils::Backoff,
    budget: Option<u32>,
    rounds: u32,
}

impl Spinner {
    /// `None` means retry forever.
    pub(crate) fn new(budget: Option<u32>) -> Self {
        Spinner {
            #[cfg(not(loom))]
            backoff: crossbeam_utils::Backoff::new(),
            budget,
            rounds: 0,
        }
    }

    /// Backs off once. Returns `false` when the budget is spent.
    #[inline]
    pub(crate) fn snooze(&mut self) -> bool {
        self.rounds = self.rounds.saturating_add(1);
        if let Some(budget) = self.budget {
            if self.rounds >= budget {
                return false;
            }
        }

        #[cfg(not(loom))]
        self.backoff.snooze();
        #[cfg(loom)]
        loom::thread::yield_now();

        true
    }

    pub(crate) fn rounds(&self) -> u32 {
        self.rounds
    }

    /// True exactly once, when a wait crosses [`STALL_WARN_SPINS`].
    pub(crate) fn stalled(&self) -> bool {
        self.rounds == STALL_WARN_SPINS
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn bounded_spinner_gives_up() {
        let mut spin = Spinner::new(Some(3));
        assert!(spin.snooze());
        assert!(spin.snooze());
        assert!(!spin.snooze());
        assert_eq!(spin.rounds(), 3);
    }

    #[test]
    fn unbounded_spinner_keeps_going() {
        let mut spin = Spinner::new(None);
        for _ in 0..1_000 {
            assert!(spin.snooze());
        }
        assert_eq!(spin.rounds(), 1_000);
    }
}
