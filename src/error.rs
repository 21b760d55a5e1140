//! Errors returned by queue construction, push and pop.

use std::fmt;

use thiserror::Error;

/// Rejected queue construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
    #[error("a bounded spin budget must allow at least one attempt")]
    ZeroSpinBudget,
    #[error("initial position {position} is past the last position {limit} of the counter ring")]
    InitialPosition { position: u64, limit: u64 },
}

/// A rejected push. The value is always handed back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// No free slot: occupancy reached the usable capacity, or the slot ahead
    /// of the write position still holds unread data.
    Full(T),
    /// The spin budget ran out while other producers kept winning the
    /// reservation. The queue may have room; retry later.
    Busy(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) | PushError::Busy(value) => value,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, PushError::Busy(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Busy(_) => f.write_str("Busy(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("queue is full"),
            PushError::Busy(_) => f.write_str("push lost too many races, retry later"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// A rejected pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// Nothing committed past the read position.
    #[error("queue is empty")]
    Empty,
    /// The spin budget ran out while other consumers kept winning the claim.
    #[error("pop lost too many races, retry later")]
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_error_hands_the_value_back() {
        let full = PushError::Full(String::from("a"));
        assert!(full.is_full());
        assert!(!full.is_busy());
        assert_eq!(full.into_inner(), "a");

        let busy = PushError::Busy(7);
        assert!(busy.is_busy());
        assert_eq!(busy.into_inner(), 7);
    }

    #[test]
    fn messages() {
        assert_eq!(PushError::Full(()).to_string(), "queue is full");
        assert_eq!(PopError::Empty.to_string(), "queue is empty");
        assert_eq!(
            QueueError::InitialPosition { position: 9, limit: 5 }.to_string(),
            "initial position 9 is past the last position 5 of the counter ring"
        );
        // Payloads need not be Debug.
        struct Opaque;
        assert_eq!(format!("{:?}", PushError::Busy(Opaque)), "Busy(..)");
    }
}
