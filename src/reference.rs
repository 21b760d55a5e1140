//! Sequential model of the queue contract.
//!
//! Single-threaded, obviously correct, and slow. With one thread driving a
//! real queue, every push and pop must agree with this model, which is how
//! the tests check both strategies.

use std::collections::VecDeque;

pub struct Model<T> {
    capacity: usize,
    data: VecDeque<T>,
}

impl<T> Model<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Model {
            capacity,
            data: VecDeque::with_capacity(capacity),
        }
    }

    /// Accepts while fewer than `capacity - 1` values are held.
    pub fn push(&mut self, x: T) -> Result<(), T> {
        if self.data.len() + 1 < self.capacity {
            self.data.push_back(x);
            Ok(())
        } else {
            Err(x)
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
