//! Argument staging.
//!
//! Reusable positional buffer for batching the arguments of a single call.
//! Capacity only grows; entries past the count of the current call are
//! stale and never read.

use crate::handle::HandleId;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct StagingBuffer<T> {
    slots: Vec<T>,
}

/// Handle ids staged by the host for the next call
pub type ArgStaging = StagingBuffer<Option<HandleId>>;

impl<T: Clone + Default> StagingBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity],
        }
    }

    fn grow(&mut self, len: usize) {
        if len > self.slots.len() {
            trace!(from = self.slots.len(), to = len, "Growing staging buffer");
            self.slots.resize(len, T::default());
        }
    }

    /// Place `value` at `index`.
    pub fn add(&mut self, index: usize, value: T) {
        self.grow(index + 1);
        self.slots[index] = value;
    }

    /// The first `count` entries, growing storage if needed.
    pub fn get(&mut self, count: usize) -> &mut [T] {
        self.grow(count);
        &mut self.slots[..count]
    }

    pub fn slot(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reset every entry, keeping capacity.
    pub fn clear(&mut self) {
        self.slots.fill(T::default());
    }
}

impl<T: Clone + Default> Default for StagingBuffer<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
