//! Fixed-capacity sliding window of recent signal values.
//!
//! Backed by a heap ring buffer: pushing into a full window evicts the
//! oldest value, so the window never holds more than its capacity.

use std::fmt;

use ringbuf::{traits::*, HeapRb};

/// FIFO window with strict size cap
pub struct SampleWindow {
    rb: HeapRb<f32>,
}

impl fmt::Debug for SampleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleWindow")
            .field("len", &self.rb.occupied_len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl SampleWindow {
    /// Create an empty window holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        Self {
            rb: HeapRb::new(capacity),
        }
    }

    /// Append a value, evicting the oldest one when full
    #[inline]
    pub fn push(&mut self, value: f32) {
        self.rb.push_overwrite(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rb.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.rb.capacity().get()
    }

    /// Arithmetic mean, `0.0` when empty
    pub fn mean(&self) -> f32 {
        let len = self.len();
        if len == 0 {
            return 0.0;
        }
        self.rb.iter().sum::<f32>() / len as f32
    }

    /// The newest `n` values (fewer if the window is shorter), oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = f32> + '_ {
        let skip = self.len().saturating_sub(n);
        self.rb.iter().skip(skip).copied()
    }

    /// Drop every value
    pub fn clear(&mut self) {
        self.rb.clear();
    }
}
