//! Outbound frame sequence numbers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter stamped on each outbound frame for tracing.
///
/// The first call to [`next`](Self::next) returns 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

impl SequenceCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next sequence number.
    #[inline]
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last number handed out (0 if none).
    #[inline]
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}
