//! Correlation number allocation.
//!
//! Every outbound operation is identified by a correlation number drawn from a
//! single [`SequenceAllocator`]. Numbers are strictly increasing in allocation
//! order, which is what the interruption sweep relies on to tell an older
//! same-group operation from a newer one.
//!
//! The allocator is an owned value shared through `Arc`, not a process global:
//! two engines in one process keep independent identity spaces.

use std::sync::atomic::{AtomicU64, Ordering};

/// Base value for a fresh allocator. The first issued number is `base + 1`.
pub const DEFAULT_SEQUENCE_BASE: u64 = 1000;

/// Monotonically increasing correlation number generator.
#[derive(Debug)]
pub struct SequenceAllocator {
    last: AtomicU64,
}

impl SequenceAllocator {
    /// Create an allocator whose last issued value is `base`.
    pub fn new(base: u64) -> Self {
        Self {
            last: AtomicU64::new(base),
        }
    }

    /// Issue the next correlation number.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The last issued number (or the base if nothing was issued yet).
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_BASE)
    }
}
