//! Even/odd optimistic version counter for the segment header seqlock.
//!
//! Mirrors `evo_shared_memory::version::VersionCounter`: writers bump to an
//! odd value before touching the ring, then to the next even value when
//! done; a reader that observes an odd version, or two different even
//! versions straddling its read, must retry.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct VersionCounter {
    counter: AtomicU64,
}

impl VersionCounter {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn load(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn begin_write(&self) -> u64 {
        let next = self.counter.load(Ordering::Acquire) + 1;
        self.counter.store(next, Ordering::Release);
        next
    }

    pub fn end_write(&self) -> u64 {
        let next = self.counter.load(Ordering::Acquire) + 1;
        self.counter.store(next, Ordering::Release);
        next
    }

    pub fn is_stable(version: u64) -> bool {
        version % 2 == 0
    }
}

impl Default for VersionCounter {
    fn default() -> Self {
        Self::new()
    }
}
