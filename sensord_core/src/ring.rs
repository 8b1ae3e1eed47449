//! Registration ring (§3 "Registration Ring"): a bounded ring of recent
//! `enable`/`disable` calls kept for forensic dumping.
//!
//! Grounded on `evo_control_unit`'s `CycleStats`-style pre-sized recorder:
//! fixed capacity, no reallocation, oldest entry silently overwritten.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RegistrationEntry {
    pub timestamp_ns: i64,
    pub op_package: String,
    pub handle: i32,
    pub period_ns: i64,
    pub max_batch_latency_ns: i64,
    pub activate: bool,
    pub result_ok: bool,
}

/// Bounded ring buffer; dumped in reverse-chronological order (§6 "Diagnostic dump").
#[derive(Debug)]
pub struct RegistrationRing {
    capacity: usize,
    entries: VecDeque<RegistrationEntry>,
}

impl RegistrationRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, entry: RegistrationEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent entry first.
    pub fn iter_reverse_chronological(&self) -> impl Iterator<Item = &RegistrationEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(handle: i32) -> RegistrationEntry {
        RegistrationEntry {
            timestamp_ns: 0,
            op_package: "com.test".into(),
            handle,
            period_ns: 0,
            max_batch_latency_ns: 0,
            activate: true,
            result_ok: true,
        }
    }

    #[test]
    fn evicts_oldest_once_full() {
        let mut ring = RegistrationRing::new(2);
        ring.push(entry(1));
        ring.push(entry(2));
        ring.push(entry(3));
        let handles: Vec<i32> = ring.iter_reverse_chronological().map(|e| e.handle).collect();
        assert_eq!(handles, vec![3, 2]);
    }

    #[test]
    fn empty_ring_has_no_entries() {
        let ring = RegistrationRing::new(4);
        assert!(ring.is_empty());
    }
}
