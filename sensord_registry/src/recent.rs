//! Per-handle last-value cache (§3 "Registration Ring" neighbor; §4.2 step 5).
//!
//! Used for on-change replay to new subscribers and the privileged
//! diagnostic dump. A `stale` flag distinguishes "never seen" (no entry)
//! from "seen once, but the sensor has since been deactivated" (entry
//! present, marked stale) — the dump wants to show the difference.

use sensord_common::event::Event;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Slot {
    event: Event,
    stale: bool,
}

#[derive(Debug, Default)]
pub struct RecentEventLog {
    last: HashMap<i32, Slot>,
}

impl RecentEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-meta, non-additional-info event for its sensor handle
    /// (§4.2 step 5). Marks the entry fresh.
    pub fn record(&mut self, handle: i32, event: Event) {
        self.last.insert(handle, Slot { event, stale: false });
    }

    pub fn last_value(&self, handle: i32) -> Option<&Event> {
        self.last.get(&handle).map(|slot| &slot.event)
    }

    pub fn is_stale(&self, handle: i32) -> Option<bool> {
        self.last.get(&handle).map(|slot| slot.stale)
    }

    pub fn mark_stale(&mut self, handle: i32) {
        if let Some(slot) = self.last.get_mut(&handle) {
            slot.stale = true;
        }
    }

    /// Drop the entry for a removed sensor (§4.1: "removal clears any
    /// recent-event entry").
    pub fn clear(&mut self, handle: i32) {
        self.last.remove(&handle);
    }

    /// Every recorded entry, for the diagnostic dump (§6).
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Event, bool)> {
        self.last.iter().map(|(&handle, slot)| (handle, &slot.event, slot.stale))
    }
}
