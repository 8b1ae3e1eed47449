//! Sensor catalog (§4.1).
//!
//! Owned behind `sensord_core`'s outer lock, the same way
//! `evo_common::io::registry::IoRegistry` is built once and then only
//! queried through narrow accessor methods.

use crate::entry::SensorEntry;
use crate::recent::RecentEventLog;
use sensord_common::consts::{RUNTIME_SENSOR_HANDLE_BASE, RUNTIME_SENSOR_HANDLE_END};
use sensord_common::sensor::Sensor;
use std::collections::HashMap;

/// Catalog of physical, runtime, dynamic, and virtual sensors (§3 "Sensor",
/// §4.1). Handles are never reused for the lifetime of the process.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    entries: HashMap<i32, SensorEntry>,
    next_runtime_handle: i32,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_runtime_handle: RUNTIME_SENSOR_HANDLE_BASE,
        }
    }

    pub fn is_new_handle(&self, handle: i32) -> bool {
        !self.entries.contains_key(&handle)
    }

    /// Allocate the next sequential handle in the runtime-sensor range
    /// (§3). Returns `None` once the range is exhausted.
    pub fn allocate_runtime_handle(&mut self) -> Option<i32> {
        if self.next_runtime_handle >= RUNTIME_SENSOR_HANDLE_END {
            return None;
        }
        let handle = self.next_runtime_handle;
        self.next_runtime_handle += 1;
        Some(handle)
    }

    /// `add(sensor, debug?, virtual?) → bool` (§4.1). Fails on handle
    /// collision; the caller is responsible for exhausted-range checks via
    /// [`Self::allocate_runtime_handle`] before calling this.
    pub fn add(&mut self, sensor: Sensor, debug: bool, virtual_flag: bool) -> bool {
        if !self.is_new_handle(sensor.handle) {
            return false;
        }
        self.entries
            .insert(sensor.handle, SensorEntry::new(sensor, debug, virtual_flag));
        true
    }

    /// `remove(handle) → bool` (§4.1). Also clears any recent-event entry.
    pub fn remove(&mut self, handle: i32, recent: &mut RecentEventLog) -> bool {
        let removed = self.entries.remove(&handle).is_some();
        if removed {
            recent.clear(handle);
        }
        removed
    }

    pub fn lookup(&self, handle: i32) -> Option<&SensorEntry> {
        self.entries.get(&handle)
    }

    pub fn for_each(&self, mut f: impl FnMut(&SensorEntry)) {
        for entry in self.entries.values() {
            f(entry);
        }
    }

    /// Sensors visible to ordinary (non-debug-listing) callers.
    pub fn user_sensors(&self) -> Vec<&SensorEntry> {
        self.entries.values().filter(|e| !e.debug).collect()
    }

    pub fn user_debug_sensors(&self) -> Vec<&SensorEntry> {
        self.entries.values().filter(|e| e.debug).collect()
    }

    pub fn dynamic_sensors(&self) -> Vec<&SensorEntry> {
        self.entries.values().filter(|e| e.sensor.is_dynamic()).collect()
    }

    pub fn device_sensors(&self, device_id: i32) -> Vec<&SensorEntry> {
        self.entries
            .values()
            .filter(|e| e.sensor.device_id == device_id)
            .collect()
    }
}
