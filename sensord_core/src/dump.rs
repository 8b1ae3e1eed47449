//! Diagnostic dump snapshot (§6 "Diagnostic dump").
//!
//! This module only assembles the data under the outer lock; turning it
//! into text or a `bincode` payload is the `sensord` binary's job, the same
//! separation `evo_control_unit` keeps between `CycleStats` and whatever
//! prints it.

use crate::engine::SensorService;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpSensorEntry {
    pub handle: i32,
    pub name: String,
    pub sensor_type: String,
    pub debug: bool,
    pub virtual_flag: bool,
    pub is_dynamic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpRecentEvent {
    pub handle: i32,
    pub stale: bool,
    pub timestamp_ns: i64,
    /// `None` when the caller is not privileged (§6 "mask-data").
    pub payload_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpActiveSensor {
    pub handle: i32,
    pub owner_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConnection {
    pub id: u64,
    pub op_package: String,
    pub uid: i32,
    pub subscribed_handles: Vec<i32>,
    pub socket_len: usize,
    pub needs_wakelock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpRegistrationEntry {
    pub timestamp_ns: i64,
    pub op_package: String,
    pub handle: i32,
    pub activate: bool,
    pub result_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpSnapshot {
    pub sensors: Vec<DumpSensorEntry>,
    pub recent_events: Vec<DumpRecentEvent>,
    pub active_sensors: Vec<DumpActiveSensor>,
    pub socket_buffer_capacity: usize,
    pub wakelock_held: bool,
    pub wakelock_name: String,
    pub operating_mode: String,
    pub allowlist: Option<String>,
    pub privacy_enabled: bool,
    pub connections: Vec<DumpConnection>,
    pub registration_ring: Vec<DumpRegistrationEntry>,
}

impl SensorService {
    /// Gather the full diagnostic snapshot (§6). `privileged` controls
    /// whether recorded event payloads are masked.
    pub fn dump_snapshot(&self, privileged: bool) -> DumpSnapshot {
        let (sensors, recent_events, active_sensors, registration_ring) = self.with_state(|s| {
            let mut sensors = Vec::new();
            s.registry().for_each(|entry| {
                sensors.push(DumpSensorEntry {
                    handle: entry.sensor.handle,
                    name: entry.sensor.name.clone(),
                    sensor_type: format!("{:?}", entry.sensor.sensor_type),
                    debug: entry.debug,
                    virtual_flag: entry.virtual_flag,
                    is_dynamic: entry.sensor.is_dynamic(),
                });
            });

            let recent_events: Vec<DumpRecentEvent> = s
                .recent_mut()
                .iter()
                .map(|(handle, event, stale)| DumpRecentEvent {
                    handle,
                    stale,
                    timestamp_ns: event.timestamp_ns,
                    payload_summary: privileged.then(|| format!("{:?}", event.payload)),
                })
                .collect();

            let active_sensors: Vec<DumpActiveSensor> = s
                .active_records_mut()
                .iter()
                .map(|(&handle, record)| DumpActiveSensor {
                    handle,
                    owner_count: record.owner_count(),
                })
                .collect();

            let registration_ring: Vec<DumpRegistrationEntry> = s
                .ring_mut()
                .iter_reverse_chronological()
                .map(|e| DumpRegistrationEntry {
                    timestamp_ns: e.timestamp_ns,
                    op_package: e.op_package.clone(),
                    handle: e.handle,
                    activate: e.activate,
                    result_ok: e.result_ok,
                })
                .collect();

            (sensors, recent_events, active_sensors, registration_ring)
        });

        let mut operating_mode = String::new();
        let mut allowlist = None;
        self.mode_mut(|mode| {
            let current = mode.current();
            operating_mode = format!("{current:?}");
            allowlist = current.allowlist().map(str::to_string);
        });

        let mut privacy_enabled = false;
        self.privacy_mut(|p| privacy_enabled = p.enabled());

        let connections: Vec<DumpConnection> = self
            .holder
            .snapshot_event_connections()
            .into_iter()
            .map(|conn| DumpConnection {
                id: conn.id,
                op_package: conn.op_package.clone(),
                uid: conn.uid,
                subscribed_handles: conn.subscribed_handles(),
                socket_len: conn.socket_len(),
                needs_wakelock: conn.needs_wakelock(),
            })
            .collect();

        DumpSnapshot {
            sensors,
            recent_events,
            active_sensors,
            socket_buffer_capacity: self.socket_buffer_capacity(),
            wakelock_held: self.wakelock.is_held(),
            wakelock_name: self.wakelock.name().to_string(),
            operating_mode,
            allowlist,
            privacy_enabled,
            connections,
            registration_ring,
        }
    }
}
