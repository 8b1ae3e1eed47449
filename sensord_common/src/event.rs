//! Event record (§3 "Event").
//!
//! `Event` is the in-process representation used by the dispatch loop and
//! connections. The fixed byte layout required for the direct-channel
//! shared-memory path (§4.4) lives in `sensord_shm`, which encodes/decodes
//! `Event` to/from that wire format at the shm boundary only — keeping
//! `unsafe` confined to one place instead of spread through the engine.

use crate::sensor::SensorType;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-event flags (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EventFlags: u32 {
        /// Wake-up event requires an explicit client ack (§4.6).
        const WAKE_UP_SENSOR_EVENT_NEEDS_ACK = 0b0000_0001;
    }
}

/// What completed, for a `META_DATA` event (§4.2 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaDataType {
    FlushComplete,
}

/// Event payload (§3 "payload_union").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Vec3([f32; 3]),
    Quaternion([f32; 4]),
    Scalar(f32),
    Uint64(u64),
    MetaData { handle: i32, what: MetaDataType },
    DynamicSensorMeta { handle: i32, connected: bool, uuid: [u8; 16] },
    AdditionalInfo,
}

/// Event-record type tag. Distinct from `SensorType` because meta events
/// aren't produced "by" a sensor of that type — they're produced about one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Data(SensorType),
    MetaData,
    DynamicSensorMeta,
    AdditionalInfo,
}

/// Fixed-record sensor event (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub version: u32,
    pub sensor_handle: i32,
    pub event_type: EventType,
    pub timestamp_ns: i64,
    pub payload: Payload,
    pub flags: EventFlags,
}

pub const EVENT_VERSION: u32 = 1;

impl Event {
    pub fn data(sensor: &crate::sensor::Sensor, timestamp_ns: i64, payload: Payload) -> Self {
        Self {
            version: EVENT_VERSION,
            sensor_handle: sensor.handle,
            event_type: EventType::Data(sensor.sensor_type),
            timestamp_ns,
            payload,
            flags: if sensor.is_wake_up() {
                EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK
            } else {
                EventFlags::empty()
            },
        }
    }

    pub fn meta_data(handle: i32, timestamp_ns: i64, what: MetaDataType) -> Self {
        Self {
            version: EVENT_VERSION,
            sensor_handle: handle,
            event_type: EventType::MetaData,
            timestamp_ns,
            payload: Payload::MetaData { handle, what },
            flags: EventFlags::empty(),
        }
    }

    pub fn dynamic_sensor_meta(
        handle: i32,
        timestamp_ns: i64,
        connected: bool,
        uuid: [u8; 16],
    ) -> Self {
        Self {
            version: EVENT_VERSION,
            sensor_handle: handle,
            event_type: EventType::DynamicSensorMeta,
            timestamp_ns,
            payload: Payload::DynamicSensorMeta { handle, connected, uuid },
            flags: EventFlags::empty(),
        }
    }

    pub fn is_wake_up(&self) -> bool {
        self.flags.contains(EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK)
    }

    pub fn is_meta_or_additional_info(&self) -> bool {
        matches!(
            self.event_type,
            EventType::MetaData | EventType::AdditionalInfo
        )
    }
}
