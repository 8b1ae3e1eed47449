//! Fixed-layout `Event` wire format for the direct-channel shared-memory
//! path (§3 "Event": "fixed-layout record").
//!
//! `sensord_common::event::Event` is an ergonomic tagged enum used
//! everywhere in-process; this module is the one place that flattens it
//! into the fixed byte record a client maps directly out of shared memory,
//! and the one place that parses it back. Keeping the flattening here
//! instead of on `Event` itself keeps the dispatch engine free of
//! wire-format concerns.

use crate::error::{ShmError, ShmResult};
use sensord_common::event::{Event, EventFlags, EventType, MetaDataType, Payload};
use sensord_common::sensor::SensorType;
use static_assertions::const_assert_eq;

/// Total size in bytes of one wire record.
pub const WIRE_EVENT_SIZE: usize = 64;

const_assert_eq!(WIRE_EVENT_SIZE, 64);

// event_type tags
const TAG_DATA: u32 = 0;
const TAG_META_DATA: u32 = 1;
const TAG_DYNAMIC_SENSOR_META: u32 = 2;
const TAG_ADDITIONAL_INFO: u32 = 3;

// payload tags
const PAYLOAD_VEC3: u32 = 0;
const PAYLOAD_QUATERNION: u32 = 1;
const PAYLOAD_SCALAR: u32 = 2;
const PAYLOAD_UINT64: u32 = 3;
const PAYLOAD_META_DATA: u32 = 4;
const PAYLOAD_DYNAMIC_SENSOR_META: u32 = 5;
const PAYLOAD_ADDITIONAL_INFO: u32 = 6;

fn sensor_type_to_wire(t: SensorType) -> u32 {
    match t {
        SensorType::Accelerometer => 1,
        SensorType::MagneticField => 2,
        SensorType::Orientation => 3,
        SensorType::Gyroscope => 4,
        SensorType::Light => 5,
        SensorType::Pressure => 6,
        SensorType::Proximity => 7,
        SensorType::Gravity => 8,
        SensorType::LinearAcceleration => 9,
        SensorType::RotationVector => 10,
        SensorType::AmbientTemperature => 11,
        SensorType::MagneticFieldUncalibrated => 12,
        SensorType::GameRotationVector => 13,
        SensorType::GyroscopeUncalibrated => 14,
        SensorType::StepDetector => 15,
        SensorType::StepCounter => 16,
        SensorType::GeomagneticRotationVector => 17,
        SensorType::HeartRate => 18,
        SensorType::HeadTracker => 19,
        SensorType::Custom(id) => 0x8000_0000 | (id & 0x7fff_ffff),
    }
}

fn wire_to_sensor_type(v: u32) -> SensorType {
    match v {
        1 => SensorType::Accelerometer,
        2 => SensorType::MagneticField,
        3 => SensorType::Orientation,
        4 => SensorType::Gyroscope,
        5 => SensorType::Light,
        6 => SensorType::Pressure,
        7 => SensorType::Proximity,
        8 => SensorType::Gravity,
        9 => SensorType::LinearAcceleration,
        10 => SensorType::RotationVector,
        11 => SensorType::AmbientTemperature,
        12 => SensorType::MagneticFieldUncalibrated,
        13 => SensorType::GameRotationVector,
        14 => SensorType::GyroscopeUncalibrated,
        15 => SensorType::StepDetector,
        16 => SensorType::StepCounter,
        17 => SensorType::GeomagneticRotationVector,
        18 => SensorType::HeartRate,
        19 => SensorType::HeadTracker,
        other => SensorType::Custom(other & 0x7fff_ffff),
    }
}

/// Flatten an in-process `Event` into its fixed wire record.
pub fn encode_event(event: &Event) -> [u8; WIRE_EVENT_SIZE] {
    let mut buf = [0u8; WIRE_EVENT_SIZE];

    buf[0..4].copy_from_slice(&event.version.to_le_bytes());
    buf[4..8].copy_from_slice(&event.sensor_handle.to_le_bytes());

    let (type_tag, type_aux) = match event.event_type {
        EventType::Data(t) => (TAG_DATA, sensor_type_to_wire(t)),
        EventType::MetaData => (TAG_META_DATA, 0),
        EventType::DynamicSensorMeta => (TAG_DYNAMIC_SENSOR_META, 0),
        EventType::AdditionalInfo => (TAG_ADDITIONAL_INFO, 0),
    };
    buf[8..12].copy_from_slice(&type_tag.to_le_bytes());
    buf[12..16].copy_from_slice(&type_aux.to_le_bytes());
    buf[16..24].copy_from_slice(&event.timestamp_ns.to_le_bytes());
    buf[24..28].copy_from_slice(&event.flags.bits().to_le_bytes());

    let payload_tag = match event.payload {
        Payload::Vec3(v) => {
            buf[32..44].copy_from_slice(bytemuck_f32x3(v));
            PAYLOAD_VEC3
        }
        Payload::Quaternion(q) => {
            buf[32..48].copy_from_slice(bytemuck_f32x4(q));
            PAYLOAD_QUATERNION
        }
        Payload::Scalar(s) => {
            buf[32..36].copy_from_slice(&s.to_le_bytes());
            PAYLOAD_SCALAR
        }
        Payload::Uint64(v) => {
            buf[32..40].copy_from_slice(&v.to_le_bytes());
            PAYLOAD_UINT64
        }
        Payload::MetaData { handle, what } => {
            buf[32..36].copy_from_slice(&handle.to_le_bytes());
            buf[36] = match what {
                MetaDataType::FlushComplete => 0,
            };
            PAYLOAD_META_DATA
        }
        Payload::DynamicSensorMeta {
            handle,
            connected,
            uuid,
        } => {
            buf[32..36].copy_from_slice(&handle.to_le_bytes());
            buf[36] = connected as u8;
            buf[37..53].copy_from_slice(&uuid);
            PAYLOAD_DYNAMIC_SENSOR_META
        }
        Payload::AdditionalInfo => PAYLOAD_ADDITIONAL_INFO,
    };
    buf[28..32].copy_from_slice(&payload_tag.to_le_bytes());

    buf
}

fn bytemuck_f32x3(v: [f32; 3]) -> [u8; 12] {
    let mut out = [0u8; 12];
    for (i, f) in v.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
    }
    out
}

fn bytemuck_f32x4(v: [f32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, f) in v.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
    }
    out
}

/// Parse a fixed wire record back into an `Event`.
pub fn decode_event(buf: &[u8]) -> ShmResult<Event> {
    if buf.len() < WIRE_EVENT_SIZE {
        return Err(ShmError::AlignmentError {
            address: buf.len(),
            alignment: WIRE_EVENT_SIZE,
        });
    }

    let version = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let sensor_handle = i32::from_le_bytes(buf[4..8].try_into().unwrap());
    let type_tag = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let type_aux = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let timestamp_ns = i64::from_le_bytes(buf[16..24].try_into().unwrap());
    let flags = EventFlags::from_bits_truncate(u32::from_le_bytes(buf[24..28].try_into().unwrap()));
    let payload_tag = u32::from_le_bytes(buf[28..32].try_into().unwrap());

    let event_type = match type_tag {
        TAG_DATA => EventType::Data(wire_to_sensor_type(type_aux)),
        TAG_META_DATA => EventType::MetaData,
        TAG_DYNAMIC_SENSOR_META => EventType::DynamicSensorMeta,
        TAG_ADDITIONAL_INFO => EventType::AdditionalInfo,
        other => {
            return Err(ShmError::BadMagic {
                expected: TAG_DATA as u64,
                found: other as u64,
            })
        }
    };

    let payload = match payload_tag {
        PAYLOAD_VEC3 => {
            let mut v = [0f32; 3];
            for i in 0..3 {
                v[i] = f32::from_le_bytes(buf[32 + i * 4..36 + i * 4].try_into().unwrap());
            }
            Payload::Vec3(v)
        }
        PAYLOAD_QUATERNION => {
            let mut v = [0f32; 4];
            for i in 0..4 {
                v[i] = f32::from_le_bytes(buf[32 + i * 4..36 + i * 4].try_into().unwrap());
            }
            Payload::Quaternion(v)
        }
        PAYLOAD_SCALAR => Payload::Scalar(f32::from_le_bytes(buf[32..36].try_into().unwrap())),
        PAYLOAD_UINT64 => Payload::Uint64(u64::from_le_bytes(buf[32..40].try_into().unwrap())),
        PAYLOAD_META_DATA => {
            let handle = i32::from_le_bytes(buf[32..36].try_into().unwrap());
            let what = match buf[36] {
                0 => MetaDataType::FlushComplete,
                other => {
                    return Err(ShmError::BadMagic {
                        expected: 0,
                        found: other as u64,
                    })
                }
            };
            Payload::MetaData { handle, what }
        }
        PAYLOAD_DYNAMIC_SENSOR_META => {
            let handle = i32::from_le_bytes(buf[32..36].try_into().unwrap());
            let connected = buf[36] != 0;
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&buf[37..53]);
            Payload::DynamicSensorMeta {
                handle,
                connected,
                uuid,
            }
        }
        PAYLOAD_ADDITIONAL_INFO => Payload::AdditionalInfo,
        other => {
            return Err(ShmError::BadMagic {
                expected: 0,
                found: other as u64,
            })
        }
    };

    Ok(Event {
        version,
        sensor_handle,
        event_type,
        timestamp_ns,
        payload,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensord_common::sensor::{ReportingMode, Sensor, SensorFlags};

    fn accel() -> Sensor {
        Sensor {
            handle: 3,
            sensor_type: SensorType::Accelerometer,
            name: "accel".into(),
            min_delay_ns: 0,
            max_delay_ns: 0,
            fifo_max_event_count: 0,
            reporting_mode: ReportingMode::Continuous,
            flags: SensorFlags::empty(),
            required_permission: None,
            required_app_op: None,
            uuid: [0; 16],
            device_id: 0,
        }
    }

    #[test]
    fn round_trips_vec3_event() {
        let s = accel();
        let ev = Event::data(&s, 1_234_567, Payload::Vec3([1.0, -2.5, 3.25]));
        let wire = encode_event(&ev);
        let back = decode_event(&wire).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn round_trips_dynamic_sensor_meta() {
        let ev = Event::dynamic_sensor_meta(9, 42, true, [7u8; 16]);
        let wire = encode_event(&ev);
        let back = decode_event(&wire).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn round_trips_meta_data() {
        let ev = Event::meta_data(5, 99, MetaDataType::FlushComplete);
        let wire = encode_event(&ev);
        let back = decode_event(&wire).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(decode_event(&buf).is_err());
    }
}
