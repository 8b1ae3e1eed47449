//! Sensor identity and static capabilities (§3 "Sensor").

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical/virtual sensor category.
///
/// `Custom` carries a vendor-defined type id so the registry never needs to
/// reject a sensor the HAL reports that isn't in this enum's well-known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    Accelerometer,
    MagneticField,
    Orientation,
    Gyroscope,
    Light,
    Pressure,
    Proximity,
    Gravity,
    LinearAcceleration,
    RotationVector,
    AmbientTemperature,
    MagneticFieldUncalibrated,
    GameRotationVector,
    GyroscopeUncalibrated,
    StepDetector,
    StepCounter,
    GeomagneticRotationVector,
    HeartRate,
    HeadTracker,
    Custom(u32),
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(id) => write!(f, "custom({id})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Reporting discipline (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportingMode {
    /// Emits at its configured sampling period until disabled.
    Continuous,
    /// Emits only when its value changes; replays last value on subscribe (§4.3, Property 6).
    OnChange,
    /// Fires at most once per activation, then auto-disables (§4.3, Property 7).
    OneShot,
    /// Reporting semantics are sensor-specific (e.g. step counter).
    Special,
}

bitflags! {
    /// Sensor-level capability flags (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SensorFlags: u32 {
        /// Events from this sensor must bring the system out of suspend (§4.6, GLOSSARY).
        const WAKE_UP = 0b0000_0001;
        /// Sensor was registered at runtime (hot-plugged), not present at boot (§3).
        const DYNAMIC = 0b0000_0010;
    }
}

/// Static, immutable description of one sensor (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    /// Stable 32-bit handle, unique for the lifetime of the process (Property 1).
    pub handle: i32,
    pub sensor_type: SensorType,
    pub name: String,
    pub min_delay_ns: i64,
    pub max_delay_ns: i64,
    pub fifo_max_event_count: u32,
    pub reporting_mode: ReportingMode,
    pub flags: SensorFlags,
    /// Android-style runtime permission string; `None` means no gate.
    pub required_permission: Option<String>,
    /// App-op name checked in addition to `required_permission`, if any.
    pub required_app_op: Option<String>,
    /// Stable identifier used for anonymized-ID derivation (§4.9).
    pub uuid: [u8; 16],
    /// 0 for platform sensors, non-zero for runtime sensors (§3).
    pub device_id: i32,
}

impl Sensor {
    /// Clamp a requested sampling period into this sensor's supported range (§4.3).
    pub fn clamp_period_ns(&self, period_ns: i64) -> i64 {
        period_ns.clamp(self.min_delay_ns, self.max_delay_ns.max(self.min_delay_ns))
    }

    pub fn is_wake_up(&self) -> bool {
        self.flags.contains(SensorFlags::WAKE_UP)
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(SensorFlags::DYNAMIC)
    }
}
