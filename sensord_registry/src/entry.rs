//! One catalog entry (§2 "Sensor Registry").

use sensord_common::sensor::Sensor;

/// A registered sensor plus the classification bits the registry keeps
/// alongside it but that aren't part of the sensor's own wire identity.
#[derive(Debug, Clone)]
pub struct SensorEntry {
    pub sensor: Sensor,
    /// Only visible through the privileged debug listing.
    pub debug: bool,
    /// Synthesized by the Virtual Sensor Engine rather than HAL-backed.
    pub virtual_flag: bool,
}

impl SensorEntry {
    pub fn new(sensor: Sensor, debug: bool, virtual_flag: bool) -> Self {
        Self {
            sensor,
            debug,
            virtual_flag,
        }
    }
}
