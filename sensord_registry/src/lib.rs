//! Sensor catalog, recent-event cache, and virtual-sensor fabric.
//!
//! Owned behind `sensord_core`'s connection lock; this crate only holds
//! the data and pure transforms, never a socket or a HAL handle.

pub mod entry;
pub mod recent;
pub mod registry;
pub mod virtual_sensor;

pub use entry::SensorEntry;
pub use recent::RecentEventLog;
pub use registry::SensorRegistry;
pub use virtual_sensor::{
    GameRotationVectorSensor, GeomagneticRotationVectorSensor, GravitySensor, LimitedAxesSensor,
    LinearAccelerationSensor, RotationVectorSensor, SynthesisPlan, VirtualSensor, plan_synthesis,
};
