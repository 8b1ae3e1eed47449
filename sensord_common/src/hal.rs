//! HAL contract (§6): the opaque hardware-abstraction-layer collaborator.
//!
//! Mirrors `evo_common::hal::driver::HalDriver` — a trait object boundary
//! so the dispatch engine never depends on a concrete driver, plus a
//! `SimulatedHal` reference implementation so the crate runs without real
//! hardware, the same way the teacher always ships a `TestDriver` /
//! simulation alongside the trait.

use crate::event::Event;
use crate::sensor::{Sensor, SensorType};
use thiserror::Error;

/// Errors returned by a HAL driver implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HalError {
    #[error("HAL initialization failed: {0}")]
    InitFailed(String),

    #[error("HAL communication error: {0}")]
    CommunicationError(String),

    #[error("HAL dropped the connection and is reconnecting")]
    DeadObject,

    #[error("HAL capability unsupported: {0}")]
    Unsupported(String),

    #[error("HAL configuration error: {0}")]
    ConfigError(String),
}

/// Top-level posture the HAL is told to adopt (§4.8).
///
/// This is the HAL-facing subset of the richer `OperatingMode` the policy
/// layer exposes to clients (that one also carries an allowlist, which the
/// HAL doesn't need to know about).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalMode {
    Normal,
    DataInjection,
    /// Mode transition happens without informing the HAL at all (§4.8 table).
    HalBypassReplayInjection,
}

/// A duplicated native handle to client-provided shared memory (§4.4, §5
/// "Resource policy": native handles from clients are duplicated before
/// storage).
#[derive(Debug, Clone, Copy)]
pub struct MemoryDescriptor {
    pub raw_fd: i32,
    pub size_bytes: usize,
}

/// HAL-assigned token for a configured direct channel.
pub type ChannelHandle = i32;

/// Requested direct-channel delivery rate, in "levels" rather than raw
/// period — mirrors the real platform's `RateLevel` enum so a driver can
/// map it onto hardware-specific FIFO settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLevel {
    StopDelivery,
    Normal,
    Fast,
    VeryFast,
}

/// The HAL contract (§6).
///
/// `poll` is the only call expected to block; everything else is a
/// synchronous request/response. A driver implementation must be `Send`
/// because it's owned by the dispatch thread but configured from caller
/// threads via `Arc<Mutex<dyn HalDriver>>` in `sensord_core`.
pub trait HalDriver: Send {
    fn init_check(&self) -> Result<(), HalError>;

    fn sensor_list(&self) -> Vec<Sensor>;

    /// Block until at least one event is available (or the batch is full),
    /// writing up to `max` events. Returns `Err(HalError::DeadObject)` when
    /// the underlying driver connection has died (§4.5).
    fn poll(&mut self, max: usize) -> Result<Vec<Event>, HalError>;

    fn activate(&mut self, handle: i32, enable: bool) -> Result<(), HalError>;

    fn batch(
        &mut self,
        handle: i32,
        period_ns: i64,
        max_batch_latency_ns: i64,
    ) -> Result<(), HalError>;

    fn flush(&mut self, handle: i32) -> Result<(), HalError>;

    fn inject_sensor_data(&mut self, event: &Event) -> Result<(), HalError>;

    fn set_mode(&mut self, mode: HalMode) -> Result<(), HalError>;

    fn write_wake_lock_handled(&mut self, count: u32);

    fn register_direct_channel(&mut self, mem: MemoryDescriptor) -> Result<ChannelHandle, HalError>;

    fn configure_direct_channel(
        &mut self,
        channel: ChannelHandle,
        sensor_handle: i32,
        rate: RateLevel,
    ) -> Result<(), HalError>;

    fn unregister_direct_channel(&mut self, channel: ChannelHandle) -> Result<(), HalError>;

    fn handle_dynamic_sensor_connection(&mut self, handle: i32, connected: bool);

    fn is_reconnecting(&self) -> bool;

    fn reconnect(&mut self) -> Result<(), HalError>;

    fn get_dynamic_sensor_handles(&self) -> Vec<i32>;

    fn enable_all_sensors(&mut self);

    fn disable_all_sensors(&mut self);

    fn set_uid_state_for_connection(&mut self, connection_id: u64, uid_active: bool);
}

/// Reference driver that synthesizes a small fixed sensor list and produces
/// deterministic samples on `poll`, so the service runs end to end without
/// real hardware — the same role `evo_hal`'s `--simulate` driver plays for
/// the control-unit stack.
pub struct SimulatedHal {
    sensors: Vec<Sensor>,
    active: std::collections::HashSet<i32>,
    tick: i64,
}

impl SimulatedHal {
    pub fn new(sensors: Vec<Sensor>) -> Self {
        Self {
            sensors,
            active: std::collections::HashSet::new(),
            tick: 0,
        }
    }
}

impl HalDriver for SimulatedHal {
    fn init_check(&self) -> Result<(), HalError> {
        Ok(())
    }

    fn sensor_list(&self) -> Vec<Sensor> {
        self.sensors.clone()
    }

    fn poll(&mut self, max: usize) -> Result<Vec<Event>, HalError> {
        self.tick += 1;
        let mut out = Vec::new();
        for sensor in &self.sensors {
            if out.len() >= max {
                break;
            }
            if !self.active.contains(&sensor.handle) {
                continue;
            }
            let payload = match sensor.sensor_type {
                SensorType::Accelerometer | SensorType::MagneticField | SensorType::Gyroscope => {
                    crate::event::Payload::Vec3([0.0, 9.81, (self.tick as f32).sin()])
                }
                _ => crate::event::Payload::Scalar(self.tick as f32),
            };
            out.push(crate::event::Event::data(sensor, self.tick * 1_000_000, payload));
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
        Ok(out)
    }

    fn activate(&mut self, handle: i32, enable: bool) -> Result<(), HalError> {
        if enable {
            self.active.insert(handle);
        } else {
            self.active.remove(&handle);
        }
        Ok(())
    }

    fn batch(&mut self, _handle: i32, _period_ns: i64, _max_batch_latency_ns: i64) -> Result<(), HalError> {
        Ok(())
    }

    fn flush(&mut self, handle: i32) -> Result<(), HalError> {
        if !self.sensors.iter().any(|s| s.handle == handle) {
            return Err(HalError::Unsupported(format!("no such sensor {handle}")));
        }
        Ok(())
    }

    fn inject_sensor_data(&mut self, _event: &Event) -> Result<(), HalError> {
        Err(HalError::Unsupported("simulated driver does not accept injection".into()))
    }

    fn set_mode(&mut self, _mode: HalMode) -> Result<(), HalError> {
        Ok(())
    }

    fn write_wake_lock_handled(&mut self, _count: u32) {}

    fn register_direct_channel(&mut self, _mem: MemoryDescriptor) -> Result<ChannelHandle, HalError> {
        Err(HalError::Unsupported("simulated driver has no direct channel backing".into()))
    }

    fn configure_direct_channel(
        &mut self,
        _channel: ChannelHandle,
        _sensor_handle: i32,
        _rate: RateLevel,
    ) -> Result<(), HalError> {
        Err(HalError::Unsupported("simulated driver has no direct channel backing".into()))
    }

    fn unregister_direct_channel(&mut self, _channel: ChannelHandle) -> Result<(), HalError> {
        Ok(())
    }

    fn handle_dynamic_sensor_connection(&mut self, _handle: i32, _connected: bool) {}

    fn is_reconnecting(&self) -> bool {
        false
    }

    fn reconnect(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn get_dynamic_sensor_handles(&self) -> Vec<i32> {
        Vec::new()
    }

    fn enable_all_sensors(&mut self) {
        for s in &self.sensors {
            self.active.insert(s.handle);
        }
    }

    fn disable_all_sensors(&mut self) {
        self.active.clear();
    }

    fn set_uid_state_for_connection(&mut self, _connection_id: u64, _uid_active: bool) {}
}

#[cfg(test)]
mod simulated_hal_tests {
    use super::*;
    use crate::sensor::{ReportingMode, SensorFlags};

    fn accel() -> Sensor {
        Sensor {
            handle: 1,
            sensor_type: crate::sensor::SensorType::Accelerometer,
            name: "sim-accel".into(),
            min_delay_ns: 10_000_000,
            max_delay_ns: 200_000_000,
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
    fn inactive_sensor_produces_no_events() {
        let mut hal = SimulatedHal::new(vec![accel()]);
        let events = hal.poll(8).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn activated_sensor_produces_events() {
        let mut hal = SimulatedHal::new(vec![accel()]);
        hal.activate(1, true).unwrap();
        let events = hal.poll(8).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sensor_handle, 1);
    }

    #[test]
    fn disable_all_sensors_stops_output() {
        let mut hal = SimulatedHal::new(vec![accel()]);
        hal.enable_all_sensors();
        assert_eq!(hal.poll(8).unwrap().len(), 1);
        hal.disable_all_sensors();
        assert!(hal.poll(8).unwrap().is_empty());
    }
}
