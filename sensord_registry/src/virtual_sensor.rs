//! Virtual Sensor Engine (§4.1, §4.2 step 6).
//!
//! Each virtual sensor is a pure function of its own small rolling state
//! over recent physical samples: given one input event it produces at most
//! one output event. The dispatch loop owns the authoritative set of
//! "active" virtual sensors and calls `process` once per input event in
//! the batch (§4.2 step 6); this module only computes the synthesized
//! samples, never touches the HAL or the registry.

use sensord_common::event::{Event, EventType, Payload};
use sensord_common::sensor::{ReportingMode, Sensor, SensorFlags, SensorType};

/// A synthesized sensor driven by physical-sensor events.
pub trait VirtualSensor: Send {
    fn descriptor(&self) -> &Sensor;

    /// Feed one physical-sensor event in; produce at most one derived
    /// event out, at the same timestamp as the input that completed it.
    fn process(&mut self, input: &Event) -> Option<Event>;
}

fn descriptor(handle: i32, sensor_type: SensorType, name: &str) -> Sensor {
    Sensor {
        handle,
        sensor_type,
        name: name.to_string(),
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

fn as_vec3(event: &Event) -> Option<[f32; 3]> {
    match event.payload {
        Payload::Vec3(v) => Some(v),
        _ => None,
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn lerp(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Low-pass-filtered accelerometer estimate of the gravity vector.
pub struct GravitySensor {
    descriptor: Sensor,
    estimate: [f32; 3],
    seen_first: bool,
}

impl GravitySensor {
    pub fn new(handle: i32) -> Self {
        Self {
            descriptor: descriptor(handle, SensorType::Gravity, "gravity"),
            estimate: [0.0, 0.0, 9.81],
            seen_first: false,
        }
    }
}

impl VirtualSensor for GravitySensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        if !matches!(input.event_type, EventType::Data(SensorType::Accelerometer)) {
            return None;
        }
        let accel = as_vec3(input)?;
        self.estimate = if self.seen_first {
            lerp(self.estimate, accel, 0.1)
        } else {
            self.seen_first = true;
            accel
        };
        Some(Event::data(&self.descriptor, input.timestamp_ns, Payload::Vec3(self.estimate)))
    }
}

/// Accelerometer minus the gravity estimate.
pub struct LinearAccelerationSensor {
    descriptor: Sensor,
    gravity: GravitySensor,
}

impl LinearAccelerationSensor {
    pub fn new(handle: i32, gravity_handle: i32) -> Self {
        Self {
            descriptor: descriptor(handle, SensorType::LinearAcceleration, "linear_acceleration"),
            gravity: GravitySensor::new(gravity_handle),
        }
    }
}

impl VirtualSensor for LinearAccelerationSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        let gravity_event = self.gravity.process(input)?;
        let gravity = as_vec3(&gravity_event)?;
        let accel = as_vec3(input)?;
        Some(Event::data(
            &self.descriptor,
            input.timestamp_ns,
            Payload::Vec3(sub(accel, gravity)),
        ))
    }
}

/// Gyro+accel+mag fused absolute orientation, exposed as a quaternion.
///
/// Uses the most recent magnetometer sample seen (cached from an earlier
/// event) to fold the z-axis heading in once both inputs are available.
pub struct RotationVectorSensor {
    descriptor: Sensor,
    last_mag: Option<[f32; 3]>,
}

impl RotationVectorSensor {
    pub fn new(handle: i32) -> Self {
        Self {
            descriptor: descriptor(handle, SensorType::RotationVector, "rotation_vector"),
            last_mag: None,
        }
    }
}

impl VirtualSensor for RotationVectorSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        match input.event_type {
            EventType::Data(SensorType::MagneticField) => {
                self.last_mag = as_vec3(input);
                None
            }
            EventType::Data(SensorType::Gyroscope) => {
                let gyro = as_vec3(input)?;
                let mag = self.last_mag?;
                let heading = mag[1].atan2(mag[0]);
                let quat = [gyro[0] * 0.01, gyro[1] * 0.01, heading.sin(), heading.cos()];
                Some(Event::data(&self.descriptor, input.timestamp_ns, Payload::Quaternion(quat)))
            }
            _ => None,
        }
    }
}

/// Accel+gyro fused orientation without magnetometer input (no absolute heading).
pub struct GameRotationVectorSensor {
    descriptor: Sensor,
    last_accel: Option<[f32; 3]>,
}

impl GameRotationVectorSensor {
    pub fn new(handle: i32) -> Self {
        Self {
            descriptor: descriptor(handle, SensorType::GameRotationVector, "game_rotation_vector"),
            last_accel: None,
        }
    }
}

impl VirtualSensor for GameRotationVectorSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        match input.event_type {
            EventType::Data(SensorType::Accelerometer) => {
                self.last_accel = as_vec3(input);
                None
            }
            EventType::Data(SensorType::Gyroscope) => {
                let gyro = as_vec3(input)?;
                let accel = self.last_accel?;
                let tilt = accel[2].atan2((accel[0] * accel[0] + accel[1] * accel[1]).sqrt());
                let quat = [gyro[0] * 0.01, gyro[1] * 0.01, tilt.sin(), tilt.cos()];
                Some(Event::data(&self.descriptor, input.timestamp_ns, Payload::Quaternion(quat)))
            }
            _ => None,
        }
    }
}

/// Accel+mag fused heading, without gyro input.
pub struct GeomagneticRotationVectorSensor {
    descriptor: Sensor,
    last_accel: Option<[f32; 3]>,
}

impl GeomagneticRotationVectorSensor {
    pub fn new(handle: i32) -> Self {
        Self {
            descriptor: descriptor(
                handle,
                SensorType::GeomagneticRotationVector,
                "geomagnetic_rotation_vector",
            ),
            last_accel: None,
        }
    }
}

impl VirtualSensor for GeomagneticRotationVectorSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        match input.event_type {
            EventType::Data(SensorType::Accelerometer) => {
                self.last_accel = as_vec3(input);
                None
            }
            EventType::Data(SensorType::MagneticField) => {
                let mag = as_vec3(input)?;
                let accel = self.last_accel?;
                let heading = mag[1].atan2(mag[0]);
                let tilt = accel[2].atan2((accel[0] * accel[0] + accel[1] * accel[1]).sqrt());
                let quat = [tilt.sin(), 0.0, heading.sin(), heading.cos()];
                Some(Event::data(&self.descriptor, input.timestamp_ns, Payload::Quaternion(quat)))
            }
            _ => None,
        }
    }
}

/// Gyro+accel+mag fused Euler-angle orientation (the deprecated Android
/// `TYPE_ORIENTATION`, still requested when all three base sensors are
/// present and the HAL reports no orientation sensor of its own).
pub struct OrientationSensor {
    descriptor: Sensor,
    last_accel: Option<[f32; 3]>,
    last_mag: Option<[f32; 3]>,
}

impl OrientationSensor {
    pub fn new(handle: i32) -> Self {
        Self {
            descriptor: descriptor(handle, SensorType::Orientation, "orientation"),
            last_accel: None,
            last_mag: None,
        }
    }
}

impl VirtualSensor for OrientationSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        match input.event_type {
            EventType::Data(SensorType::Accelerometer) => {
                self.last_accel = as_vec3(input);
                None
            }
            EventType::Data(SensorType::MagneticField) => {
                self.last_mag = as_vec3(input);
                None
            }
            EventType::Data(SensorType::Gyroscope) => {
                let accel = self.last_accel?;
                let mag = self.last_mag?;
                let azimuth = mag[1].atan2(mag[0]);
                let pitch = (-accel[1]).atan2(accel[2]);
                let roll = (-accel[0]).atan2((accel[1] * accel[1] + accel[2] * accel[2]).sqrt());
                Some(Event::data(
                    &self.descriptor,
                    input.timestamp_ns,
                    Payload::Vec3([azimuth, pitch, roll]),
                ))
            }
            _ => None,
        }
    }
}

/// One axis a regulatory automotive "limited axes" variant is allowed to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedAxis {
    X,
    Y,
    Z,
}

/// Automotive limited-axes IMU family member (§4.1: "an additional
/// limited-axes IMU family is synthesized per base sensor" in automotive mode):
/// passes a base accelerometer/gyroscope through with non-permitted axes zeroed.
pub struct LimitedAxesSensor {
    descriptor: Sensor,
    base_type: SensorType,
    permitted: Vec<LimitedAxis>,
}

impl LimitedAxesSensor {
    pub fn new(handle: i32, base_type: SensorType, name: &str, permitted: Vec<LimitedAxis>) -> Self {
        Self {
            descriptor: descriptor(handle, base_type, name),
            base_type,
            permitted,
        }
    }

    fn mask(&self, v: [f32; 3]) -> [f32; 3] {
        let x = if self.permitted.contains(&LimitedAxis::X) { v[0] } else { 0.0 };
        let y = if self.permitted.contains(&LimitedAxis::Y) { v[1] } else { 0.0 };
        let z = if self.permitted.contains(&LimitedAxis::Z) { v[2] } else { 0.0 };
        [x, y, z]
    }
}

impl VirtualSensor for LimitedAxesSensor {
    fn descriptor(&self) -> &Sensor {
        &self.descriptor
    }

    fn process(&mut self, input: &Event) -> Option<Event> {
        if input.event_type != EventType::Data(self.base_type) {
            return None;
        }
        let v = as_vec3(input)?;
        Some(Event::data(&self.descriptor, input.timestamp_ns, Payload::Vec3(self.mask(v))))
    }
}

/// Which fusion sensors must be software-synthesized, given what the HAL
/// already reports (§4.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisPlan {
    pub gravity: bool,
    pub linear_acceleration: bool,
    pub rotation_vector: bool,
    pub orientation: bool,
    pub game_rotation_vector: bool,
    pub geomagnetic_rotation_vector: bool,
    pub limited_axes_imu: bool,
}

/// Decide which virtual sensors to synthesize from the HAL's reported base
/// sensor set (§4.1). The synthesized set is the complement of what the
/// HAL already supplies among the fusion family.
pub fn plan_synthesis(hal_sensors: &[SensorType], automotive_mode: bool) -> SynthesisPlan {
    let has = |t: SensorType| hal_sensors.contains(&t);

    let has_gyro = has(SensorType::Gyroscope);
    let has_accel = has(SensorType::Accelerometer);
    let has_mag = has(SensorType::MagneticField);

    let mut plan = SynthesisPlan::default();

    if has_gyro && has_accel && has_mag {
        plan.rotation_vector = !has(SensorType::RotationVector);
        plan.orientation = !has(SensorType::Orientation);
    }
    if has_gyro && has_accel {
        plan.gravity = !has(SensorType::Gravity);
        plan.linear_acceleration = !has(SensorType::LinearAcceleration);
        plan.game_rotation_vector = !has(SensorType::GameRotationVector);
    }
    if has_accel && has_mag {
        plan.geomagnetic_rotation_vector = !has(SensorType::GeomagneticRotationVector);
    }

    plan.limited_axes_imu = automotive_mode && (has_accel || has_gyro);

    plan
}
