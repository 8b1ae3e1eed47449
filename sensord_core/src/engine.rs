//! The service core: wires the registry, policy, identity, and connection
//! layers together behind the outer lock (§5 "One outer mutex (`mLock`)").
//!
//! This is the collaborator the dispatch loop, the runtime-sensor loop, and
//! every external request (`enable`/`disable`/`flush`/shell commands) all
//! go through.

use crate::active_record::ActiveSensorRecord;
use crate::connection::{ConnectionId, EventConnection, Subscription};
use crate::direct::DirectConnection;
use crate::holder::ConnectionHolder;
use crate::ring::{RegistrationEntry, RegistrationRing};
use crate::wakelock::SystemWakelock;
use sensord_common::consts::VIRTUAL_SENSOR_HANDLE_BASE;
use sensord_common::error::{fatal, ServiceError};
use sensord_common::hal::{HalDriver, HalMode, MemoryDescriptor, RateLevel};
use sensord_common::sensor::{ReportingMode, SensorType};
use sensord_identity::IdentityModule;
use sensord_policy::access::{can_access, CallerContext};
use sensord_policy::mode::{BuildType, ModeEffect, OperatingMode, OperatingModeMachine};
use sensord_policy::uid::{MicToggle, SensorPrivacy, UidState};
use sensord_registry::virtual_sensor::{plan_synthesis, VirtualSensor};
use sensord_registry::{RecentEventLog, SensorRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct EngineState {
    registry: SensorRegistry,
    active_records: HashMap<i32, ActiveSensorRecord>,
    recent: RecentEventLog,
    mode: OperatingModeMachine,
    uid_state: UidState,
    privacy: SensorPrivacy,
    mic_toggle: MicToggle,
    ring: RegistrationRing,
    virtual_sensors: Vec<Box<dyn VirtualSensor>>,
}

/// Service-wide collaborators (§5). The dispatch loop, runtime-sensor loop,
/// and caller threads all reach the same instance through an `Arc`.
pub struct SensorService {
    state: Mutex<EngineState>,
    pub holder: Arc<ConnectionHolder>,
    pub hal: Arc<Mutex<Box<dyn HalDriver>>>,
    pub wakelock: Arc<SystemWakelock>,
    pub identity: IdentityModule,
    pub build_type: BuildType,
    socket_capacity: usize,
}

impl SensorService {
    pub fn new(
        hal: Box<dyn HalDriver>,
        identity: IdentityModule,
        build_type: BuildType,
        automotive_mode: bool,
        socket_capacity: usize,
        ring_capacity: usize,
    ) -> Result<Self, ServiceError> {
        let physical = hal.sensor_list();
        let mut registry = SensorRegistry::new();
        for sensor in &physical {
            registry.add(sensor.clone(), false, false);
        }

        let hal_types: Vec<SensorType> = physical.iter().map(|s| s.sensor_type).collect();
        let plan = plan_synthesis(&hal_types, automotive_mode);
        let mut virtual_sensors: Vec<Box<dyn VirtualSensor>> = Vec::new();
        let mut next_virtual_handle = VIRTUAL_SENSOR_HANDLE_BASE;
        let mut alloc = || {
            let h = next_virtual_handle;
            next_virtual_handle += 1;
            h
        };

        if plan.gravity {
            let h = alloc();
            virtual_sensors.push(Box::new(sensord_registry::virtual_sensor::GravitySensor::new(h)));
            registry.add(virtual_sensors.last().unwrap().descriptor().clone(), false, true);
        }
        if plan.linear_acceleration {
            let h = alloc();
            let gravity_h = alloc();
            let sensor = sensord_registry::virtual_sensor::LinearAccelerationSensor::new(h, gravity_h);
            registry.add(sensor.descriptor().clone(), false, true);
            virtual_sensors.push(Box::new(sensor));
        }
        if plan.rotation_vector {
            let h = alloc();
            let sensor = sensord_registry::virtual_sensor::RotationVectorSensor::new(h);
            registry.add(sensor.descriptor().clone(), false, true);
            virtual_sensors.push(Box::new(sensor));
        }
        if plan.orientation {
            let h = alloc();
            let sensor = sensord_registry::virtual_sensor::OrientationSensor::new(h);
            registry.add(sensor.descriptor().clone(), false, true);
            virtual_sensors.push(Box::new(sensor));
        }
        if plan.game_rotation_vector {
            let h = alloc();
            let sensor = sensord_registry::virtual_sensor::GameRotationVectorSensor::new(h);
            registry.add(sensor.descriptor().clone(), false, true);
            virtual_sensors.push(Box::new(sensor));
        }
        if plan.geomagnetic_rotation_vector {
            let h = alloc();
            let sensor = sensord_registry::virtual_sensor::GeomagneticRotationVectorSensor::new(h);
            registry.add(sensor.descriptor().clone(), false, true);
            virtual_sensors.push(Box::new(sensor));
        }
        if plan.limited_axes_imu {
            // Automotive mode restricts the vertical axis on each present base
            // IMU sensor, matching Android's accelerometer/gyroscope-limited-axes pair.
            let permitted = vec![
                sensord_registry::virtual_sensor::LimitedAxis::X,
                sensord_registry::virtual_sensor::LimitedAxis::Y,
            ];
            if hal_types.contains(&SensorType::Accelerometer) {
                let h = alloc();
                let sensor = sensord_registry::virtual_sensor::LimitedAxesSensor::new(
                    h,
                    SensorType::Accelerometer,
                    "accelerometer_limited_axes",
                    permitted.clone(),
                );
                registry.add(sensor.descriptor().clone(), false, true);
                virtual_sensors.push(Box::new(sensor));
            }
            if hal_types.contains(&SensorType::Gyroscope) {
                let h = alloc();
                let sensor = sensord_registry::virtual_sensor::LimitedAxesSensor::new(
                    h,
                    SensorType::Gyroscope,
                    "gyroscope_limited_axes",
                    permitted,
                );
                registry.add(sensor.descriptor().clone(), false, true);
                virtual_sensors.push(Box::new(sensor));
            }
        }

        let state = EngineState {
            registry,
            active_records: HashMap::new(),
            recent: RecentEventLog::new(),
            mode: OperatingModeMachine::new(),
            uid_state: UidState::default(),
            privacy: SensorPrivacy::default(),
            mic_toggle: MicToggle::default(),
            ring: RegistrationRing::new(ring_capacity),
            virtual_sensors,
        };

        Ok(Self {
            state: Mutex::new(state),
            holder: Arc::new(ConnectionHolder::new()),
            hal: Arc::new(Mutex::new(hal)),
            wakelock: Arc::new(SystemWakelock::new(sensord_common::consts::WAKELOCK_NAME)),
            identity,
            build_type,
            socket_capacity,
        })
    }

    pub fn new_event_connection(&self, op_package: impl Into<String>, uid: i32) -> Arc<EventConnection> {
        let id = self.holder.allocate_id();
        let conn = Arc::new(EventConnection::new(id, op_package.into(), uid, self.socket_capacity));
        self.holder.insert_event_connection(conn.clone());
        conn
    }

    /// `enable(handle, period_ns, batch_latency_ns) → Status` (§4.3).
    pub fn enable(
        &self,
        conn: &Arc<EventConnection>,
        caller: &CallerContext,
        handle: i32,
        period_ns: i64,
        max_batch_latency_ns: i64,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();

        if !state.mode.current().allows_new_connection_from(&conn.op_package) {
            return Err(ServiceError::InvalidOperation(
                "operating mode restricts new subscriptions to the allowlisted package".into(),
            ));
        }

        let sensor = state
            .registry
            .lookup(handle)
            .ok_or_else(|| ServiceError::BadValue(format!("unknown sensor handle {handle}")))?
            .sensor
            .clone();

        if !can_access(&sensor, caller) {
            return Err(ServiceError::PermissionDenied(format!(
                "{} lacks access to sensor {handle}",
                conn.op_package
            )));
        }

        let mic_engaged = state.mic_toggle.engaged();
        let rate_capped_period = sensord_policy::access::adjust_sampling_period(period_ns, caller, mic_engaged)?;
        let clamped_period = sensor.clamp_period_ns(rate_capped_period);
        let is_new_record = !state.active_records.contains_key(&handle);
        let is_on_change = sensor.reporting_mode == ReportingMode::OnChange;
        let already_member = state
            .active_records
            .get(&handle)
            .map(|r| r.owners_snapshot().iter().any(|c| c.id == conn.id))
            .unwrap_or(false);

        let replay = if !is_new_record && !already_member && is_on_change {
            match state.recent.is_stale(handle) {
                Some(false) => state.recent.last_value(handle).copied(),
                _ => None,
            }
        } else {
            None
        };

        {
            let mut hal = self.hal.lock().unwrap();
            let was_active_elsewhere = !is_new_record;
            let result = (|| -> Result<(), ServiceError> {
                hal.batch(handle, clamped_period, max_batch_latency_ns)
                    .map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
                if sensor.reporting_mode == ReportingMode::Continuous && was_active_elsewhere {
                    hal.flush(handle).map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
                }
                hal.activate(handle, true).map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
                Ok(())
            })();

            if let Err(err) = result {
                state.ring.push(RegistrationEntry {
                    timestamp_ns: 0,
                    op_package: conn.op_package.clone(),
                    handle,
                    period_ns: clamped_period,
                    max_batch_latency_ns,
                    activate: true,
                    result_ok: false,
                });
                return Err(err);
            }
        }

        let record = state.active_records.entry(handle).or_insert_with(ActiveSensorRecord::new);
        let first_time_record = is_new_record;
        record.add_owner(conn);
        let needs_first_flush_pending = sensor.reporting_mode == ReportingMode::Continuous && !first_time_record;
        if needs_first_flush_pending {
            record.push_pending_flush(conn);
        }

        if first_time_record {
            state.recent.mark_stale(handle);
        }

        conn.add_subscription(
            handle,
            Subscription {
                sampling_period_ns: clamped_period,
                max_batch_latency_ns,
                app_op: sensor.required_app_op.clone(),
                first_flush_pending: needs_first_flush_pending,
                pending_flush_count: 0,
            },
        );

        state.ring.push(RegistrationEntry {
            timestamp_ns: 0,
            op_package: conn.op_package.clone(),
            handle,
            period_ns: clamped_period,
            max_batch_latency_ns,
            activate: true,
            result_ok: true,
        });

        drop(state);
        if let Some(event) = replay {
            conn.replay_event(event);
        }

        Ok(())
    }

    /// `disable(handle) → Status` (§4.3).
    pub fn disable(&self, conn: &Arc<EventConnection>, handle: i32) -> Result<(), ServiceError> {
        if !conn.remove_subscription(handle) {
            return Err(ServiceError::BadValue(format!("{handle} was not subscribed")));
        }

        let mut state = self.state.lock().unwrap();
        let now_empty = state
            .active_records
            .get_mut(&handle)
            .map(|r| r.remove_owner(conn.id))
            .unwrap_or(true);

        if now_empty {
            state.active_records.remove(&handle);
            self.hal
                .lock()
                .unwrap()
                .activate(handle, false)
                .map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
        }

        state.ring.push(RegistrationEntry {
            timestamp_ns: 0,
            op_package: conn.op_package.clone(),
            handle,
            period_ns: 0,
            max_batch_latency_ns: 0,
            activate: false,
            result_ok: true,
        });

        Ok(())
    }

    /// `flush(handle) → Status` (§4.3). Rejects one-shot sensors (§7).
    pub fn flush(&self, conn: &Arc<EventConnection>, handle: i32) -> Result<(), ServiceError> {
        if !conn.is_subscribed(handle) {
            return Err(ServiceError::BadValue(format!("{handle} was not subscribed")));
        }
        let mut state = self.state.lock().unwrap();

        let sensor = state
            .registry
            .lookup(handle)
            .ok_or_else(|| ServiceError::BadValue(format!("unknown sensor handle {handle}")))?
            .sensor
            .clone();
        if sensor.reporting_mode == ReportingMode::OneShot {
            return Err(ServiceError::InvalidOperation(format!(
                "flush is not supported on one-shot sensor {handle}"
            )));
        }

        let record = state
            .active_records
            .get_mut(&handle)
            .ok_or_else(|| ServiceError::InvalidOperation("sensor is not active".into()))?;
        record.push_pending_flush(conn);
        drop(state);
        self.hal
            .lock()
            .unwrap()
            .flush(handle)
            .map_err(|e| ServiceError::TransactionFailed(e.to_string()))
    }

    /// `destroy()` (§4.3, §5 resource policy). Idempotent.
    pub fn destroy_event_connection(&self, conn: &Arc<EventConnection>) {
        let handles = conn.destroy();
        let mut state = self.state.lock().unwrap();
        for handle in handles {
            if let Some(record) = state.active_records.get_mut(&handle) {
                if record.remove_owner(conn.id) {
                    state.active_records.remove(&handle);
                    let _ = self.hal.lock().unwrap().activate(handle, false);
                }
            }
        }
        drop(state);
        self.holder.remove_event_connection(conn.id);
    }

    /// One auto-disable from a fired one-shot subscription (§4.3).
    pub fn auto_disable_one_shot(&self, conn: &Arc<EventConnection>, handle: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.active_records.get_mut(&handle) {
            if record.remove_owner(conn.id) {
                state.active_records.remove(&handle);
                let _ = self.hal.lock().unwrap().activate(handle, false);
            }
        }
    }

    /// Register a Direct Connection (§4.4): duplicates the client's memory
    /// descriptor into a HAL-backed channel when `device_id` names the
    /// default device, then stores it in the holder.
    pub fn register_direct_connection(
        &self,
        memory: MemoryDescriptor,
        device_id: i32,
    ) -> Result<Arc<DirectConnection>, ServiceError> {
        let id = self.holder.allocate_id();
        let conn = Arc::new(DirectConnection::new(id, memory, device_id));

        if conn.is_hal_backed() {
            let channel = self
                .hal
                .lock()
                .unwrap()
                .register_direct_channel(memory)
                .map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
            conn.set_channel_handle(channel);
        }

        self.holder.insert_direct_connection(conn.clone());
        Ok(conn)
    }

    /// `configureDirectChannel(handle, rate)` (§4.4): apply a per-sensor
    /// delivery rate to an already-registered direct channel.
    pub fn configure_direct_channel(
        &self,
        conn: &Arc<DirectConnection>,
        handle: i32,
        rate: RateLevel,
    ) -> Result<(), ServiceError> {
        let channel = conn
            .channel_handle()
            .ok_or_else(|| ServiceError::InvalidOperation("direct connection has no channel".into()))?;
        self.hal
            .lock()
            .unwrap()
            .configure_direct_channel(channel, handle, rate)
            .map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
        conn.record_rate(handle, rate);
        Ok(())
    }

    /// Tear down a Direct Connection, releasing its HAL-side channel.
    pub fn unregister_direct_connection(&self, conn: &Arc<DirectConnection>) {
        if let Some(channel) = conn.channel_handle() {
            let _ = self.hal.lock().unwrap().unregister_direct_channel(channel);
        }
        conn.destroy();
        self.holder.remove_direct_connection(conn.id);
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EngineStateHandle) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        let mut handle = EngineStateHandle { inner: &mut guard };
        f(&mut handle)
    }

    pub fn is_new_dynamic_handle(&self, handle: i32) -> bool {
        self.state.lock().unwrap().registry.is_new_handle(handle)
    }

    pub fn registration_ring_len(&self) -> usize {
        self.state.lock().unwrap().ring.len()
    }

    pub fn uid_state_mut(&self, f: impl FnOnce(&mut UidState)) {
        f(&mut self.state.lock().unwrap().uid_state)
    }

    pub fn privacy_mut(&self, f: impl FnOnce(&mut SensorPrivacy)) {
        f(&mut self.state.lock().unwrap().privacy)
    }

    pub fn mic_toggle_mut(&self, f: impl FnOnce(&mut MicToggle)) {
        f(&mut self.state.lock().unwrap().mic_toggle)
    }

    pub fn mode_mut(&self, f: impl FnOnce(&mut OperatingModeMachine)) {
        f(&mut self.state.lock().unwrap().mode)
    }

    /// Drive a validated operating-mode transition end to end (§4.8): the
    /// state machine only reports the required `ModeEffect`, this is what
    /// actually carries it out against the HAL and every direct connection.
    pub fn set_operating_mode(&self, to: OperatingMode) -> Result<(), ServiceError> {
        let effect = {
            let mut state = self.state.lock().unwrap();
            state.mode.transition(to, self.build_type)?
        };

        match effect {
            ModeEffect::DisableAllPauseDirect => {
                self.hal.lock().unwrap().disable_all_sensors();
                self.pause_all_direct_connections();
            }
            ModeEffect::ReenableAllResumeDirect => {
                self.hal.lock().unwrap().enable_all_sensors();
                self.resume_all_direct_connections();
            }
            ModeEffect::HalSetModeDataInjection => {
                if let Err(err) = self.hal.lock().unwrap().set_mode(HalMode::DataInjection) {
                    self.state.lock().unwrap().mode.revert_to_normal();
                    return Err(ServiceError::TransactionFailed(err.to_string()));
                }
            }
            ModeEffect::BypassHal => {}
            ModeEffect::HalSetModeNormalReenableAll => {
                let mut hal = self.hal.lock().unwrap();
                hal.set_mode(HalMode::Normal)
                    .map_err(|e| ServiceError::TransactionFailed(e.to_string()))?;
                hal.enable_all_sensors();
            }
        }

        Ok(())
    }

    fn pause_all_direct_connections(&self) {
        let mut hal = self.hal.lock().unwrap();
        for dc in self.holder.snapshot_direct_connections() {
            let handles = dc.pause();
            if let Some(channel) = dc.channel_handle() {
                for handle in handles {
                    let _ = hal.configure_direct_channel(channel, handle, RateLevel::StopDelivery);
                }
            }
        }
    }

    fn resume_all_direct_connections(&self) {
        let mut hal = self.hal.lock().unwrap();
        for dc in self.holder.snapshot_direct_connections() {
            let restored = dc.resume();
            if let Some(channel) = dc.channel_handle() {
                for (handle, rate) in restored {
                    let _ = hal.configure_direct_channel(channel, handle, rate);
                }
            }
        }
    }

    pub fn fatal_if_handle_collision(&self, handle: i32) {
        if !self.state.lock().unwrap().registry.is_new_handle(handle) {
            fatal(format!("sensor handle {handle} reused while still live"));
        }
    }

    pub fn socket_buffer_capacity(&self) -> usize {
        self.socket_capacity
    }
}

/// Narrow accessor used by the dispatch loop, which needs mutable access to
/// several `EngineState` fields within one lock acquisition per cycle.
pub struct EngineStateHandle<'a> {
    inner: &'a mut EngineState,
}

impl<'a> EngineStateHandle<'a> {
    pub fn registry(&self) -> &SensorRegistry {
        &self.inner.registry
    }

    pub fn registry_mut(&mut self) -> &mut SensorRegistry {
        &mut self.inner.registry
    }

    pub fn recent_mut(&mut self) -> &mut RecentEventLog {
        &mut self.inner.recent
    }

    pub fn active_records_mut(&mut self) -> &mut HashMap<i32, ActiveSensorRecord> {
        &mut self.inner.active_records
    }

    pub fn virtual_sensors_mut(&mut self) -> &mut Vec<Box<dyn VirtualSensor>> {
        &mut self.inner.virtual_sensors
    }

    pub fn ring_mut(&mut self) -> &mut RegistrationRing {
        &mut self.inner.ring
    }

    /// Remove a sensor and clear its recent-event entry in one borrow
    /// (§4.1: "Removal clears any recent-event entry").
    pub fn remove_sensor(&mut self, handle: i32) -> bool {
        self.inner.registry.remove(handle, &mut self.inner.recent)
    }

    /// Add a sensor discovered at registration time (§4.5, §4.2 step 7).
    pub fn add_sensor(&mut self, sensor: sensord_common::sensor::Sensor, debug: bool, virtual_flag: bool) -> bool {
        self.inner.registry.add(sensor, debug, virtual_flag)
    }
}

pub type EngineConnectionId = ConnectionId;
