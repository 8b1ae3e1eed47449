//! End-to-end scenario tests (spec §8 scenarios S1-S6).
//!
//! A `ScriptedHal` stands in for the real HAL: each `poll()` call pops one
//! pre-scripted batch, returning empty afterward. `run_dispatch_loop` is
//! run on a background thread with a short-lived shutdown flag, the same
//! pattern `evo_control_unit`'s integration tests use around its cycle loop.

use sensord_common::consts::HMAC_KEY_LEN;
use sensord_common::error::ServiceError;
use sensord_common::event::{Event, EventFlags, EventType, MetaDataType, Payload};
use sensord_common::hal::{ChannelHandle, HalDriver, HalError, HalMode, MemoryDescriptor, RateLevel};
use sensord_common::sensor::{ReportingMode, Sensor, SensorFlags, SensorType};
use sensord_core::dispatch::run_dispatch_loop;
use sensord_core::SensorService;
use sensord_identity::IdentityModule;
use sensord_policy::mode::{BuildType, OperatingMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedHal {
    sensors: Vec<Sensor>,
    batches: Mutex<Vec<Vec<Event>>>,
    dynamic_calls: Mutex<Vec<(i32, bool)>>,
}

impl ScriptedHal {
    fn new(sensors: Vec<Sensor>, batches: Vec<Vec<Event>>) -> Self {
        Self { sensors, batches: Mutex::new(batches), dynamic_calls: Mutex::new(Vec::new()) }
    }
}

impl HalDriver for ScriptedHal {
    fn init_check(&self) -> Result<(), HalError> {
        Ok(())
    }
    fn sensor_list(&self) -> Vec<Sensor> {
        self.sensors.clone()
    }
    fn poll(&mut self, max: usize) -> Result<Vec<Event>, HalError> {
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            std::thread::sleep(Duration::from_millis(2));
            return Ok(Vec::new());
        }
        let mut batch = batches.remove(0);
        batch.truncate(max);
        Ok(batch)
    }
    fn activate(&mut self, _handle: i32, _enable: bool) -> Result<(), HalError> {
        Ok(())
    }
    fn batch(&mut self, _handle: i32, _period_ns: i64, _max_batch_latency_ns: i64) -> Result<(), HalError> {
        Ok(())
    }
    fn flush(&mut self, _handle: i32) -> Result<(), HalError> {
        Ok(())
    }
    fn inject_sensor_data(&mut self, _event: &Event) -> Result<(), HalError> {
        Ok(())
    }
    fn set_mode(&mut self, _mode: HalMode) -> Result<(), HalError> {
        Ok(())
    }
    fn write_wake_lock_handled(&mut self, _count: u32) {}
    fn register_direct_channel(&mut self, _mem: MemoryDescriptor) -> Result<ChannelHandle, HalError> {
        Ok(1)
    }
    fn configure_direct_channel(&mut self, _channel: ChannelHandle, _sensor_handle: i32, _rate: RateLevel) -> Result<(), HalError> {
        Ok(())
    }
    fn unregister_direct_channel(&mut self, _channel: ChannelHandle) -> Result<(), HalError> {
        Ok(())
    }
    fn handle_dynamic_sensor_connection(&mut self, handle: i32, connected: bool) {
        self.dynamic_calls.lock().unwrap().push((handle, connected));
    }
    fn is_reconnecting(&self) -> bool {
        false
    }
    fn reconnect(&mut self) -> Result<(), HalError> {
        Ok(())
    }
    fn get_dynamic_sensor_handles(&self) -> Vec<i32> {
        Vec::new()
    }
    fn enable_all_sensors(&mut self) {}
    fn disable_all_sensors(&mut self) {}
    fn set_uid_state_for_connection(&mut self, _connection_id: u64, _uid_active: bool) {}
}

fn sensor(handle: i32, sensor_type: SensorType, reporting_mode: ReportingMode, flags: SensorFlags) -> Sensor {
    Sensor {
        handle,
        sensor_type,
        name: format!("sensor-{handle}"),
        min_delay_ns: 10_000_000,
        max_delay_ns: 200_000_000,
        fifo_max_event_count: 0,
        reporting_mode,
        flags,
        required_permission: None,
        required_app_op: None,
        uuid: [0; 16],
        device_id: 0,
    }
}

fn build_service(hal: ScriptedHal) -> Arc<SensorService> {
    let identity = IdentityModule::new([0u8; HMAC_KEY_LEN]);
    Arc::new(SensorService::new(Box::new(hal), identity, BuildType::Debug, false, 16, 32).unwrap())
}

fn data_event(handle: i32, sensor_type: SensorType, timestamp_ns: i64, flags: EventFlags) -> Event {
    Event {
        version: 1,
        sensor_handle: handle,
        event_type: EventType::Data(sensor_type),
        timestamp_ns,
        payload: Payload::Scalar(1.0),
        flags,
    }
}

/// Run the dispatch loop for a bounded duration, long enough to drain every
/// scripted batch, then stop it.
fn run_dispatch_briefly(service: Arc<SensorService>, millis: u64) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown2 = shutdown.clone();
    let handle = std::thread::spawn(move || {
        let _: Result<(), ServiceError> = run_dispatch_loop(service, 16, 0, 0, shutdown2);
    });
    std::thread::sleep(Duration::from_millis(millis));
    shutdown.store(true, Ordering::SeqCst);
    handle.join().unwrap();
}

#[test]
fn s1_single_accel_five_events_in_order_no_wakelock() {
    let accel = sensor(1, SensorType::Accelerometer, ReportingMode::Continuous, SensorFlags::empty());
    let batch: Vec<Event> = (0..5)
        .map(|i| data_event(1, SensorType::Accelerometer, i * 20_000_000, EventFlags::empty()))
        .collect();
    let hal = ScriptedHal::new(vec![accel], vec![batch]);
    let service = build_service(hal);

    let caller = sensord_policy::access::CallerContext {
        uid: 10_000,
        op_package: "com.a".into(),
        has_required_permission: false,
        app_op_allowed: None,
        target_sdk: 34,
        is_debuggable: false,
        has_high_sampling_rate_permission: true,
        head_tracker_restriction_lifted: false,
    };
    let conn = service.new_event_connection("com.a", 10_000);
    service.enable(&conn, &caller, 1, 20_000_000, 0).unwrap();

    run_dispatch_briefly(service.clone(), 30);

    let events = conn.drain_socket();
    assert_eq!(events.len(), 5);
    for pair in events.windows(2) {
        assert!(pair[0].timestamp_ns <= pair[1].timestamp_ns);
    }
    assert!(!service.wakelock.is_held());
}

#[test]
fn s2_wakeup_proximity_acquires_and_releases_wakelock() {
    let accel = sensor(1, SensorType::Accelerometer, ReportingMode::Continuous, SensorFlags::empty());
    let prox = sensor(2, SensorType::Proximity, ReportingMode::OnChange, SensorFlags::WAKE_UP);
    let batch = vec![data_event(2, SensorType::Proximity, 30_000_000, EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK)];
    let hal = ScriptedHal::new(vec![accel, prox], vec![batch]);
    let service = build_service(hal);

    let caller = sensord_policy::access::CallerContext {
        uid: 10_000,
        op_package: "com.a".into(),
        has_required_permission: false,
        app_op_allowed: None,
        target_sdk: 34,
        is_debuggable: false,
        has_high_sampling_rate_permission: true,
        head_tracker_restriction_lifted: false,
    };
    let conn = service.new_event_connection("com.a", 10_000);
    service.enable(&conn, &caller, 1, 20_000_000, 0).unwrap();
    service.enable(&conn, &caller, 2, 20_000_000, 0).unwrap();

    run_dispatch_briefly(service.clone(), 20);
    assert!(service.wakelock.is_held(), "wakelock must be held after a wake-up event is dispatched");

    conn.ack(1);
    assert!(!service.wakelock.is_held(), "wakelock releases once the sole subscriber acks");
}

#[test]
fn s3_on_change_replay_is_stale_after_record_torn_down() {
    let light = sensor(1, SensorType::Light, ReportingMode::OnChange, SensorFlags::empty());
    let hal = ScriptedHal::new(vec![light], vec![vec![data_event(1, SensorType::Light, 0, EventFlags::empty())]]);
    let service = build_service(hal);

    let caller = |pkg: &str, uid: i32| sensord_policy::access::CallerContext {
        uid,
        op_package: pkg.to_string(),
        has_required_permission: false,
        app_op_allowed: None,
        target_sdk: 34,
        is_debuggable: false,
        has_high_sampling_rate_permission: true,
        head_tracker_restriction_lifted: false,
    };

    let conn_a = service.new_event_connection("com.a", 10_000);
    service.enable(&conn_a, &caller("com.a", 10_000), 1, 20_000_000, 0).unwrap();

    run_dispatch_briefly(service.clone(), 10);
    conn_a.drain_socket();

    service.disable(&conn_a, 1).unwrap();

    let conn_b = service.new_event_connection("com.b", 10_001);
    service.enable(&conn_b, &caller("com.b", 10_001), 1, 20_000_000, 0).unwrap();

    assert_eq!(conn_b.socket_len(), 0, "B must not receive a replayed value once the record was torn down");
}

#[test]
fn s4_flush_delivers_exactly_one_meta_data_to_the_flushing_connection() {
    let accel = sensor(1, SensorType::Accelerometer, ReportingMode::Continuous, SensorFlags::empty());
    let meta = Event::meta_data(1, 0, MetaDataType::FlushComplete);
    let hal = ScriptedHal::new(vec![accel], vec![vec![meta]]);
    let service = build_service(hal);

    let caller = sensord_policy::access::CallerContext {
        uid: 10_000,
        op_package: "com.a".into(),
        has_required_permission: false,
        app_op_allowed: None,
        target_sdk: 34,
        is_debuggable: false,
        has_high_sampling_rate_permission: true,
        head_tracker_restriction_lifted: false,
    };
    let conn_a = service.new_event_connection("com.a", 10_000);
    let conn_b = service.new_event_connection("com.b", 10_001);
    service.enable(&conn_a, &caller, 1, 20_000_000, 0).unwrap();
    service
        .enable(&conn_b, &sensord_policy::access::CallerContext { op_package: "com.b".into(), ..caller.clone() }, 1, 20_000_000, 0)
        .unwrap();

    service.flush(&conn_a, 1).unwrap();
    run_dispatch_briefly(service.clone(), 15);

    let a_events = conn_a.drain_socket();
    let b_events = conn_b.drain_socket();
    assert_eq!(a_events.iter().filter(|e| e.event_type == EventType::MetaData).count(), 1);
    assert_eq!(b_events.iter().filter(|e| e.event_type == EventType::MetaData).count(), 0);
}

#[test]
fn s5_restricted_mode_rejects_non_allowlisted_enable() {
    let accel = sensor(1, SensorType::Accelerometer, ReportingMode::Continuous, SensorFlags::empty());
    let hal = ScriptedHal::new(vec![accel], Vec::new());
    let service = build_service(hal);

    service.mode_mut(|mode| {
        mode.transition(OperatingMode::Restricted { allowlist_prefix: "com.test".into() }, BuildType::Debug).unwrap();
    });

    let other = sensord_policy::access::CallerContext {
        uid: 10_000,
        op_package: "com.other".into(),
        has_required_permission: false,
        app_op_allowed: None,
        target_sdk: 34,
        is_debuggable: false,
        has_high_sampling_rate_permission: true,
        head_tracker_restriction_lifted: false,
    };
    let conn_other = service.new_event_connection("com.other", 20_000);
    let result = service.enable(&conn_other, &other, 1, 20_000_000, 0);
    assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));

    let allowed = sensord_policy::access::CallerContext { op_package: "com.test".into(), ..other };
    let conn_allowed = service.new_event_connection("com.test", 20_001);
    assert!(service.enable(&conn_allowed, &allowed, 1, 20_000_000, 0).is_ok());
}

#[test]
fn s6_dynamic_sensor_connect_registers_with_dynamic_flag() {
    let connect = Event::dynamic_sensor_meta(0x40001, 0, true, [9u8; 16]);
    let hal = ScriptedHal::new(Vec::new(), vec![vec![connect]]);
    let service = build_service(hal);

    assert!(service.is_new_dynamic_handle(0x40001));
    run_dispatch_briefly(service.clone(), 15);

    let snapshot = service.dump_snapshot(true);
    let entry = snapshot.sensors.iter().find(|s| s.handle == 0x40001);
    assert!(entry.is_some(), "registry must gain an entry for the announced dynamic sensor");
    assert!(entry.unwrap().is_dynamic);
}

#[test]
fn s6_dynamic_sensor_disconnect_cleanly_deregisters() {
    let connect = Event::dynamic_sensor_meta(0x40001, 0, true, [9u8; 16]);
    let disconnect = Event::dynamic_sensor_meta(0x40001, 1, false, [9u8; 16]);
    let hal = ScriptedHal::new(Vec::new(), vec![vec![connect], vec![disconnect]]);
    let service = build_service(hal);

    run_dispatch_briefly(service.clone(), 30);

    assert!(
        service.is_new_dynamic_handle(0x40001),
        "handle must be free again once the HAL reports it disconnected"
    );
}
