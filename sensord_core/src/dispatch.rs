//! Dispatch Loop (§4.2): the single producer thread.
//!
//! RT setup mirrors `evo_control_unit::cycle::rt_setup` — `mlockall`,
//! `sched_setaffinity`, `sched_setscheduler(SCHED_FIFO, ...)` — gated
//! behind the `rt` feature, a no-op in the default build so the loop runs
//! unprivileged in tests and CI.

use crate::engine::SensorService;
use sensord_common::error::ServiceError;
use sensord_common::event::{Event, EventType, Payload};
use sensord_common::hal::HalError;
use sensord_common::sensor::{ReportingMode, Sensor, SensorFlags, SensorType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(feature = "rt")]
fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), ServiceError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::sys::mman::{mlockall, MlockallFlags};
    use nix::unistd::Pid;

    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| ServiceError::TransactionFailed(format!("mlockall failed: {e}")))?;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu_core)
        .map_err(|e| ServiceError::TransactionFailed(format!("CpuSet::set failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| ServiceError::TransactionFailed(format!("sched_setaffinity failed: {e}")))?;

    let param = libc::sched_param {
        sched_priority: rt_priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(ServiceError::TransactionFailed(format!(
            "sched_setscheduler(SCHED_FIFO, {rt_priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_setup(_cpu_core: usize, _rt_priority: i32) -> Result<(), ServiceError> {
    Ok(())
}

/// Run the dispatch loop until `shutdown` is set. Blocks inside `hal.poll`.
pub fn run_dispatch_loop(
    service: Arc<SensorService>,
    poll_batch_size: usize,
    cpu_core: usize,
    rt_priority: i32,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ServiceError> {
    rt_setup(cpu_core, rt_priority)?;

    while !shutdown.load(Ordering::SeqCst) {
        dispatch_cycle(&service, poll_batch_size)?;
    }
    Ok(())
}

fn dispatch_cycle(service: &SensorService, poll_batch_size: usize) -> Result<(), ServiceError> {
    let virtual_count = service.with_state(|s| s.virtual_sensors_mut().len());
    let max = (poll_batch_size / (1 + virtual_count)).max(1);

    let poll_result = service.hal.lock().unwrap().poll(max);
    let batch = match poll_result {
        Ok(events) => events,
        Err(HalError::DeadObject) => {
            let reconnecting = service.hal.lock().unwrap().is_reconnecting();
            if reconnecting {
                run_hal_reconnection(service)?;
            }
            return Ok(());
        }
        Err(err) => {
            tracing::error!(%err, "HAL poll failed, skipping this cycle");
            return Ok(());
        }
    };

    process_batch(service, batch, poll_batch_size)
}

/// Steps 3-9 of one dispatch iteration (§4.2), shared by the dispatch loop
/// and the runtime-sensor loop — the only difference between the two
/// producers is where `batch` came from.
pub(crate) fn process_batch(
    service: &SensorService,
    mut batch: Vec<Event>,
    capacity: usize,
) -> Result<(), ServiceError> {
    // ── step 4: wakelock acquisition ──
    let wake_count = batch.iter().filter(|e| e.is_wake_up()).count();
    if wake_count >= 1 && service.wakelock.acquire() {
        service.hal.lock().unwrap().write_wake_lock_handled(wake_count as u32);
    }

    // ── step 5: recent-event log ──
    service.with_state(|s| {
        for event in &batch {
            if !matches!(event.event_type, EventType::MetaData | EventType::AdditionalInfo) {
                s.recent_mut().record(event.sensor_handle, *event);
            }
        }
    });

    // ── step 6: virtual sensor expansion ──
    let extras = service.with_state(|s| {
        let mut produced = Vec::new();
        for vs in s.virtual_sensors_mut().iter_mut() {
            for event in &batch {
                if let Some(out) = vs.process(event) {
                    produced.push(out);
                }
            }
        }
        produced
    });

    let room = capacity.saturating_sub(batch.len());
    if extras.len() > room {
        tracing::warn!(
            dropped = extras.len() - room,
            "virtual sensor output overflowed the batch buffer, dropping excess"
        );
    }
    batch.extend(extras.into_iter().take(room));
    batch.sort_by_key(|e| e.timestamp_ns);

    // ── step 7: flush routing + dynamic sensor (de)registration ──
    let mut flush_dest = vec![None; batch.len()];
    let mut dynamic_changes = Vec::new();
    service.with_state(|s| {
        for (i, event) in batch.iter().enumerate() {
            match event.event_type {
                EventType::MetaData => {
                    if let Some(record) = s.active_records_mut().get_mut(&event.sensor_handle) {
                        flush_dest[i] = record.pop_pending_flush();
                    }
                }
                EventType::DynamicSensorMeta => {
                    if let Payload::DynamicSensorMeta { handle, connected, uuid } = event.payload {
                        if connected {
                            let sensor = Sensor {
                                handle,
                                sensor_type: SensorType::Custom(handle as u32),
                                name: format!("dynamic-{handle}"),
                                min_delay_ns: 0,
                                max_delay_ns: i64::MAX,
                                fifo_max_event_count: 0,
                                reporting_mode: ReportingMode::Continuous,
                                flags: SensorFlags::DYNAMIC,
                                required_permission: None,
                                required_app_op: None,
                                uuid,
                                device_id: 0,
                            };
                            s.add_sensor(sensor, false, false);
                        } else {
                            s.remove_sensor(handle);
                        }
                        dynamic_changes.push((handle, connected));
                    }
                }
                _ => {}
            }
        }
    });

    for (handle, connected) in dynamic_changes {
        service.hal.lock().unwrap().handle_dynamic_sensor_connection(handle, connected);
    }

    // ── step 8: fanout ──
    let snapshot = service.holder.snapshot_event_connections();
    for conn in &snapshot {
        let fired = conn.send_events(&batch, &flush_dest, |handle| {
            service.with_state(|s| {
                s.registry()
                    .lookup(handle)
                    .map(|e| e.sensor.reporting_mode == ReportingMode::OneShot)
                    .unwrap_or(false)
            })
        });
        for handle in fired {
            service.auto_disable_one_shot(conn, handle);
        }
    }

    // ── step 9: wakelock release ──
    if service.wakelock.is_held() && !service.holder.any_connection_needs_wakelock() {
        service.wakelock.release();
    }

    Ok(())
}

/// HAL reconnection protocol (§4.5).
fn run_hal_reconnection(service: &SensorService) -> Result<(), ServiceError> {
    let dynamic: Vec<(i32, [u8; 16])> = service.with_state(|s| {
        s.registry()
            .dynamic_sensors()
            .iter()
            .map(|e| (e.sensor.handle, e.sensor.uuid))
            .collect()
    });

    for (handle, uuid) in dynamic {
        let synthetic = Event::dynamic_sensor_meta(handle, now_ns(), false, uuid);
        for conn in service.holder.snapshot_event_connections() {
            conn.send_events(&[synthetic], &[None], |_| false);
        }
        service.with_state(|s| {
            s.remove_sensor(handle);
        });
        service.hal.lock().unwrap().handle_dynamic_sensor_connection(handle, false);
    }

    service
        .hal
        .lock()
        .unwrap()
        .reconnect()
        .map_err(|e| ServiceError::TransactionFailed(e.to_string()))
}
