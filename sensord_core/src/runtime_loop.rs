//! Runtime-Sensor Loop (§5 "Runtime-Sensor Loop", §4.1): a secondary
//! producer for sensors whose samples arrive from a user-space callback
//! instead of the HAL. Drains a Condvar-guarded queue and runs the same
//! batch pipeline the dispatch loop uses, minus the HAL poll itself.

use crate::dispatch::process_batch;
use crate::engine::SensorService;
use sensord_common::error::ServiceError;
use sensord_common::event::Event;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Injected-event queue fed by runtime-sensor callbacks (§3 "Runtime
/// sensor"). Its own mutex + condvar, independent of the outer lock (§5).
pub struct RuntimeSensorQueue {
    inner: Mutex<VecDeque<Event>>,
    cv: Condvar,
}

impl RuntimeSensorQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    pub fn push(&self, event: Event) {
        let mut guard = self.inner.lock().unwrap();
        guard.push_back(event);
        self.cv.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Block until at least one event is queued (or `shutdown` flips),
    /// then drain up to `max` of them.
    fn wait_batch(&self, max: usize, shutdown: &AtomicBool) -> Vec<Event> {
        let mut guard = self.inner.lock().unwrap();
        while guard.is_empty() && !shutdown.load(Ordering::SeqCst) {
            let (next, _timeout) = self
                .cv
                .wait_timeout(guard, std::time::Duration::from_millis(200))
                .unwrap();
            guard = next;
        }
        let n = guard.len().min(max);
        guard.drain(..n).collect()
    }
}

impl Default for RuntimeSensorQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_runtime_sensor_loop(
    service: Arc<SensorService>,
    queue: Arc<RuntimeSensorQueue>,
    max_batch: usize,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ServiceError> {
    while !shutdown.load(Ordering::SeqCst) {
        let batch = queue.wait_batch(max_batch, &shutdown);
        if batch.is_empty() {
            continue;
        }
        process_batch(&service, batch, max_batch)?;
    }
    Ok(())
}
