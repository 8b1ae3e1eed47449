//! Event Connection (§4.3): per-client subscription state and its backing
//! socket. Each connection owns its own lock, the way the spec calls for
//! ("Each Event Connection and Direct Connection owns its own mutex").

use sensord_common::error::ServiceError;
use sensord_common::event::{Event, EventType, Payload};
use sensord_common::sensor::ReportingMode;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub type ConnectionId = u64;

/// Per-handle subscription bookkeeping (§3 "Subscription").
#[derive(Debug, Clone)]
pub struct Subscription {
    pub sampling_period_ns: i64,
    pub max_batch_latency_ns: i64,
    pub app_op: Option<String>,
    pub first_flush_pending: bool,
    pub pending_flush_count: u32,
}

struct EventConnectionInner {
    subscriptions: HashMap<i32, Subscription>,
    socket: VecDeque<Event>,
    socket_capacity: usize,
    wakelock_refcount: u32,
}

/// A single client's event stream (§3 "Event Connection" contract in §4.3).
pub struct EventConnection {
    pub id: ConnectionId,
    pub op_package: String,
    pub uid: i32,
    inner: Mutex<EventConnectionInner>,
}

impl EventConnection {
    pub fn new(id: ConnectionId, op_package: String, uid: i32, socket_capacity: usize) -> Self {
        Self {
            id,
            op_package,
            uid,
            inner: Mutex::new(EventConnectionInner {
                subscriptions: HashMap::new(),
                socket: VecDeque::new(),
                socket_capacity,
                wakelock_refcount: 0,
            }),
        }
    }

    pub fn is_subscribed(&self, handle: i32) -> bool {
        self.inner.lock().unwrap().subscriptions.contains_key(&handle)
    }

    pub fn subscribed_handles(&self) -> Vec<i32> {
        self.inner.lock().unwrap().subscriptions.keys().copied().collect()
    }

    pub fn subscription(&self, handle: i32) -> Option<Subscription> {
        self.inner.lock().unwrap().subscriptions.get(&handle).cloned()
    }

    /// Insert a fresh subscription (§4.3 "enable"). Caller has already run
    /// the HAL side-effects and policy checks.
    pub fn add_subscription(&self, handle: i32, sub: Subscription) {
        self.inner.lock().unwrap().subscriptions.insert(handle, sub);
    }

    /// Remove a subscription (§4.3 "disable"). Returns true if it existed.
    pub fn remove_subscription(&self, handle: i32) -> bool {
        self.inner.lock().unwrap().subscriptions.remove(&handle).is_some()
    }

    pub fn set_first_flush_pending(&self, handle: i32, pending: bool) {
        if let Some(sub) = self.inner.lock().unwrap().subscriptions.get_mut(&handle) {
            sub.first_flush_pending = pending;
        }
    }

    pub fn bump_pending_flush(&self, handle: i32) {
        if let Some(sub) = self.inner.lock().unwrap().subscriptions.get_mut(&handle) {
            sub.pending_flush_count += 1;
        }
    }

    pub fn socket_len(&self) -> usize {
        self.inner.lock().unwrap().socket.len()
    }

    pub fn drain_socket(&self) -> Vec<Event> {
        self.inner.lock().unwrap().socket.drain(..).collect()
    }

    fn push_event(&self, inner: &mut EventConnectionInner, event: Event) {
        if inner.socket.len() >= inner.socket_capacity {
            // Back-pressure (§4.2): drop the oldest non-wake event first.
            let drop_at = inner
                .socket
                .iter()
                .position(|e| !e.is_wake_up())
                .unwrap_or(0);
            inner.socket.remove(drop_at);
        }
        inner.socket.push_back(event);
    }

    /// Immediately deliver a single recorded event to this connection's
    /// socket (§4.3 on-change replay), acquiring the wakelock refcount
    /// first if it is a wake-up event.
    pub fn replay_event(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap();
        if event.is_wake_up() {
            inner.wakelock_refcount += 1;
        }
        self.push_event(&mut inner, event);
    }

    /// Fan one dispatch batch out to this connection (§4.2 step 8).
    ///
    /// `flush_dest[i]` names the connection id that should receive
    /// `batch[i]` when it is a `META_DATA` event (computed by the dispatch
    /// loop from the Active Sensor Record's pending-flush FIFO).
    /// `is_one_shot` classifies a sensor handle so a fired one-shot
    /// subscription can be reported back to the caller for auto-disable.
    pub fn send_events(
        &self,
        batch: &[Event],
        flush_dest: &[Option<ConnectionId>],
        is_one_shot: impl Fn(i32) -> bool,
    ) -> Vec<i32> {
        let mut inner = self.inner.lock().unwrap();
        let mut fired_one_shots = Vec::new();

        for (i, event) in batch.iter().enumerate() {
            match event.event_type {
                EventType::MetaData => {
                    if flush_dest.get(i).copied().flatten() == Some(self.id) {
                        self.push_event(&mut inner, *event);
                    }
                }
                EventType::DynamicSensorMeta => {
                    let handle = event.sensor_handle;
                    if inner.subscriptions.contains_key(&handle) {
                        self.push_event(&mut inner, *event);
                        if let Payload::DynamicSensorMeta { connected: false, .. } = event.payload {
                            inner.subscriptions.remove(&handle);
                        }
                    }
                }
                EventType::Data(_) => {
                    let handle = event.sensor_handle;
                    if inner.subscriptions.contains_key(&handle) {
                        if event.is_wake_up() {
                            inner.wakelock_refcount += 1;
                        }
                        self.push_event(&mut inner, *event);
                        if is_one_shot(handle) {
                            inner.subscriptions.remove(&handle);
                            fired_one_shots.push(handle);
                        }
                    }
                }
                EventType::AdditionalInfo => {
                    if inner.subscriptions.contains_key(&event.sensor_handle) {
                        self.push_event(&mut inner, *event);
                    }
                }
            }
        }

        fired_one_shots
    }

    /// Whether this connection is still holding the system wakelock
    /// responsible (§4.6: "needs the wakelock" while refcount > 0).
    pub fn needs_wakelock(&self) -> bool {
        self.inner.lock().unwrap().wakelock_refcount > 0
    }

    /// Client ack for `count` previously-delivered wake-up events.
    pub fn ack(&self, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.wakelock_refcount = inner.wakelock_refcount.saturating_sub(count);
    }

    /// Force the refcount to zero (§4.3: ack-receiver timeout recovery).
    pub fn force_reset_wakelock(&self) {
        self.inner.lock().unwrap().wakelock_refcount = 0;
    }

    /// Idempotent teardown (§4.3 `destroy`, §5 resource policy).
    pub fn destroy(&self) -> Vec<i32> {
        let mut inner = self.inner.lock().unwrap();
        let handles: Vec<i32> = inner.subscriptions.keys().copied().collect();
        inner.subscriptions.clear();
        inner.socket.clear();
        inner.wakelock_refcount = 0;
        handles
    }
}

pub fn classify_reporting(mode: ReportingMode) -> bool {
    matches!(mode, ReportingMode::OneShot)
}

pub fn validation_error(msg: impl Into<String>) -> ServiceError {
    ServiceError::BadValue(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensord_common::event::{EventFlags, Payload};
    use sensord_common::sensor::SensorType;

    fn data_event(handle: i32, wake: bool, ts: i64) -> Event {
        Event {
            version: 1,
            sensor_handle: handle,
            event_type: EventType::Data(SensorType::Proximity),
            timestamp_ns: ts,
            payload: Payload::Scalar(1.0),
            flags: if wake {
                EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK
            } else {
                EventFlags::empty()
            },
        }
    }

    fn sub() -> Subscription {
        Subscription {
            sampling_period_ns: 20_000_000,
            max_batch_latency_ns: 0,
            app_op: None,
            first_flush_pending: false,
            pending_flush_count: 0,
        }
    }

    #[test]
    fn send_events_filters_by_subscription() {
        let conn = EventConnection::new(1, "com.test".into(), 10_000, 8);
        conn.add_subscription(1, sub());
        let batch = vec![data_event(1, false, 0), data_event(2, false, 1)];
        let dest = vec![None, None];
        conn.send_events(&batch, &dest, |_| false);
        assert_eq!(conn.socket_len(), 1);
    }

    #[test]
    fn wake_event_bumps_refcount_and_ack_clears_it() {
        let conn = EventConnection::new(1, "com.test".into(), 10_000, 8);
        conn.add_subscription(2, sub());
        let batch = vec![data_event(2, true, 0)];
        conn.send_events(&batch, &[None], |_| false);
        assert!(conn.needs_wakelock());
        conn.ack(1);
        assert!(!conn.needs_wakelock());
    }

    #[test]
    fn one_shot_fire_removes_subscription() {
        let conn = EventConnection::new(1, "com.test".into(), 10_000, 8);
        conn.add_subscription(3, sub());
        let batch = vec![data_event(3, false, 0)];
        let fired = conn.send_events(&batch, &[None], |h| h == 3);
        assert_eq!(fired, vec![3]);
        assert!(!conn.is_subscribed(3));
    }

    #[test]
    fn back_pressure_drops_oldest_non_wake_event() {
        let conn = EventConnection::new(1, "com.test".into(), 10_000, 2);
        conn.add_subscription(4, sub());
        let batch = vec![data_event(4, false, 0), data_event(4, false, 1), data_event(4, false, 2)];
        conn.send_events(&batch, &[None, None, None], |_| false);
        assert_eq!(conn.socket_len(), 2);
        let remaining = conn.drain_socket();
        assert_eq!(remaining[0].timestamp_ns, 1);
        assert_eq!(remaining[1].timestamp_ns, 2);
    }

    #[test]
    fn destroy_clears_subscriptions_and_returns_handles() {
        let conn = EventConnection::new(1, "com.test".into(), 10_000, 8);
        conn.add_subscription(5, sub());
        let handles = conn.destroy();
        assert_eq!(handles, vec![5]);
        assert!(!conn.is_subscribed(5));
    }
}
