//! System wakelock arbitration (§4.6) and the ack-receiver recovery thread.

use crate::connection::ConnectionId;
use crate::holder::ConnectionHolder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// The single cross-client suspend-blocker (§4.6). Acquisition is
/// idempotent: acquiring an already-held lock is a no-op.
pub struct SystemWakelock {
    name: String,
    held: AtomicBool,
}

impl SystemWakelock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this call transitioned released → held.
    pub fn acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns true if this call transitioned held → released.
    pub fn release(&self) -> bool {
        self.held
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Message delivered by a client acknowledging delivered wake-up events.
#[derive(Debug, Clone, Copy)]
pub struct AckMessage {
    pub connection_id: ConnectionId,
    pub count: u32,
}

/// Run the ack-receiver loop until `shutdown` is set or the channel
/// disconnects (§4.3, §4.6, §5). On a full timeout with no ack received,
/// every connection's refcount is force-reset and the wakelock released —
/// the last-resort recovery for a wedged client.
pub fn run_ack_receiver(
    rx: Receiver<AckMessage>,
    holder: Arc<ConnectionHolder>,
    wakelock: Arc<SystemWakelock>,
    timeout: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match rx.recv_timeout(timeout) {
            Ok(msg) => {
                if let Some(conn) = holder.event_connection(msg.connection_id) {
                    conn.ack(msg.count);
                }
                if !holder.any_connection_needs_wakelock() {
                    wakelock.release();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if wakelock.is_held() {
                    tracing::warn!(
                        wakelock = wakelock.name(),
                        "ack-receiver timeout elapsed, force-resetting all wakelock refcounts"
                    );
                    holder.force_reset_all_wakelocks();
                    wakelock.release();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::EventConnection;
    use sensord_common::event::{Event, EventFlags, EventType, Payload};
    use sensord_common::sensor::SensorType;
    use std::sync::mpsc;

    #[test]
    fn acquire_and_release_are_idempotent() {
        let lock = SystemWakelock::new("test_wakelock");
        assert!(lock.acquire());
        assert!(!lock.acquire());
        assert!(lock.is_held());
        assert!(lock.release());
        assert!(!lock.release());
    }

    #[test]
    fn ack_receiver_releases_once_all_connections_are_satisfied() {
        let holder = Arc::new(ConnectionHolder::new());
        let wakelock = Arc::new(SystemWakelock::new("test_wakelock"));
        let conn = Arc::new(EventConnection::new(1, "com.test".into(), 0, 8));
        holder.insert_event_connection(conn.clone());
        conn.replay_event(Event {
            version: 1,
            sensor_handle: 9,
            event_type: EventType::Data(SensorType::Proximity),
            timestamp_ns: 0,
            payload: Payload::Scalar(0.0),
            flags: EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK,
        });
        wakelock.acquire();

        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let holder2 = holder.clone();
        let wakelock2 = wakelock.clone();
        let shutdown2 = shutdown.clone();
        let handle = std::thread::spawn(move || {
            run_ack_receiver(rx, holder2, wakelock2, Duration::from_millis(50), shutdown2);
        });

        tx.send(AckMessage { connection_id: 1, count: 1 }).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!wakelock.is_held());
        shutdown.store(true, Ordering::SeqCst);
        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn ack_receiver_timeout_force_resets_refcounts() {
        let holder = Arc::new(ConnectionHolder::new());
        let wakelock = Arc::new(SystemWakelock::new("test_wakelock"));
        let conn = Arc::new(EventConnection::new(1, "com.test".into(), 0, 8));
        holder.insert_event_connection(conn.clone());
        conn.replay_event(Event {
            version: 1,
            sensor_handle: 9,
            event_type: EventType::Data(SensorType::Proximity),
            timestamp_ns: 0,
            payload: Payload::Scalar(0.0),
            flags: EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK,
        });
        wakelock.acquire();

        let (_tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let holder2 = holder.clone();
        let wakelock2 = wakelock.clone();
        let shutdown2 = shutdown.clone();
        let handle = std::thread::spawn(move || {
            run_ack_receiver(rx, holder2, wakelock2, Duration::from_millis(20), shutdown2);
        });

        std::thread::sleep(Duration::from_millis(60));
        assert!(!wakelock.is_held());
        assert!(!conn.needs_wakelock());
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
