//! Connection Holder (§3, §5): owns strong references to every live
//! connection and exposes them only through a snapshot-under-lock
//! primitive, so the dispatch hot path never holds the outer lock across
//! socket I/O (§9 "Per-entry locks vs one big lock").

use crate::connection::{ConnectionId, EventConnection};
use crate::direct::DirectConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct ConnectionHolder {
    next_id: AtomicU64,
    event_connections: Mutex<HashMap<ConnectionId, Arc<EventConnection>>>,
    direct_connections: Mutex<HashMap<ConnectionId, Arc<DirectConnection>>>,
}

impl ConnectionHolder {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            event_connections: Mutex::new(HashMap::new()),
            direct_connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert_event_connection(&self, conn: Arc<EventConnection>) {
        self.event_connections.lock().unwrap().insert(conn.id, conn);
    }

    pub fn remove_event_connection(&self, id: ConnectionId) -> Option<Arc<EventConnection>> {
        self.event_connections.lock().unwrap().remove(&id)
    }

    pub fn insert_direct_connection(&self, conn: Arc<DirectConnection>) {
        self.direct_connections.lock().unwrap().insert(conn.id, conn);
    }

    pub fn remove_direct_connection(&self, id: ConnectionId) -> Option<Arc<DirectConnection>> {
        self.direct_connections.lock().unwrap().remove(&id)
    }

    /// Promote every weak-by-convention entry to a strong, read-only
    /// snapshot. The outer lock is held only for the duration of the clone,
    /// not for iteration.
    pub fn snapshot_event_connections(&self) -> Vec<Arc<EventConnection>> {
        self.event_connections.lock().unwrap().values().cloned().collect()
    }

    pub fn snapshot_direct_connections(&self) -> Vec<Arc<DirectConnection>> {
        self.direct_connections.lock().unwrap().values().cloned().collect()
    }

    pub fn event_connection(&self, id: ConnectionId) -> Option<Arc<EventConnection>> {
        self.event_connections.lock().unwrap().get(&id).cloned()
    }

    pub fn any_connection_needs_wakelock(&self) -> bool {
        self.snapshot_event_connections().iter().any(|c| c.needs_wakelock())
    }

    pub fn force_reset_all_wakelocks(&self) {
        for conn in self.snapshot_event_connections() {
            conn.force_reset_wakelock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_inserted_connections() {
        let holder = ConnectionHolder::new();
        let id = holder.allocate_id();
        holder.insert_event_connection(Arc::new(EventConnection::new(id, "com.test".into(), 0, 8)));
        assert_eq!(holder.snapshot_event_connections().len(), 1);
        holder.remove_event_connection(id);
        assert!(holder.snapshot_event_connections().is_empty());
    }

    #[test]
    fn needs_wakelock_reflects_connection_refcounts() {
        let holder = ConnectionHolder::new();
        let id = holder.allocate_id();
        let conn = Arc::new(EventConnection::new(id, "com.test".into(), 0, 8));
        holder.insert_event_connection(conn.clone());
        assert!(!holder.any_connection_needs_wakelock());
        conn.replay_event(sensord_common::event::Event {
            version: 1,
            sensor_handle: 1,
            event_type: sensord_common::event::EventType::Data(sensord_common::sensor::SensorType::Proximity),
            timestamp_ns: 0,
            payload: sensord_common::event::Payload::Scalar(0.0),
            flags: sensord_common::event::EventFlags::WAKE_UP_SENSOR_EVENT_NEEDS_ACK,
        });
        assert!(holder.any_connection_needs_wakelock());
        holder.force_reset_all_wakelocks();
        assert!(!holder.any_connection_needs_wakelock());
    }
}
