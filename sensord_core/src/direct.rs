//! Direct Connection (§4.4): per-client state for a shared-memory channel.
//!
//! The two backup states (pause/resume vs. mic-cap) are independent
//! `RateBackup` instances from `sensord_shm::channel` so they compose
//! without disturbing each other, per §4.4's "each is independently
//! restorable".

use crate::connection::ConnectionId;
use sensord_common::consts::DEFAULT_DEVICE_ID;
use sensord_common::hal::{ChannelHandle, MemoryDescriptor, RateLevel};
use sensord_shm::channel::RateBackup;
use std::collections::HashMap;
use std::sync::Mutex;

fn rank(level: RateLevel) -> u8 {
    match level {
        RateLevel::StopDelivery => 0,
        RateLevel::Normal => 1,
        RateLevel::Fast => 2,
        RateLevel::VeryFast => 3,
    }
}

struct DirectConnectionInner {
    channel_handle: Option<ChannelHandle>,
    per_sensor_rate: HashMap<i32, RateLevel>,
    paused_backup: RateBackup,
    mic_cap_backup: RateBackup,
}

pub struct DirectConnection {
    pub id: ConnectionId,
    pub memory: MemoryDescriptor,
    pub device_id: i32,
    inner: Mutex<DirectConnectionInner>,
}

impl DirectConnection {
    pub fn new(id: ConnectionId, memory: MemoryDescriptor, device_id: i32) -> Self {
        Self {
            id,
            memory,
            device_id,
            inner: Mutex::new(DirectConnectionInner {
                channel_handle: None,
                per_sensor_rate: HashMap::new(),
                paused_backup: RateBackup::new(),
                mic_cap_backup: RateBackup::new(),
            }),
        }
    }

    pub fn is_hal_backed(&self) -> bool {
        self.device_id == DEFAULT_DEVICE_ID
    }

    pub fn set_channel_handle(&self, handle: ChannelHandle) {
        self.inner.lock().unwrap().channel_handle = Some(handle);
    }

    pub fn channel_handle(&self) -> Option<ChannelHandle> {
        self.inner.lock().unwrap().channel_handle
    }

    /// Record the rate the HAL (or runtime-sensor callback) was just told
    /// to apply for `handle`.
    pub fn record_rate(&self, handle: i32, rate: RateLevel) {
        self.inner.lock().unwrap().per_sensor_rate.insert(handle, rate);
    }

    pub fn current_rate(&self, handle: i32) -> Option<RateLevel> {
        self.inner.lock().unwrap().per_sensor_rate.get(&handle).copied()
    }

    pub fn configured_handles(&self) -> Vec<i32> {
        self.inner.lock().unwrap().per_sensor_rate.keys().copied().collect()
    }

    /// Back up every active rate and report the handles that must be
    /// zeroed on the HAL (§4.4 "Pause/resume discipline").
    pub fn pause(&self) -> Vec<i32> {
        let mut inner = self.inner.lock().unwrap();
        let handles: Vec<i32> = inner.per_sensor_rate.keys().copied().collect();
        for &handle in &handles {
            let rate = inner.per_sensor_rate[&handle];
            inner.paused_backup.save(handle, rate);
            inner.per_sensor_rate.insert(handle, RateLevel::StopDelivery);
        }
        handles
    }

    /// Restore rates backed up by `pause`, returning `(handle, rate)` pairs
    /// the caller must re-apply on the HAL.
    pub fn resume(&self) -> Vec<(i32, RateLevel)> {
        let mut inner = self.inner.lock().unwrap();
        let restored = inner.paused_backup.restore();
        for &(handle, rate) in &restored {
            inner.per_sensor_rate.insert(handle, rate);
        }
        restored
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused_backup.is_active()
    }

    /// Clamp every rate above `cap` down to it, saving originals (§4.4
    /// "Microphone-toggle capping is orthogonal").
    pub fn engage_mic_cap(&self, cap: RateLevel) -> Vec<(i32, RateLevel)> {
        let mut inner = self.inner.lock().unwrap();
        let mut changes = Vec::new();
        let handles: Vec<i32> = inner.per_sensor_rate.keys().copied().collect();
        for handle in handles {
            let current = inner.per_sensor_rate[&handle];
            if rank(current) > rank(cap) {
                inner.mic_cap_backup.save(handle, current);
                inner.per_sensor_rate.insert(handle, cap);
                changes.push((handle, cap));
            }
        }
        changes
    }

    pub fn release_mic_cap(&self) -> Vec<(i32, RateLevel)> {
        let mut inner = self.inner.lock().unwrap();
        let restored = inner.mic_cap_backup.restore();
        for &(handle, rate) in &restored {
            inner.per_sensor_rate.insert(handle, rate);
        }
        restored
    }

    pub fn is_mic_capped(&self) -> bool {
        self.inner.lock().unwrap().mic_cap_backup.is_active()
    }

    pub fn destroy(&self) -> Vec<i32> {
        let mut inner = self.inner.lock().unwrap();
        let handles: Vec<i32> = inner.per_sensor_rate.keys().copied().collect();
        inner.per_sensor_rate.clear();
        inner.channel_handle = None;
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> MemoryDescriptor {
        MemoryDescriptor { raw_fd: 3, size_bytes: 4096 }
    }

    #[test]
    fn pause_then_resume_restores_original_rates() {
        let dc = DirectConnection::new(1, mem(), DEFAULT_DEVICE_ID);
        dc.record_rate(10, RateLevel::Fast);
        dc.pause();
        assert_eq!(dc.current_rate(10), Some(RateLevel::StopDelivery));
        assert!(dc.is_paused());
        let restored = dc.resume();
        assert_eq!(restored, vec![(10, RateLevel::Fast)]);
        assert_eq!(dc.current_rate(10), Some(RateLevel::Fast));
        assert!(!dc.is_paused());
    }

    #[test]
    fn mic_cap_and_pause_backups_compose_independently() {
        let dc = DirectConnection::new(1, mem(), DEFAULT_DEVICE_ID);
        dc.record_rate(10, RateLevel::VeryFast);
        let capped = dc.engage_mic_cap(RateLevel::Normal);
        assert_eq!(capped, vec![(10, RateLevel::Normal)]);
        assert!(dc.is_mic_capped());

        dc.pause();
        assert_eq!(dc.current_rate(10), Some(RateLevel::StopDelivery));
        assert!(dc.is_paused());

        dc.resume();
        assert_eq!(dc.current_rate(10), Some(RateLevel::Normal), "mic cap must survive a pause/resume cycle");

        let restored = dc.release_mic_cap();
        assert_eq!(restored, vec![(10, RateLevel::VeryFast)]);
        assert_eq!(dc.current_rate(10), Some(RateLevel::VeryFast));
    }

    #[test]
    fn mic_cap_below_current_rate_is_a_noop() {
        let dc = DirectConnection::new(1, mem(), DEFAULT_DEVICE_ID);
        dc.record_rate(10, RateLevel::Normal);
        let capped = dc.engage_mic_cap(RateLevel::VeryFast);
        assert!(capped.is_empty());
        assert!(!dc.is_mic_capped());
    }
}
