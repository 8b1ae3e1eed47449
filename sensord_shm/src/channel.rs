//! Rate backup bookkeeping shared by direct channels (§4.4).
//!
//! Pause/resume (restricted mode, UID-idle, sensor privacy) and the
//! microphone-toggle cap are two independent overrides of a channel's
//! per-sensor configured rate. Each is "independently restorable": backing
//! one up and later restoring it must not disturb the other. A small
//! save/restore map captures exactly that composition rule once so
//! `sensord_core`'s direct connection doesn't have to reinvent it per call
//! site.

use sensord_common::hal::RateLevel;
use std::collections::HashMap;

/// Snapshot of per-sensor rates taken before an override zeroes or caps them.
#[derive(Debug, Default, Clone)]
pub struct RateBackup {
    saved: HashMap<i32, RateLevel>,
}

impl RateBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.saved.is_empty()
    }

    /// Save `current` for `sensor_handle` if not already backed up.
    ///
    /// A second call for the same handle while the backup is still active
    /// is a no-op: the original pre-override rate must survive repeated
    /// overrides until restore.
    pub fn save(&mut self, sensor_handle: i32, current: RateLevel) {
        self.saved.entry(sensor_handle).or_insert(current);
    }

    /// Drain the backup, returning `(sensor_handle, rate)` pairs to restore.
    pub fn restore(&mut self) -> Vec<(i32, RateLevel)> {
        self.saved.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_save_keeps_first_value() {
        let mut backup = RateBackup::new();
        backup.save(1, RateLevel::Normal);
        backup.save(1, RateLevel::Fast);
        let restored = backup.restore();
        assert_eq!(restored, vec![(1, RateLevel::Normal)]);
    }

    #[test]
    fn independent_backups_compose() {
        let mut pause = RateBackup::new();
        let mut mic = RateBackup::new();
        pause.save(1, RateLevel::Normal);
        mic.save(1, RateLevel::Fast);

        // Restoring one leaves the other untouched.
        assert_eq!(pause.restore(), vec![(1, RateLevel::Normal)]);
        assert!(!pause.is_active());
        assert!(mic.is_active());
    }
}
