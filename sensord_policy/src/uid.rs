//! UID-active set, sensor privacy, and the microphone-toggle cap (§4.7, §5).
//!
//! Owned behind the same outer lock as the registry in `sensord_core`; this
//! module only holds the data and the small predicates over it, so it can
//! be unit tested without any dispatch-loop machinery.

use std::collections::HashSet;

/// UID reserved for the service itself and trusted system components (§4.7 step 3).
pub const SYSTEM_UID: i32 = 1000;

/// Tracks which UIDs are currently foreground/active, plus test overrides
/// that force a UID active or inactive regardless of the real signal.
#[derive(Debug, Default)]
pub struct UidState {
    active: HashSet<i32>,
    forced_active: HashSet<i32>,
    forced_inactive: HashSet<i32>,
}

impl UidState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_uid_state(&mut self, uid: i32, active: bool) {
        if active {
            self.active.insert(uid);
        } else {
            self.active.remove(&uid);
        }
    }

    pub fn reset_uid_state(&mut self, uid: i32) {
        self.forced_active.remove(&uid);
        self.forced_inactive.remove(&uid);
    }

    pub fn force_active(&mut self, uid: i32) {
        self.forced_inactive.remove(&uid);
        self.forced_active.insert(uid);
    }

    pub fn force_inactive(&mut self, uid: i32) {
        self.forced_active.remove(&uid);
        self.forced_inactive.insert(uid);
    }

    /// Effective active state, honoring any test override.
    pub fn is_active(&self, uid: i32) -> bool {
        if self.forced_active.contains(&uid) {
            return true;
        }
        if self.forced_inactive.contains(&uid) {
            return false;
        }
        self.active.contains(&uid)
    }
}

/// System-wide sensor-privacy toggle: when on, non-system subscribers are
/// paused regardless of UID state (§4.4).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SensorPrivacy(bool);

impl SensorPrivacy {
    pub fn enabled(&self) -> bool {
        self.0
    }

    pub fn set(&mut self, enabled: bool) {
        self.0 = enabled;
    }
}

/// Microphone-toggle rate cap: while engaged, direct-channel rates above
/// the cap are reduced (§4.4, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicToggle {
    engaged: bool,
}

impl Default for MicToggle {
    fn default() -> Self {
        Self { engaged: false }
    }
}

impl MicToggle {
    pub fn engaged(&self) -> bool {
        self.engaged
    }

    pub fn set(&mut self, engaged: bool) {
        self.engaged = engaged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_active_wins_over_real_state() {
        let mut s = UidState::new();
        s.set_uid_state(42, false);
        s.force_active(42);
        assert!(s.is_active(42));
    }

    #[test]
    fn forced_inactive_wins_over_real_state() {
        let mut s = UidState::new();
        s.set_uid_state(42, true);
        s.force_inactive(42);
        assert!(!s.is_active(42));
    }

    #[test]
    fn reset_restores_real_state() {
        let mut s = UidState::new();
        s.set_uid_state(42, true);
        s.force_inactive(42);
        s.reset_uid_state(42);
        assert!(s.is_active(42));
    }

    #[test]
    fn absent_uid_defaults_inactive() {
        let s = UidState::new();
        assert!(!s.is_active(7));
    }
}
