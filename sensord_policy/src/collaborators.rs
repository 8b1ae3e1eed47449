//! Platform collaborators the access-policy layer depends on but does not
//! own (§6 "Privacy manager collaborator", "Package manager collaborator").
//!
//! Real platform integration is out of scope; these traits exist so the
//! core can be driven by a simple in-memory stand-in in tests and the
//! reference binary, the same way `sensord_common::hal::HalDriver` keeps
//! the dispatch loop independent of any concrete driver.

/// System-wide sensor-privacy broadcaster.
pub trait PrivacyManager: Send + Sync {
    fn is_sensor_privacy_enabled(&self) -> bool;
    fn add_listener(&self, listener_id: u64);
    fn remove_listener(&self, listener_id: u64);
}

/// Per-package metadata the access policy consults (§4.7).
pub trait PackageManager: Send + Sync {
    fn get_package_uid(&self, package: &str, user_id: i32) -> Option<i32>;
    fn get_target_sdk_version(&self, package: &str) -> Option<u32>;
    fn has_system_feature(&self, name: &str) -> bool;
    fn is_package_debuggable(&self, package: &str) -> bool;
}

/// In-memory `PrivacyManager` backed by the same `SensorPrivacy` flag the
/// engine already carries; listener ids are tracked but never notified —
/// there is no real IPC broadcaster to notify in this build.
#[derive(Debug, Default)]
pub struct InMemoryPrivacyManager {
    enabled: std::sync::atomic::AtomicBool,
    listeners: std::sync::Mutex<std::collections::HashSet<u64>>,
}

impl InMemoryPrivacyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, std::sync::atomic::Ordering::SeqCst);
    }
}

impl PrivacyManager for InMemoryPrivacyManager {
    fn is_sensor_privacy_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn add_listener(&self, listener_id: u64) {
        self.listeners.lock().unwrap().insert(listener_id);
    }

    fn remove_listener(&self, listener_id: u64) {
        self.listeners.lock().unwrap().remove(&listener_id);
    }
}

/// In-memory `PackageManager` populated by the shell command surface and
/// tests; a real build would back this with the platform's package service.
#[derive(Debug, Default)]
pub struct InMemoryPackageManager {
    packages: std::sync::Mutex<std::collections::HashMap<String, PackageRecord>>,
}

#[derive(Debug, Clone)]
struct PackageRecord {
    uid: i32,
    target_sdk: u32,
    debuggable: bool,
}

impl InMemoryPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, package: impl Into<String>, uid: i32, target_sdk: u32, debuggable: bool) {
        self.packages.lock().unwrap().insert(
            package.into(),
            PackageRecord { uid, target_sdk, debuggable },
        );
    }
}

impl PackageManager for InMemoryPackageManager {
    fn get_package_uid(&self, package: &str, _user_id: i32) -> Option<i32> {
        self.packages.lock().unwrap().get(package).map(|r| r.uid)
    }

    fn get_target_sdk_version(&self, package: &str) -> Option<u32> {
        self.packages.lock().unwrap().get(package).map(|r| r.target_sdk)
    }

    fn has_system_feature(&self, _name: &str) -> bool {
        false
    }

    fn is_package_debuggable(&self, package: &str) -> bool {
        self.packages
            .lock()
            .unwrap()
            .get(package)
            .map(|r| r.debuggable)
            .unwrap_or(false)
    }
}
