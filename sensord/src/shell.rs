//! Shell command dispatch (§6 "Shell command surface").
//!
//! Each handler returns the text to print and an exit code (0 success,
//! non-zero on parse or permission failure), independent of `clap` so the
//! logic here is testable without going through argument parsing.

use crate::cli::{Command, UidStateArg};
use crate::dump_format::{dump_binary, dump_text};
use sensord_core::SensorService;
use sensord_policy::collaborators::PackageManager;
use sensord_policy::InMemoryPackageManager;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Test-override for the head-tracker UID restriction (§4.7 step 1,
/// `restrict-ht`/`unrestrict-ht`). Binder IPC marshalling is out of scope
/// (§1), so there is no real per-request `CallerContext` assembly in this
/// binary to wire this into; it is exposed here for whatever does build one.
pub static HEAD_TRACKER_RESTRICTION_LIFTED: AtomicBool = AtomicBool::new(false);

pub struct ShellOutcome {
    pub text: String,
    pub exit_code: i32,
}

impl ShellOutcome {
    fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), exit_code: 0 }
    }

    fn err(text: impl Into<String>) -> Self {
        Self { text: text.into(), exit_code: 1 }
    }
}

/// `MANAGE_SENSORS` gate for the command endpoint (§6). Every handler in
/// this module assumes the caller already holds it; `run` is the one place
/// that checks.
pub fn run(
    service: &SensorService,
    packages: &InMemoryPackageManager,
    has_manage_sensors: bool,
    command: Command,
) -> ShellOutcome {
    if !has_manage_sensors {
        return ShellOutcome::err("permission denied: MANAGE_SENSORS required");
    }

    match command {
        Command::SetUidState { package, state, user } => set_uid_state(service, packages, &package, state, user),
        Command::ResetUidState { package, user } => reset_uid_state(service, packages, &package, user),
        Command::GetUidState { package, user } => get_uid_state(service, packages, &package, user),
        Command::RestrictHt => {
            HEAD_TRACKER_RESTRICTION_LIFTED.store(false, Ordering::SeqCst);
            ShellOutcome::ok("head-tracker restriction: enforced")
        }
        Command::UnrestrictHt => {
            HEAD_TRACKER_RESTRICTION_LIFTED.store(true, Ordering::SeqCst);
            ShellOutcome::ok("head-tracker restriction: lifted")
        }
        Command::Dump { proto, privileged } => {
            let snapshot = service.dump_snapshot(privileged);
            if proto {
                match dump_binary(&snapshot) {
                    Ok(bytes) => ShellOutcome::ok(format!("{} bytes of bincode-encoded dump", bytes.len())),
                    Err(err) => ShellOutcome::err(format!("failed to encode dump: {err}")),
                }
            } else {
                ShellOutcome::ok(dump_text(&snapshot))
            }
        }
    }
}

/// Next synthetic UID handed to a package seen for the first time. Real
/// platform integration resolves UIDs through the package manager directly;
/// this binary has no such service to ask, so `InMemoryPackageManager` is
/// seeded lazily and remembers what it hands out.
static NEXT_SYNTHETIC_UID: AtomicI32 = AtomicI32::new(10_000);

/// Resolve `package`'s UID via the package-manager collaborator (§6),
/// registering it with a freshly allocated UID the first time it is seen.
fn resolve_uid(packages: &InMemoryPackageManager, package: &str, user: Option<u32>) -> i32 {
    let user_id = user.unwrap_or(0) as i32;
    if let Some(uid) = packages.get_package_uid(package, user_id) {
        return uid;
    }
    let uid = NEXT_SYNTHETIC_UID.fetch_add(1, Ordering::SeqCst);
    packages.register(package, uid, 34, false);
    uid
}

fn set_uid_state(
    service: &SensorService,
    packages: &InMemoryPackageManager,
    package: &str,
    state: UidStateArg,
    user: Option<u32>,
) -> ShellOutcome {
    let uid = resolve_uid(packages, package, user);
    let active = state == UidStateArg::Active;
    service.uid_state_mut(|s| s.set_uid_state(uid, active));
    ShellOutcome::ok(format!("{package} (uid {uid}) set {:?}", state))
}

fn reset_uid_state(
    service: &SensorService,
    packages: &InMemoryPackageManager,
    package: &str,
    user: Option<u32>,
) -> ShellOutcome {
    let uid = resolve_uid(packages, package, user);
    service.uid_state_mut(|s| s.reset_uid_state(uid));
    ShellOutcome::ok(format!("{package} (uid {uid}) uid-state override cleared"))
}

fn get_uid_state(
    service: &SensorService,
    packages: &InMemoryPackageManager,
    package: &str,
    user: Option<u32>,
) -> ShellOutcome {
    let uid = resolve_uid(packages, package, user);
    let mut active = false;
    service.uid_state_mut(|s| active = s.is_active(uid));
    ShellOutcome::ok(format!("{package} (uid {uid}): {}", if active { "active" } else { "idle" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensord_common::consts::HMAC_KEY_LEN;
    use sensord_common::hal::SimulatedHal;
    use sensord_identity::IdentityModule;
    use sensord_policy::mode::BuildType;

    fn service() -> SensorService {
        let hal = SimulatedHal::new(Vec::new());
        let identity = IdentityModule::new([0u8; HMAC_KEY_LEN]);
        SensorService::new(Box::new(hal), identity, BuildType::Debug, false, 8, 16).unwrap()
    }

    #[test]
    fn missing_permission_is_rejected() {
        let s = service();
        let packages = InMemoryPackageManager::new();
        let outcome = run(&s, &packages, false, Command::RestrictHt);
        assert_eq!(outcome.exit_code, 1);
    }

    #[test]
    fn set_then_get_uid_state_round_trips() {
        let s = service();
        let packages = InMemoryPackageManager::new();
        let set = run(
            &s,
            &packages,
            true,
            Command::SetUidState { package: "com.example".into(), state: UidStateArg::Active, user: None },
        );
        assert_eq!(set.exit_code, 0);

        let get = run(&s, &packages, true, Command::GetUidState { package: "com.example".into(), user: None });
        assert!(get.text.contains("active"));
    }

    #[test]
    fn reset_restores_default_idle() {
        let s = service();
        let packages = InMemoryPackageManager::new();
        run(
            &s,
            &packages,
            true,
            Command::SetUidState { package: "com.example".into(), state: UidStateArg::Active, user: None },
        );
        run(&s, &packages, true, Command::ResetUidState { package: "com.example".into(), user: None });
        let get = run(&s, &packages, true, Command::GetUidState { package: "com.example".into(), user: None });
        assert!(get.text.contains("idle"));
    }

    #[test]
    fn repeated_lookups_reuse_the_same_synthetic_uid() {
        let s = service();
        let packages = InMemoryPackageManager::new();
        run(
            &s,
            &packages,
            true,
            Command::SetUidState { package: "com.example".into(), state: UidStateArg::Active, user: None },
        );
        let first = run(&s, &packages, true, Command::GetUidState { package: "com.example".into(), user: None });
        let second = run(&s, &packages, true, Command::GetUidState { package: "com.example".into(), user: None });
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn dump_text_lists_no_sensors_for_empty_hal() {
        let s = service();
        let packages = InMemoryPackageManager::new();
        let outcome = run(&s, &packages, true, Command::Dump { proto: false, privileged: true });
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.text.contains("sensors:"));
    }
}
