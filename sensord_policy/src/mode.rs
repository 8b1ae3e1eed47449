//! Operating mode state machine (§4.8).
//!
//! The machine only validates transitions and reports what the caller must
//! do about it; carrying out the HAL calls and pause/resume bookkeeping is
//! `sensord_core`'s job; this module owns only the legality of the state
//! change itself.

use sensord_common::error::ServiceError;

/// Whether this build permits the injection-replay modes at all (§4.8:
/// "Rejected in user-build images").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    User,
    Debug,
}

/// Top-level service posture (§3 "Operating Mode").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    Normal,
    Restricted { allowlist_prefix: String },
    DataInjection { allowlist: String },
    ReplayDataInjection { allowlist: String },
    HalBypassReplayInjection { allowlist: String },
}

impl OperatingMode {
    fn kind(&self) -> ModeKind {
        match self {
            Self::Normal => ModeKind::Normal,
            Self::Restricted { .. } => ModeKind::Restricted,
            Self::DataInjection { .. } => ModeKind::DataInjection,
            Self::ReplayDataInjection { .. } => ModeKind::ReplayDataInjection,
            Self::HalBypassReplayInjection { .. } => ModeKind::HalBypassReplayInjection,
        }
    }

    /// The allowlisted package, if this mode carries one.
    pub fn allowlist(&self) -> Option<&str> {
        match self {
            Self::Normal => None,
            Self::Restricted { allowlist_prefix } => Some(allowlist_prefix),
            Self::DataInjection { allowlist }
            | Self::ReplayDataInjection { allowlist }
            | Self::HalBypassReplayInjection { allowlist } => Some(allowlist),
        }
    }

    /// New event connections in `DataInjection` are allowed only for the
    /// allowlisted package (§4.8).
    pub fn allows_new_connection_from(&self, op_package: &str) -> bool {
        match self {
            Self::DataInjection { allowlist } => allowlist == op_package,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeKind {
    Normal,
    Restricted,
    DataInjection,
    ReplayDataInjection,
    HalBypassReplayInjection,
}

/// What the caller must do to carry out a validated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEffect {
    /// `Normal → Restricted`: disable all sensors on the HAL, pause every
    /// direct connection with backup.
    DisableAllPauseDirect,
    /// `Restricted → Normal`: re-enable all sensors, resume direct
    /// connections from backup.
    ReenableAllResumeDirect,
    /// `Normal → DataInjection`: `hal.set_mode(DataInjection)`; revert on failure.
    HalSetModeDataInjection,
    /// Entering `HalBypassReplayInjection`/`ReplayDataInjection`: mode
    /// changes without informing the HAL at all (§4.8).
    BypassHal,
    /// `*Injection → Normal`: `hal.set_mode(Normal)`, re-enable all sensors.
    HalSetModeNormalReenableAll,
}

/// Tracks the current operating mode and validates transitions (§4.8).
#[derive(Debug)]
pub struct OperatingModeMachine {
    current: OperatingMode,
}

impl Default for OperatingModeMachine {
    fn default() -> Self {
        Self {
            current: OperatingMode::Normal,
        }
    }
}

impl OperatingModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &OperatingMode {
        &self.current
    }

    /// Validate and apply a requested transition, returning the effect the
    /// caller must carry out (§4.8 table). Does not itself touch the HAL.
    pub fn transition(
        &mut self,
        to: OperatingMode,
        build: BuildType,
    ) -> Result<ModeEffect, ServiceError> {
        let from = self.current.kind();
        let target = to.kind();

        if matches!(
            target,
            ModeKind::ReplayDataInjection | ModeKind::HalBypassReplayInjection
        ) && build == BuildType::User
        {
            return Err(ServiceError::PermissionDenied(
                "replay/HAL-bypass injection modes are rejected in user-build images".to_string(),
            ));
        }

        let effect = match (from, target) {
            (ModeKind::Normal, ModeKind::Restricted) => ModeEffect::DisableAllPauseDirect,
            (ModeKind::Restricted, ModeKind::Normal) => ModeEffect::ReenableAllResumeDirect,
            (ModeKind::Normal, ModeKind::DataInjection) => ModeEffect::HalSetModeDataInjection,
            (ModeKind::Normal, ModeKind::ReplayDataInjection)
            | (ModeKind::Normal, ModeKind::HalBypassReplayInjection) => ModeEffect::BypassHal,
            (
                ModeKind::DataInjection | ModeKind::ReplayDataInjection | ModeKind::HalBypassReplayInjection,
                ModeKind::Normal,
            ) => ModeEffect::HalSetModeNormalReenableAll,
            _ => {
                return Err(ServiceError::InvalidOperation(format!(
                    "no transition from {from:?} to {target:?}"
                )))
            }
        };

        self.current = to;
        Ok(effect)
    }

    /// Revert to `Normal` after a HAL-side failure applying an injection
    /// mode (§4.8: "on failure revert").
    pub fn revert_to_normal(&mut self) {
        self.current = OperatingMode::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_to_restricted_and_back() {
        let mut m = OperatingModeMachine::new();
        let effect = m
            .transition(
                OperatingMode::Restricted {
                    allowlist_prefix: "com.example".into(),
                },
                BuildType::User,
            )
            .unwrap();
        assert_eq!(effect, ModeEffect::DisableAllPauseDirect);

        let effect = m.transition(OperatingMode::Normal, BuildType::User).unwrap();
        assert_eq!(effect, ModeEffect::ReenableAllResumeDirect);
    }

    #[test]
    fn data_injection_rejected_on_restricted_is_invalid() {
        let mut m = OperatingModeMachine::new();
        m.transition(
            OperatingMode::Restricted {
                allowlist_prefix: "x".into(),
            },
            BuildType::User,
        )
        .unwrap();

        let result = m.transition(
            OperatingMode::DataInjection {
                allowlist: "x".into(),
            },
            BuildType::User,
        );
        assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));
    }

    #[test]
    fn replay_injection_rejected_on_user_build() {
        let mut m = OperatingModeMachine::new();
        let result = m.transition(
            OperatingMode::ReplayDataInjection {
                allowlist: "x".into(),
            },
            BuildType::User,
        );
        assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));
    }

    #[test]
    fn replay_injection_allowed_on_debug_build() {
        let mut m = OperatingModeMachine::new();
        let effect = m
            .transition(
                OperatingMode::ReplayDataInjection {
                    allowlist: "x".into(),
                },
                BuildType::Debug,
            )
            .unwrap();
        assert_eq!(effect, ModeEffect::BypassHal);
    }

    #[test]
    fn new_connection_in_data_injection_requires_allowlisted_package() {
        let mode = OperatingMode::DataInjection {
            allowlist: "com.example.allowed".into(),
        };
        assert!(mode.allows_new_connection_from("com.example.allowed"));
        assert!(!mode.allows_new_connection_from("com.other"));
    }

    #[test]
    fn normal_mode_allows_any_new_connection() {
        assert!(OperatingMode::Normal.allows_new_connection_from("anything"));
    }
}
