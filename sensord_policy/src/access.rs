//! Permission and rate-cap access policy (§4.7).

use crate::uid::SYSTEM_UID;
use sensord_common::error::ServiceError;
use sensord_common::sensor::{Sensor, SensorType};

/// UID reserved for the platform's audio server; head-tracker sensors are
/// additionally visible to it (§4.7 step 1).
pub const AUDIOSERVER_UID: i32 = 1041;

/// Target SDK at/below which the legacy step-sensor exemption applies (§4.7 step 4).
pub const LEGACY_STEP_SDK_CEILING: u32 = 28; // Android P

/// Target SDK at/above which the high-sampling-rate permission is required (§4.7).
pub const HIGH_RATE_PERMISSION_FLOOR_SDK: u32 = 31; // Android S

/// Sampling period floor (200Hz) enforced on apps without the high-sampling-rate
/// permission, and independently by the microphone-toggle cap (§4.7).
pub const RATE_CAPPED_PERIOD_NS: i64 = 5_000_000;

/// Everything `can_access` / the rate-cap checks need about the caller.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub uid: i32,
    pub op_package: String,
    pub has_required_permission: bool,
    /// `None` when the sensor declares no app-op; `Some(allowed)` otherwise.
    pub app_op_allowed: Option<bool>,
    pub target_sdk: u32,
    pub is_debuggable: bool,
    pub has_high_sampling_rate_permission: bool,
    /// Test override lifting the head-tracker UID restriction (§4.7 step 1).
    pub head_tracker_restriction_lifted: bool,
}

fn is_legacy_step_sensor(sensor_type: SensorType) -> bool {
    matches!(sensor_type, SensorType::StepCounter | SensorType::StepDetector)
}

/// `can_access(sensor, op_package) → bool` (§4.7).
pub fn can_access(sensor: &Sensor, caller: &CallerContext) -> bool {
    if sensor.sensor_type == SensorType::HeadTracker
        && caller.uid != SYSTEM_UID
        && caller.uid != AUDIOSERVER_UID
        && !caller.head_tracker_restriction_lifted
    {
        return false;
    }

    if sensor.required_permission.is_none() {
        return true;
    }

    if caller.uid == SYSTEM_UID {
        return true;
    }

    if is_legacy_step_sensor(sensor.sensor_type) && caller.target_sdk <= LEGACY_STEP_SDK_CEILING {
        return true;
    }

    caller.has_required_permission && caller.app_op_allowed.unwrap_or(true)
}

/// Whether `caller`'s effective sampling rate should be capped (§4.7).
pub fn is_rate_capped_by_permission(caller: &CallerContext) -> bool {
    if caller.has_high_sampling_rate_permission {
        return false;
    }
    caller.target_sdk >= HIGH_RATE_PERMISSION_FLOOR_SDK
}

/// Raise `period_ns` to `cap_ns` if it requests a faster rate than allowed.
///
/// A debuggable package gets `PermissionDenied` instead of a silent clamp,
/// surfacing the misuse during development; other packages are clamped
/// without complaint (§4.7).
fn clamp_to_cap(period_ns: i64, cap_ns: i64, is_debuggable: bool) -> Result<i64, ServiceError> {
    if period_ns >= cap_ns {
        return Ok(period_ns);
    }
    if is_debuggable {
        return Err(ServiceError::PermissionDenied(format!(
            "requested period {period_ns}ns is below the {cap_ns}ns rate cap"
        )));
    }
    Ok(cap_ns)
}

/// `adjust_sampling_period(period_ns, op_package)` (§4.7): applies the
/// permission-based rate cap, then the identical microphone-toggle cap.
pub fn adjust_sampling_period(
    period_ns: i64,
    caller: &CallerContext,
    mic_toggle_engaged: bool,
) -> Result<i64, ServiceError> {
    let mut period = period_ns;

    if is_rate_capped_by_permission(caller) {
        period = clamp_to_cap(period, RATE_CAPPED_PERIOD_NS, caller.is_debuggable)?;
    }

    if mic_toggle_engaged {
        period = clamp_to_cap(period, RATE_CAPPED_PERIOD_NS, caller.is_debuggable)?;
    }

    Ok(period)
}
