//! Error kinds returned by the core (§7).

use thiserror::Error;

/// Error kinds returned by the core (§7).
///
/// `DeadObject` is never surfaced to a client call — it is handled
/// internally by the HAL reconnection protocol (§4.5, §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service still initializing")]
    NoInit,

    #[error("malformed request: {0}")]
    BadValue(String),

    #[error("precondition not met: {0}")]
    InvalidOperation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NameNotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("transient failure, caller may retry: {0}")]
    TransactionFailed(String),

    #[error("HAL dropped (internal only, never surfaced to clients)")]
    DeadObject,
}

/// Log-and-abort sink for a fatal internal inconsistency (§7, §9).
///
/// Used only for invariants the rest of the codebase treats as
/// unconditionally true (e.g. a sensor handle colliding with one already
/// live). Everything recoverable returns a [`ServiceError`] instead.
#[track_caller]
pub fn fatal(msg: impl AsRef<str>) -> ! {
    tracing::error!(location = %std::panic::Location::caller(), "fatal inconsistency: {}", msg.as_ref());
    std::process::abort()
}
