//! Configuration loading (§5 "Configuration").
//!
//! Mirrors `evo_common::config::{ConfigLoader, SharedConfig}`: a blanket
//! `ConfigLoader` trait over any `DeserializeOwned` type, plus a
//! `ServiceConfig` that holds the knobs the rest of the crate family reads.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found")]
    FileNotFound,

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Default implementation works for any `DeserializeOwned` type; most
/// callers just derive `Deserialize` and use `ServiceConfig::load`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_socket_buffer_events() -> usize {
    crate::consts::DEFAULT_SOCKET_BUFFER_EVENTS
}

fn default_registration_ring_capacity() -> usize {
    crate::consts::DEFAULT_REGISTRATION_RING_CAPACITY
}

fn default_ack_timeout_ms() -> u64 {
    crate::consts::DEFAULT_ACK_TIMEOUT_MS
}

fn default_poll_batch_size() -> usize {
    64
}

fn default_service_dir() -> String {
    "/var/lib/sensord".to_string()
}

/// Top-level service configuration — loaded from `sensord.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory holding the persisted HMAC key and other service state (§4.9).
    #[serde(default = "default_service_dir")]
    pub service_dir: String,

    /// Capacity of each connection's bounded event queue (§3, §5).
    #[serde(default = "default_socket_buffer_events")]
    pub socket_buffer_events: usize,

    /// Capacity of the dynamic-sensor registration ring (§3).
    #[serde(default = "default_registration_ring_capacity")]
    pub registration_ring_capacity: usize,

    /// How long the wakelock arbitration waits for a client ack before
    /// force-resetting the refcount (§4.3, §4.6, §5).
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Maximum events read from the HAL per `poll` call in the dispatch loop (§4.2).
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: usize,

    /// Whether the automotive limited-axes IMU sensor family is exposed (§4.1 Non-goals).
    #[serde(default)]
    pub automotive_mode: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_dir: default_service_dir(),
            socket_buffer_events: default_socket_buffer_events(),
            registration_ring_capacity: default_registration_ring_capacity(),
            ack_timeout_ms: default_ack_timeout_ms(),
            poll_batch_size: default_poll_batch_size(),
            automotive_mode: false,
        }
    }
}

impl ServiceConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_buffer_events == 0 {
            return Err(ConfigError::ValidationError(
                "socket_buffer_events must be > 0".to_string(),
            ));
        }
        if self.registration_ring_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "registration_ring_capacity must be > 0".to_string(),
            ));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ack_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.poll_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "poll_batch_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn load_missing_file() {
        let result = ServiceConfig::load(Path::new("/nonexistent/sensord.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"automotive_mode = true"#).unwrap();
        file.flush().unwrap();

        let cfg = ServiceConfig::load(file.path()).unwrap();
        assert!(cfg.automotive_mode);
        assert_eq!(cfg.socket_buffer_events, default_socket_buffer_events());
    }

    #[test]
    fn rejects_zero_ack_timeout() {
        let mut cfg = ServiceConfig::default();
        cfg.ack_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
