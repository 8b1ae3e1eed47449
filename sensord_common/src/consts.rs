//! System-wide constants for the sensor service.
//!
//! Mirrors `evo_common::consts`: a single place for the magic numbers that
//! show up across crates, so a reviewer finds one definition instead of N
//! copies.

/// First handle of the runtime-sensor handle range (§3: "runtime sensors
/// from `[RUNTIME_BASE, RUNTIME_END)` allocated sequentially").
pub const RUNTIME_SENSOR_HANDLE_BASE: i32 = 0x3f00_0000;

/// One past the last handle of the runtime-sensor handle range.
pub const RUNTIME_SENSOR_HANDLE_END: i32 = 0x3fff_ffff;

/// First handle of the synthesized virtual-sensor handle range (§4.1).
pub const VIRTUAL_SENSOR_HANDLE_BASE: i32 = 0x2f00_0000;

/// One past the last handle of the virtual-sensor handle range.
pub const VIRTUAL_SENSOR_HANDLE_END: i32 = 0x2fff_ffff;

/// Device id used for platform (non-runtime, non-dynamic-plugin) sensors.
pub const DEFAULT_DEVICE_ID: i32 = 0;

/// Default bounded-ring capacity for the registration ring (§3).
pub const DEFAULT_REGISTRATION_RING_CAPACITY: usize = 256;

/// Default ack-receiver timeout before refcounts are force-reset (§4.3, §4.6, §5).
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Default per-connection socket (bounded queue) capacity.
pub const DEFAULT_SOCKET_BUFFER_EVENTS: usize = 128;

/// Name of the single system wakelock (§4.6).
pub const WAKELOCK_NAME: &str = "SensorService_wakelock";

/// Persisted HMAC key length in bytes (§3, §4.9).
pub const HMAC_KEY_LEN: usize = 128;

/// uuid all-zeros sentinel: `id_from_uuid` returns 0 (§4.9).
pub const UUID_ZERO: [u8; 16] = [0u8; 16];

/// uuid all-ones sentinel: `id_from_uuid` returns -1 ("identify by type+name") (§4.9).
pub const UUID_ONES: [u8; 16] = [0xffu8; 16];
