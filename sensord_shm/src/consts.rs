//! Segment sizing and validation constants, mirroring `evo::shm::consts`.

/// Distinguishes a live segment from stray/garbage memory.
pub const SHM_MAGIC: u64 = 0x53_45_4e_53_4f_52_44_31; // "SENSORD1"

/// Smallest allowed segment (one page).
pub const SHM_MIN_SIZE: usize = 4096;

/// Largest allowed segment (1 GiB) — a sanity bound, not a real limit.
pub const SHM_MAX_SIZE: usize = 1024 * 1024 * 1024;

/// Cache line size assumed for header alignment.
pub const CACHE_LINE_SIZE: usize = 64;
