//! Errors for shared-memory segment and direct-channel operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("invalid segment size: {size} bytes (must be {min}-{max}, page-aligned)")]
    InvalidSize {
        size: usize,
        min: usize,
        max: usize,
    },

    #[error("segment magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u64, found: u64 },

    #[error("memory alignment error: address {address:#x} not aligned to {alignment}")]
    AlignmentError { address: usize, alignment: usize },

    #[error("direct channel ring is full")]
    RingFull,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type ShmResult<T> = Result<T, ShmError>;
