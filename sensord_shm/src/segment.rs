//! Memory-mapped segment backing one direct channel.
//!
//! Grounded on `evo_shared_memory::segment::{SegmentHeader, SharedMemorySegment}`:
//! a cache-line-aligned header carrying a seqlock version plus reader/writer
//! bookkeeping, followed by a flat data region the caller addresses as a
//! ring of fixed-size wire records.

use crate::consts::{CACHE_LINE_SIZE, SHM_MAGIC, SHM_MAX_SIZE, SHM_MIN_SIZE};
use crate::error::{ShmError, ShmResult};
use crate::version::VersionCounter;
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Segment header written at the start of every direct-channel mapping.
#[repr(C, align(64))]
pub struct SegmentHeader {
    pub magic: u64,
    pub version: VersionCounter,
    pub writer_pid: AtomicU32,
    pub size: u64,
    pub created_ts: u64,
    _padding: [u8; 32],
}

impl SegmentHeader {
    pub fn new(size: usize, writer_pid: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        Self {
            magic: SHM_MAGIC,
            version: VersionCounter::new(),
            writer_pid: AtomicU32::new(writer_pid),
            size: size as u64,
            created_ts: now,
            _padding: [0; 32],
        }
    }

    pub fn validate(&self) -> ShmResult<()> {
        if self.magic != SHM_MAGIC {
            return Err(ShmError::BadMagic {
                expected: SHM_MAGIC,
                found: self.magic,
            });
        }
        Ok(())
    }
}

/// A writable shared-memory segment: header plus a flat data region.
pub struct SharedMemorySegment {
    pub data_size: usize,
    mmap: MmapMut,
}

impl SharedMemorySegment {
    pub fn new(data_size: usize, writer_pid: u32, mut mmap: MmapMut) -> ShmResult<Self> {
        validate_segment_size(data_size)?;
        validate_alignment(mmap.as_ptr() as usize)?;

        let header = SegmentHeader::new(data_size, writer_pid);
        unsafe {
            (mmap.as_mut_ptr() as *mut SegmentHeader).write(header);
        }

        Ok(Self { data_size, mmap })
    }

    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    pub fn data(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.mmap.as_ptr().add(std::mem::size_of::<SegmentHeader>()),
                self.data_size,
            )
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.mmap
                    .as_mut_ptr()
                    .add(std::mem::size_of::<SegmentHeader>()),
                self.data_size,
            )
        }
    }

    /// Write one wire record at `slot` under the seqlock (§4.4).
    pub fn write_slot(&mut self, slot: usize, record: &[u8]) {
        let header = unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) };
        header.version.begin_write();
        let offset = slot * record.len();
        self.data_mut()[offset..offset + record.len()].copy_from_slice(record);
        header.version.end_write();
    }
}

pub fn validate_segment_size(size: usize) -> ShmResult<()> {
    if size < SHM_MIN_SIZE || size > SHM_MAX_SIZE || size % SHM_MIN_SIZE != 0 {
        return Err(ShmError::InvalidSize {
            size,
            min: SHM_MIN_SIZE,
            max: SHM_MAX_SIZE,
        });
    }
    Ok(())
}

pub fn validate_alignment(address: usize) -> ShmResult<()> {
    if address % CACHE_LINE_SIZE != 0 {
        return Err(ShmError::AlignmentError {
            address,
            alignment: CACHE_LINE_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memmap2::MmapOptions;

    fn anon_mmap(size: usize) -> MmapMut {
        MmapOptions::new().len(size).map_anon().unwrap()
    }

    #[test]
    fn rejects_too_small_segment() {
        assert!(validate_segment_size(1024).is_err());
    }

    #[test]
    fn rejects_unaligned_segment() {
        assert!(validate_segment_size(4097).is_err());
    }

    #[test]
    fn header_round_trips_magic() {
        let mmap = anon_mmap(SHM_MIN_SIZE);
        let seg = SharedMemorySegment::new(SHM_MIN_SIZE - std::mem::size_of::<SegmentHeader>(), 1, mmap).unwrap();
        assert!(seg.header().validate().is_ok());
    }
}
