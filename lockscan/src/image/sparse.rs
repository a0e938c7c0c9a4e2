//! In-memory image assembled from mapped byte regions
//!
//! Useful for captured fragments of kernel memory (a bucket array and the
//! records it leads to) and for building synthetic tables. Any byte outside a
//! mapped region faults, the same way an unmapped kernel page would.

use std::collections::BTreeMap;

use super::MemoryImage;
use crate::domain::{KernelAddr, ScanError};

#[derive(Debug, Default, Clone)]
pub struct SparseImage {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SparseImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `addr`, replacing any region that starts at the same address
    pub fn map(&mut self, addr: KernelAddr, bytes: Vec<u8>) -> &mut Self {
        self.regions.insert(addr.0, bytes);
        self
    }

    pub fn map_u64(&mut self, addr: KernelAddr, value: u64) -> &mut Self {
        self.map(addr, value.to_le_bytes().to_vec())
    }

    pub fn map_i32(&mut self, addr: KernelAddr, value: i32) -> &mut Self {
        self.map(addr, value.to_le_bytes().to_vec())
    }

    fn region_at(&self, addr: u64) -> Option<(u64, &[u8])> {
        let (&start, bytes) = self.regions.range(..=addr).next_back()?;
        let offset = addr - start;
        (offset < bytes.len() as u64).then_some((start, bytes.as_slice()))
    }
}

impl MemoryImage for SparseImage {
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError> {
        let len = buf.len();
        let mut done = 0;
        while done < len {
            let cur = addr
                .checked_add(done as u64)
                .ok_or_else(|| ScanError::fault(addr, len, "address range wraps"))?;
            let (start, bytes) = self
                .region_at(cur.0)
                .ok_or_else(|| ScanError::fault(addr, len, format!("{cur} is not mapped")))?;

            #[allow(clippy::cast_possible_truncation)]
            let offset = (cur.0 - start) as usize;
            let chunk = (bytes.len() - offset).min(len - done);
            buf[done..done + chunk].copy_from_slice(&bytes[offset..offset + chunk]);
            done += chunk;
        }
        Ok(())
    }
}
