//! Live kernel memory through `/dev/kmem`
//!
//! The device's file offset is the kernel virtual address, so a read is a
//! single positional read at `addr`. Addresses above `i64::MAX` become
//! negative `off_t` values; FreeBSD `pread` accepts those on character
//! devices.

use log::info;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use super::MemoryImage;
use crate::domain::{KernelAddr, ScanError};

/// Memory image backed by a kernel memory device
#[derive(Debug)]
pub struct KmemImage {
    file: File,
}

impl KmemImage {
    /// Open the device at `path` read-only
    ///
    /// # Errors
    /// [`ScanError::ImageUnavailable`] if the device cannot be opened, which
    /// on a live system almost always means missing privilege.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| ScanError::unavailable(path.display().to_string(), e))?;
        info!("Opened live kernel memory at {}", path.display());
        Ok(Self { file })
    }
}

impl MemoryImage for KmemImage {
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError> {
        let len = buf.len();
        self.file.read_exact_at(buf, addr.0).map_err(|e| {
            let reason = if e.kind() == io::ErrorKind::UnexpectedEof {
                "short read".to_string()
            } else {
                e.to_string()
            };
            ScanError::fault(addr, len, reason)
        })
    }
}
