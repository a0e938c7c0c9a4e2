//! # Kernel Memory Images
//!
//! A memory image is a read-only view of a kernel's virtual address space:
//! the live kernel through `/dev/kmem` ([`KmemImage`]), an ELF core whose
//! `PT_LOAD` segments carry kernel virtual addresses such as Linux
//! `/proc/kcore` ([`ElfCoreImage`]), or fragments loaded into a
//! [`SparseImage`].
//!
//! ## Read Contract
//!
//! - A read returns exactly the requested number of bytes or fails with
//!   [`ScanError::ReadFault`]. Short reads are faults.
//! - Each read is a snapshot of that byte range only. The inspected kernel
//!   keeps running, so two reads may observe different generations of the
//!   same structure.
//! - Nothing is retried and nothing is cached.
//!
//! All multi-byte values are little-endian; the only supported record layout
//! is amd64.

pub mod elf_core;
pub mod kmem;
pub mod sparse;

pub use elf_core::ElfCoreImage;
pub use kmem::KmemImage;
pub use sparse::SparseImage;

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use crate::domain::{KernelAddr, ScanError};

/// How an image path is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Character device addressed by kernel virtual address (`/dev/kmem`)
    KernelMemoryDevice,
    /// ELF core file with virtual addresses in its program headers
    ElfCore,
}

impl ImageFormat {
    /// Character devices are read as kernel memory, everything else as ELF
    #[must_use]
    pub fn detect(path: &Path) -> ImageFormat {
        match fs::metadata(path) {
            Ok(meta) if meta.file_type().is_char_device() => ImageFormat::KernelMemoryDevice,
            _ => ImageFormat::ElfCore,
        }
    }
}

/// Open `path` with the reader its file type calls for
///
/// # Errors
/// [`ScanError::ImageUnavailable`] if the image cannot be opened.
pub fn open(path: &Path) -> Result<Box<dyn MemoryImage>, ScanError> {
    Ok(match ImageFormat::detect(path) {
        ImageFormat::KernelMemoryDevice => Box::new(KmemImage::open(path)?),
        ImageFormat::ElfCore => Box::new(ElfCoreImage::open(path)?),
    })
}

/// Bounded random-access reads from a kernel address space
pub trait MemoryImage {
    /// Fill `buf` with the bytes at `addr`
    ///
    /// # Errors
    /// [`ScanError::ReadFault`] if any byte of the range is unreadable.
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError>;

    /// Read `size` bytes at `addr`
    ///
    /// # Errors
    /// [`ScanError::ReadFault`] if any byte of the range is unreadable.
    fn read(&self, addr: KernelAddr, size: usize) -> Result<Vec<u8>, ScanError> {
        let mut buf = vec![0u8; size];
        self.read_into(addr, &mut buf)?;
        Ok(buf)
    }

    /// Read a kernel pointer
    ///
    /// # Errors
    /// [`ScanError::ReadFault`] if the 8 bytes are unreadable.
    fn read_u64(&self, addr: KernelAddr) -> Result<u64, ScanError> {
        let mut buf = [0u8; 8];
        self.read_into(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a kernel `int`
    ///
    /// # Errors
    /// [`ScanError::ReadFault`] if the 4 bytes are unreadable.
    fn read_i32(&self, addr: KernelAddr) -> Result<i32, ScanError> {
        let mut buf = [0u8; 4];
        self.read_into(addr, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}

impl<I: MemoryImage + ?Sized> MemoryImage for &I {
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError> {
        (**self).read_into(addr, buf)
    }
}

impl<I: MemoryImage + ?Sized> MemoryImage for Box<I> {
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError> {
        (**self).read_into(addr, buf)
    }
}
