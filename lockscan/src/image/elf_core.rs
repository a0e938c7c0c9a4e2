//! ELF core images with kernel virtual addresses in `p_vaddr` (`/proc/kcore`)
//!
//! Only the ELF header and program headers are parsed up front. Each
//! `PT_LOAD` segment maps a virtual address range onto a range of file
//! offsets; reads translate the kernel address and use positional reads, so
//! the (possibly huge, possibly live) file is never loaded whole.

use log::{info, warn};
use object::elf::{FileHeader64, ET_CORE, PT_LOAD};
use object::read::elf::{FileHeader, ProgramHeader};
use object::{Endian, Endianness};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use super::MemoryImage;
use crate::domain::{KernelAddr, ScanError};

/// Size of an ELF64 file header
const ELF64_HEADER_SIZE: usize = 64;

/// Upper bound on the program header table we are willing to load
const MAX_PHDR_TABLE: u64 = 16 * 1024 * 1024;

/// One file-backed virtual address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub vaddr: u64,
    pub file_offset: u64,
    pub len: u64,
}

impl Segment {
    fn end(&self) -> u64 {
        self.vaddr.saturating_add(self.len)
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.vaddr && addr < self.end()
    }
}

/// Sorted, lookup-ready set of segments
#[derive(Debug, Default)]
pub struct SegmentMap {
    segments: Vec<Segment>,
}

impl SegmentMap {
    #[must_use]
    pub fn new(mut segments: Vec<Segment>) -> Self {
        segments.retain(|s| s.len > 0);
        segments.sort_by_key(|s| s.vaddr);
        Self { segments }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment holding `addr`
    #[must_use]
    pub fn locate(&self, addr: u64) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.vaddr <= addr);
        let candidate = self.segments.get(idx.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate)
    }

    /// Split `[addr, addr + len)` into `(file_offset, chunk_len)` pieces
    ///
    /// # Errors
    /// [`ScanError::ReadFault`] if any byte of the range is not file-backed.
    pub fn translate(&self, addr: KernelAddr, len: usize) -> Result<Vec<(u64, usize)>, ScanError> {
        let mut pieces = Vec::new();
        let mut done = 0usize;
        while done < len {
            let cur = addr
                .checked_add(done as u64)
                .ok_or_else(|| ScanError::fault(addr, len, "address range wraps"))?;
            let segment = self
                .locate(cur.0)
                .ok_or_else(|| ScanError::fault(addr, len, format!("{cur} is not mapped")))?;

            let available = segment.end() - cur.0;
            let chunk = usize::try_from(available).map_or(len - done, |a| a.min(len - done));
            pieces.push((segment.file_offset + (cur.0 - segment.vaddr), chunk));
            done += chunk;
        }
        Ok(pieces)
    }
}

/// Memory image backed by an ELF core file
#[derive(Debug)]
pub struct ElfCoreImage {
    file: File,
    segments: SegmentMap,
}

impl ElfCoreImage {
    /// Open `path` and load its segment table
    ///
    /// # Errors
    /// [`ScanError::ImageUnavailable`] if the file cannot be opened (usually
    /// missing privilege) or is not a 64-bit little-endian ELF file with
    /// loadable segments.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| ScanError::unavailable(&display, e))?;

        let mut head = [0u8; ELF64_HEADER_SIZE];
        file.read_exact_at(&mut head, 0)
            .map_err(|e| ScanError::unavailable(&display, not_elf(&e)))?;

        let header = FileHeader64::<Endianness>::parse(&head[..])
            .map_err(|e| ScanError::unavailable(&display, format!("not an ELF64 image: {e}")))?;
        let endian = header.endian().map_err(|e| ScanError::unavailable(&display, e))?;
        if !endian.is_little_endian() {
            return Err(ScanError::unavailable(&display, "big-endian images are not supported"));
        }
        if header.e_type(endian) != ET_CORE {
            warn!("{display} is not an ELF core file (e_type {})", header.e_type(endian));
        }

        let table_end = header.e_phoff(endian).checked_add(
            u64::from(header.e_phnum(endian)) * u64::from(header.e_phentsize(endian)),
        );
        let table_end = match table_end {
            Some(end) if end <= MAX_PHDR_TABLE => end,
            _ => {
                return Err(ScanError::unavailable(&display, "program header table out of range"))
            }
        };

        let mut prefix = vec![0u8; usize::try_from(table_end).unwrap_or(0).max(ELF64_HEADER_SIZE)];
        file.read_exact_at(&mut prefix, 0)
            .map_err(|e| ScanError::unavailable(&display, not_elf(&e)))?;
        let header = FileHeader64::<Endianness>::parse(&prefix[..])
            .map_err(|e| ScanError::unavailable(&display, e))?;
        let phdrs = header
            .program_headers(endian, &prefix[..])
            .map_err(|e| ScanError::unavailable(&display, format!("bad program headers: {e}")))?;

        let segments = SegmentMap::new(
            phdrs
                .iter()
                .filter(|ph| ph.p_type(endian) == PT_LOAD)
                .map(|ph| Segment {
                    vaddr: ph.p_vaddr(endian),
                    file_offset: ph.p_offset(endian),
                    len: ph.p_filesz(endian),
                })
                .collect(),
        );
        if segments.is_empty() {
            return Err(ScanError::unavailable(&display, "image has no loadable segments"));
        }

        info!("Opened {display}: {} loadable segments", segments.len());
        Ok(Self { file, segments })
    }
}

impl MemoryImage for ElfCoreImage {
    fn read_into(&self, addr: KernelAddr, buf: &mut [u8]) -> Result<(), ScanError> {
        let len = buf.len();
        let mut done = 0;
        for (file_offset, chunk) in self.segments.translate(addr, len)? {
            self.file
                .read_exact_at(&mut buf[done..done + chunk], file_offset)
                .map_err(|e| ScanError::fault(addr, len, short_read(&e)))?;
            done += chunk;
        }
        Ok(())
    }
}

fn not_elf(err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        "file too small to be an ELF image".to_string()
    } else {
        err.to_string()
    }
}

fn short_read(err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        "short read".to_string()
    } else {
        err.to_string()
    }
}
