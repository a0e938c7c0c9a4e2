//! Domain types providing compile-time safety and self-documentation
//!
//! Kernel addresses are never host pointers. Wrapping them in [`KernelAddr`]
//! keeps them from being mixed up with sizes or offsets, and makes every place
//! that turns one into a read go through a [`MemoryImage`](crate::image::MemoryImage).

use std::fmt;

/// Address in the inspected kernel's virtual address space
///
/// An opaque token: the only things that can be done with it are handing it
/// to a memory image or doing checked offset arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelAddr(pub u64);

impl KernelAddr {
    pub const NULL: KernelAddr = KernelAddr(0);

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for a null pointer value
    #[must_use]
    pub fn non_null(raw: u64) -> Option<KernelAddr> {
        (raw != 0).then_some(KernelAddr(raw))
    }

    /// Address `offset` bytes further on, or `None` on wrap-around
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<KernelAddr> {
        self.0.checked_add(offset).map(KernelAddr)
    }
}

impl fmt::Display for KernelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for KernelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Filesystem id (`fsid_t`) of a file handle
///
/// Identifies the exported filesystem a lockfile belongs to. Mapping it back
/// to a mount point needs the live mount list and is not done here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fsid(pub [u32; 2]);

impl fmt::Display for Fsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{:08x}", self.0[0], self.0[1])
    }
}
