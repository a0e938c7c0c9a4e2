//! # Frozen Kernel Record Layout
//!
//! Describes the in-memory layout of the FreeBSD NFSv4 server's
//! `struct nfslockfile` on amd64, as an explicit schema rather than a
//! `#[repr(C)]` overlay. Scanners decode raw bytes read from kernel memory
//! against this schema, field by field.
//!
//! The offsets are a frozen copy of one kernel build's layout. Nothing in the
//! kernel image says which layout it uses, so the schema carries a
//! [`RecordLayout::version`] string and a self-consistency check
//! ([`RecordLayout::validate`]) that callers run before trusting it.
//!
//! ## Key Types
//!
//! - [`RecordLayout`] - Ordered field list, total size and version tag
//! - [`FieldSpec`] - One named field: offset, width and role
//! - [`FieldRole`] - What a field means to the scanner
//! - [`AssociationKind`] - The list heads that keep a lockfile alive

#![cfg_attr(not(test), no_std)]

use core::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Width of a kernel pointer on the supported ABI
pub const POINTER_WIDTH: u32 = 8;

/// Version tag of [`NFSLOCKFILE_AMD64`]
pub const NFSLOCKFILE_LAYOUT_VERSION: &str = "freebsd-amd64-nfslockfile-v1";

// ============================================================================
// Field Roles
// ============================================================================

/// Lists a lockfile can be referenced from.
///
/// A lockfile linked from any one of these is still reachable through normal
/// release paths. One with all of them empty is orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssociationKind {
    /// `lf_open`: open state list
    Open = 0,
    /// `lf_deleg`: delegation list
    Delegation = 1,
    /// `lf_lock`: byte-range lock list
    Lock = 2,
    /// `lf_locallock`: local lock list
    LocalLock = 3,
    /// `lf_rollback`: local lock rollback list
    Rollback = 4,
}

impl AssociationKind {
    /// Number of association kinds
    pub const COUNT: usize = 5;

    /// All kinds, in index order
    pub const ALL: [AssociationKind; Self::COUNT] = [
        AssociationKind::Open,
        AssociationKind::Delegation,
        AssociationKind::Lock,
        AssociationKind::LocalLock,
        AssociationKind::Rollback,
    ];

    /// Stable index into fixed-size association arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            AssociationKind::Open => "open",
            AssociationKind::Delegation => "delegation",
            AssociationKind::Lock => "lock",
            AssociationKind::LocalLock => "local-lock",
            AssociationKind::Rollback => "rollback",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Meaning of a field to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// List head pointer; non-null means the record is referenced
    Association(AssociationKind),
    /// `le_next` of the hash chain entry
    HashNext,
    /// `le_prev` of the hash chain entry (address of the pointer that links to us)
    HashPrev,
    /// `fsid_t` of the file handle (two 32-bit words)
    Fsid,
    /// Signed 32-bit reference count
    UseCount,
    /// Present in memory, not interpreted
    Opaque,
}

impl FieldRole {
    /// Width this role requires, if fixed
    #[must_use]
    pub const fn required_width(self) -> Option<u32> {
        match self {
            FieldRole::Association(_) | FieldRole::HashNext | FieldRole::HashPrev => {
                Some(POINTER_WIDTH)
            }
            FieldRole::Fsid => Some(8),
            FieldRole::UseCount => Some(4),
            FieldRole::Opaque => None,
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// One named field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Kernel source name of the field
    pub name: &'static str,
    /// Byte offset from the start of the record
    pub offset: u32,
    /// Width in bytes
    pub width: u32,
    pub role: FieldRole,
}

impl FieldSpec {
    /// One past the last byte of this field
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.offset + self.width
    }
}

/// A complete record schema
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    /// Identifies the kernel ABI this schema was copied from
    pub version: &'static str,
    /// Total record size in bytes, including trailing padding
    pub size: u32,
    /// Fields in ascending offset order
    pub fields: &'static [FieldSpec],
}

/// Reasons a [`RecordLayout`] is not usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutViolation {
    /// Record size is zero
    EmptyRecord,
    /// Field extends past the end of the record
    OutOfBounds { field: &'static str },
    /// Field starts before the previous one ends
    Overlap { field: &'static str, previous: &'static str },
    /// Field width does not match what its role needs
    BadWidth { field: &'static str, expected: u32, actual: u32 },
    /// Pointer field is not pointer aligned
    Misaligned { field: &'static str },
    /// A single-instance role is missing or repeated
    RoleCount { role: &'static str, count: usize },
    /// The same association kind is mapped twice
    DuplicateAssociation { kind: AssociationKind },
}

impl fmt::Display for LayoutViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutViolation::EmptyRecord => write!(f, "record size is zero"),
            LayoutViolation::OutOfBounds { field } => {
                write!(f, "field {field} extends past the end of the record")
            }
            LayoutViolation::Overlap { field, previous } => {
                write!(f, "field {field} overlaps {previous}")
            }
            LayoutViolation::BadWidth { field, expected, actual } => {
                write!(f, "field {field} is {actual} bytes wide, expected {expected}")
            }
            LayoutViolation::Misaligned { field } => {
                write!(f, "pointer field {field} is not {POINTER_WIDTH}-byte aligned")
            }
            LayoutViolation::RoleCount { role, count } => {
                write!(f, "layout has {count} {role} fields")
            }
            LayoutViolation::DuplicateAssociation { kind } => {
                write!(f, "association {kind} is mapped more than once")
            }
        }
    }
}

impl RecordLayout {
    /// Check the schema for internal consistency.
    ///
    /// Fields must be ordered, non-overlapping, inside the record, of the
    /// width their role needs, and pointers must be aligned. Exactly one
    /// `HashNext` is required and at least one association.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), LayoutViolation> {
        if self.size == 0 {
            return Err(LayoutViolation::EmptyRecord);
        }

        let mut previous: Option<&FieldSpec> = None;
        let mut seen = [false; AssociationKind::COUNT];
        let mut associations = 0;
        let mut next_links = 0;
        let mut prev_links = 0;

        for field in self.fields {
            if field.end() > self.size {
                return Err(LayoutViolation::OutOfBounds { field: field.name });
            }
            if let Some(prev) = previous {
                if field.offset < prev.end() {
                    return Err(LayoutViolation::Overlap { field: field.name, previous: prev.name });
                }
            }
            if let Some(expected) = field.role.required_width() {
                if field.width != expected {
                    return Err(LayoutViolation::BadWidth {
                        field: field.name,
                        expected,
                        actual: field.width,
                    });
                }
            }

            match field.role {
                FieldRole::Association(kind) => {
                    if seen[kind.index()] {
                        return Err(LayoutViolation::DuplicateAssociation { kind });
                    }
                    seen[kind.index()] = true;
                    associations += 1;
                }
                FieldRole::HashNext => next_links += 1,
                FieldRole::HashPrev => prev_links += 1,
                _ => {}
            }
            if matches!(
                field.role,
                FieldRole::Association(_) | FieldRole::HashNext | FieldRole::HashPrev
            ) && field.offset % POINTER_WIDTH != 0
            {
                return Err(LayoutViolation::Misaligned { field: field.name });
            }

            previous = Some(field);
        }

        if next_links != 1 {
            return Err(LayoutViolation::RoleCount { role: "hash-next", count: next_links });
        }
        if prev_links > 1 {
            return Err(LayoutViolation::RoleCount { role: "hash-prev", count: prev_links });
        }
        if associations == 0 {
            return Err(LayoutViolation::RoleCount { role: "association", count: 0 });
        }
        Ok(())
    }

    /// First field with the given role
    #[must_use]
    pub fn field(&self, role: FieldRole) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.role == role)
    }

    /// Byte offset of the hash chain `le_next` pointer
    #[must_use]
    pub fn next_offset(&self) -> Option<u32> {
        self.field(FieldRole::HashNext).map(|f| f.offset)
    }
}

// ============================================================================
// FreeBSD amd64 `struct nfslockfile`
// ============================================================================

/// `struct nfslockfile` from `sys/fs/nfs/nfsrvstate.h`, FreeBSD amd64.
///
/// ```text
/// offset  width  field
///      0      8  lf_open.lh_first
///      8      8  lf_deleg.lh_first
///     16      8  lf_lock.lh_first
///     24      8  lf_locallock.lh_first
///     32      8  lf_rollback.lh_first
///     40      8  lf_hash.le_next
///     48      8  lf_hash.le_prev
///     56      8  lf_fh.fh_fsid
///     64     20  lf_fh.fh_fid        (fid_len, fid_data0, fid_data[16])
///     84      8  lf_locallock_lck    (nfslock_usecnt, nfslock_lock, pad)
///     92      4  lf_usecount
///             96 total
/// ```
pub const NFSLOCKFILE_AMD64: RecordLayout = RecordLayout {
    version: NFSLOCKFILE_LAYOUT_VERSION,
    size: 96,
    fields: &[
        FieldSpec {
            name: "lf_open",
            offset: 0,
            width: 8,
            role: FieldRole::Association(AssociationKind::Open),
        },
        FieldSpec {
            name: "lf_deleg",
            offset: 8,
            width: 8,
            role: FieldRole::Association(AssociationKind::Delegation),
        },
        FieldSpec {
            name: "lf_lock",
            offset: 16,
            width: 8,
            role: FieldRole::Association(AssociationKind::Lock),
        },
        FieldSpec {
            name: "lf_locallock",
            offset: 24,
            width: 8,
            role: FieldRole::Association(AssociationKind::LocalLock),
        },
        FieldSpec {
            name: "lf_rollback",
            offset: 32,
            width: 8,
            role: FieldRole::Association(AssociationKind::Rollback),
        },
        FieldSpec { name: "lf_hash.le_next", offset: 40, width: 8, role: FieldRole::HashNext },
        FieldSpec { name: "lf_hash.le_prev", offset: 48, width: 8, role: FieldRole::HashPrev },
        FieldSpec { name: "lf_fh.fh_fsid", offset: 56, width: 8, role: FieldRole::Fsid },
        FieldSpec { name: "lf_fh.fh_fid", offset: 64, width: 20, role: FieldRole::Opaque },
        FieldSpec { name: "lf_locallock_lck", offset: 84, width: 8, role: FieldRole::Opaque },
        FieldSpec { name: "lf_usecount", offset: 92, width: 4, role: FieldRole::UseCount },
    ],
};
