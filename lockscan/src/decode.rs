//! Record decoding against a frozen layout schema
//!
//! The decoder validates its [`RecordLayout`] once at construction and then
//! reads each field at its schema offset. It never reinterprets a byte buffer
//! as a Rust struct.

use lockscan_layout::{AssociationKind, FieldRole, FieldSpec, RecordLayout};

use crate::domain::{Fsid, KernelAddr, ScanError};

/// Association pointers of one record, indexed by [`AssociationKind`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Associations([Option<KernelAddr>; AssociationKind::COUNT]);

impl Associations {
    #[must_use]
    pub fn get(&self, kind: AssociationKind) -> Option<KernelAddr> {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: AssociationKind, addr: Option<KernelAddr>) {
        self.0[kind.index()] = addr;
    }

    /// True when no association pointer is set
    #[must_use]
    pub fn all_null(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Kinds with a non-null pointer
    pub fn present(&self) -> impl Iterator<Item = AssociationKind> + '_ {
        AssociationKind::ALL.into_iter().filter(|k| self.get(*k).is_some())
    }
}

/// One decoded lockfile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Where the record was read from
    pub self_addr: KernelAddr,
    /// Hash chain successor (`le_next`)
    pub next: Option<KernelAddr>,
    /// Address of the pointer that links to this record (`le_prev`)
    pub prev_link: Option<KernelAddr>,
    pub associations: Associations,
    pub fsid: Option<Fsid>,
    pub use_count: Option<i32>,
}

/// Decodes raw record bytes for one layout
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    layout: &'static RecordLayout,
    next: FieldSpec,
    prev: Option<FieldSpec>,
    fsid: Option<FieldSpec>,
    use_count: Option<FieldSpec>,
    associations: Vec<(AssociationKind, FieldSpec)>,
}

impl RecordDecoder {
    /// Build a decoder after validating `layout`
    ///
    /// When `expected_size` comes from an independent source (a debugger, a
    /// `sizeof` printed on the target), a mismatch with the schema fails here
    /// rather than misreading every record later.
    ///
    /// # Errors
    /// [`ScanError::DecodeError`] if the layout is inconsistent or its size
    /// differs from `expected_size`.
    pub fn new(layout: &'static RecordLayout, expected_size: Option<u32>) -> Result<Self, ScanError> {
        layout.validate().map_err(|violation| ScanError::DecodeError {
            layout: layout.version,
            reason: violation.to_string(),
        })?;

        if let Some(expected) = expected_size {
            if expected != layout.size {
                return Err(ScanError::DecodeError {
                    layout: layout.version,
                    reason: format!(
                        "layout describes {} bytes but the target record is {expected} bytes",
                        layout.size
                    ),
                });
            }
        }

        let next = *layout.field(FieldRole::HashNext).ok_or_else(|| ScanError::DecodeError {
            layout: layout.version,
            reason: "layout has no hash-next field".to_string(),
        })?;
        let associations = layout
            .fields
            .iter()
            .filter_map(|f| match f.role {
                FieldRole::Association(kind) => Some((kind, *f)),
                _ => None,
            })
            .collect();

        Ok(Self {
            layout,
            next,
            prev: layout.field(FieldRole::HashPrev).copied(),
            fsid: layout.field(FieldRole::Fsid).copied(),
            use_count: layout.field(FieldRole::UseCount).copied(),
            associations,
        })
    }

    /// Bytes to read per record
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.layout.size as usize
    }

    /// Offset of `le_next`, used to check back links
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        u64::from(self.next.offset)
    }

    /// Decode `bytes` read from `self_addr`
    ///
    /// # Errors
    /// [`ScanError::DecodeError`] if `bytes` is not exactly one record long.
    pub fn decode(&self, self_addr: KernelAddr, bytes: &[u8]) -> Result<Record, ScanError> {
        if bytes.len() != self.record_size() {
            return Err(ScanError::DecodeError {
                layout: self.layout.version,
                reason: format!(
                    "got {} bytes at {self_addr}, record is {} bytes",
                    bytes.len(),
                    self.layout.size
                ),
            });
        }

        let mut associations = Associations::default();
        for (kind, field) in &self.associations {
            associations.set(*kind, KernelAddr::non_null(read_u64(bytes, field)));
        }

        Ok(Record {
            self_addr,
            next: KernelAddr::non_null(read_u64(bytes, &self.next)),
            prev_link: self.prev.and_then(|f| KernelAddr::non_null(read_u64(bytes, &f))),
            associations,
            fsid: self.fsid.map(|f| {
                let raw = field_bytes(bytes, &f);
                Fsid([le_u32(&raw[0..4]), le_u32(&raw[4..8])])
            }),
            use_count: self.use_count.map(|f| le_i32(field_bytes(bytes, &f))),
        })
    }
}

// Widths and bounds were checked by `RecordLayout::validate`.
fn field_bytes<'a>(bytes: &'a [u8], field: &FieldSpec) -> &'a [u8] {
    &bytes[field.offset as usize..field.end() as usize]
}

fn read_u64(bytes: &[u8], field: &FieldSpec) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(field_bytes(bytes, field));
    u64::from_le_bytes(raw)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn le_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    i32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockscan_layout::NFSLOCKFILE_AMD64;

    fn decoder() -> RecordDecoder {
        RecordDecoder::new(&NFSLOCKFILE_AMD64, None).unwrap()
    }

    #[test]
    fn test_decode_fields_at_offsets() {
        let mut bytes = vec![0u8; 96];
        bytes[16..24].copy_from_slice(&0xffff_f800_0000_1000u64.to_le_bytes()); // lf_lock
        bytes[40..48].copy_from_slice(&0xffff_f800_0000_2000u64.to_le_bytes()); // le_next
        bytes[48..56].copy_from_slice(&0xffff_f800_0000_3000u64.to_le_bytes()); // le_prev
        bytes[56..60].copy_from_slice(&0x8au32.to_le_bytes());
        bytes[60..64].copy_from_slice(&0x3c00_ff01u32.to_le_bytes());
        bytes[92..96].copy_from_slice(&(-1i32).to_le_bytes());

        let record = decoder().decode(KernelAddr(0x5000), &bytes).unwrap();
        assert_eq!(record.self_addr, KernelAddr(0x5000));
        assert_eq!(record.next, Some(KernelAddr(0xffff_f800_0000_2000)));
        assert_eq!(record.prev_link, Some(KernelAddr(0xffff_f800_0000_3000)));
        assert_eq!(record.associations.get(AssociationKind::Lock), Some(KernelAddr(0xffff_f800_0000_1000)));
        assert_eq!(record.associations.get(AssociationKind::Open), None);
        assert_eq!(record.associations.present().collect::<Vec<_>>(), vec![AssociationKind::Lock]);
        assert_eq!(record.fsid, Some(Fsid([0x8a, 0x3c00_ff01])));
        assert_eq!(record.use_count, Some(-1));
    }

    #[test]
    fn test_zeroed_record_has_no_links() {
        let record = decoder().decode(KernelAddr(0x5000), &[0u8; 96]).unwrap();
        assert_eq!(record.next, None);
        assert!(record.associations.all_null());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = decoder().decode(KernelAddr(0x5000), &[0u8; 95]).unwrap_err();
        assert!(matches!(err, ScanError::DecodeError { .. }));
        let err = decoder().decode(KernelAddr(0x5000), &[0u8; 97]).unwrap_err();
        assert!(matches!(err, ScanError::DecodeError { .. }));
    }

    #[test]
    fn test_expected_size_mismatch_rejected() {
        let err = RecordDecoder::new(&NFSLOCKFILE_AMD64, Some(104)).unwrap_err();
        assert!(err.to_string().contains("104"));
        assert!(RecordDecoder::new(&NFSLOCKFILE_AMD64, Some(96)).is_ok());
    }

    #[test]
    fn test_invalid_layout_rejected() {
        static BROKEN: RecordLayout = RecordLayout { version: "broken", size: 0, fields: &[] };
        let err = RecordDecoder::new(&BROKEN, None).unwrap_err();
        assert!(matches!(err, ScanError::DecodeError { layout: "broken", .. }));
    }
}
