//! # Hash Table Traversal
//!
//! Walks a BSD `LIST`-style hash table: an array of bucket heads, each a
//! pointer to the first record of a singly linked chain threaded through the
//! records' `le_next` fields.
//!
//! ```text
//! bucket array                 records
//! +--------+     +-----------+     +-----------+
//! | head 0 |---->| le_next   |---->| le_next   |--> NULL
//! +--------+     | le_prev --+-+   | le_prev --+--> &prev.le_next
//! | head 1 |--> NULL           |
//! +--------+  <----------------+
//! ```
//!
//! The table belongs to a running kernel and may change while it is walked.
//! Two guards keep a torn view from turning into an endless loop: a per-bucket
//! visited set and an absolute ceiling on visited records. When enabled, each
//! record's `le_prev` must point back at the slot we reached it through, which
//! also catches a record layout that does not match the kernel.

use log::debug;
use std::collections::HashSet;

use crate::decode::{Record, RecordDecoder};
use crate::domain::{KernelAddr, ScanError};
use crate::image::MemoryImage;

/// Width of one bucket head (`LIST_HEAD` holds a single pointer)
const BUCKET_HEAD_SIZE: u64 = 8;

/// Location and size of the bucket array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashTableDescriptor {
    pub bucket_array: KernelAddr,
    pub bucket_count: u32,
}

impl HashTableDescriptor {
    /// Read the descriptor through the table's two kernel variables
    ///
    /// `table_var` holds a pointer to the bucket array; `size_var` holds the
    /// bucket count as a kernel `int`. With a count of zero the array pointer
    /// is not read at all.
    ///
    /// # Errors
    /// - [`ScanError::ReadFault`] if either variable is unreadable
    /// - [`ScanError::InconsistentStructure`] if the count is negative or above
    ///   `max_buckets`, or the array pointer is null while buckets exist
    pub fn read<I: MemoryImage + ?Sized>(
        image: &I,
        table_var: KernelAddr,
        size_var: KernelAddr,
        max_buckets: u32,
    ) -> Result<Self, ScanError> {
        let raw_count = image.read_i32(size_var)?;
        let bucket_count = u32::try_from(raw_count)
            .ok()
            .filter(|&count| count <= max_buckets)
            .ok_or_else(|| {
                ScanError::InconsistentStructure(format!(
                    "bucket count {raw_count} is outside 0..={max_buckets}; \
                     wrong symbol or kernel layout"
                ))
            })?;

        if bucket_count == 0 {
            return Ok(Self { bucket_array: KernelAddr::NULL, bucket_count });
        }

        let bucket_array = KernelAddr(image.read_u64(table_var)?);
        if bucket_array.is_null() {
            return Err(ScanError::InconsistentStructure(format!(
                "bucket array pointer is null with {bucket_count} buckets"
            )));
        }
        Ok(Self { bucket_array, bucket_count })
    }
}

/// Bounds on a single walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Total records visited across all buckets before giving up
    pub max_records: u64,
    /// Require `le_prev` to point at the slot each record was reached through
    pub verify_links: bool,
}

/// Next record to visit and the slot that pointed at it
#[derive(Debug, Clone, Copy)]
struct Cursor {
    node: KernelAddr,
    link_slot: KernelAddr,
}

/// Lazy single pass over every record in the table
///
/// Yields `Ok(record)` per record in bucket order. After the first `Err` the
/// iterator is exhausted.
pub struct HashTableWalker<'a, I: MemoryImage + ?Sized> {
    image: &'a I,
    decoder: &'a RecordDecoder,
    descriptor: HashTableDescriptor,
    limits: WalkLimits,
    next_bucket: u32,
    cursor: Option<Cursor>,
    visited: HashSet<KernelAddr>,
    visits: u64,
    buf: Vec<u8>,
    finished: bool,
}

impl<'a, I: MemoryImage + ?Sized> HashTableWalker<'a, I> {
    pub fn new(
        image: &'a I,
        decoder: &'a RecordDecoder,
        descriptor: HashTableDescriptor,
        limits: WalkLimits,
    ) -> Self {
        Self {
            image,
            decoder,
            descriptor,
            limits,
            next_bucket: 0,
            cursor: None,
            visited: HashSet::new(),
            visits: 0,
            buf: vec![0u8; decoder.record_size()],
            finished: false,
        }
    }

    fn current_bucket(&self) -> u32 {
        self.next_bucket.saturating_sub(1)
    }

    fn open_bucket(&mut self, index: u32) -> Result<Option<Cursor>, ScanError> {
        self.visited.clear();

        let slot = self
            .descriptor
            .bucket_array
            .checked_add(u64::from(index) * BUCKET_HEAD_SIZE)
            .ok_or_else(|| {
                ScanError::InconsistentStructure(format!(
                    "bucket {index} lies outside the address space"
                ))
            })?;
        let head = self.image.read_u64(slot)?;

        Ok(KernelAddr::non_null(head).map(|node| {
            debug!("Bucket {index}: head {node}");
            Cursor { node, link_slot: slot }
        }))
    }

    fn visit(&mut self, cursor: Cursor) -> Result<Record, ScanError> {
        let bucket = self.current_bucket();
        let node = cursor.node;

        if !self.visited.insert(node) {
            return Err(ScanError::InconsistentStructure(format!(
                "bucket {bucket}: record {node} reached twice, chain has a cycle"
            )));
        }
        self.visits += 1;
        if self.visits > self.limits.max_records {
            return Err(ScanError::InconsistentStructure(format!(
                "more than {} records visited; table is changing or corrupt",
                self.limits.max_records
            )));
        }

        self.image.read_into(node, &mut self.buf)?;
        let record = self.decoder.decode(node, &self.buf)?;

        if self.limits.verify_links && record.prev_link != Some(cursor.link_slot) {
            let found = record.prev_link.unwrap_or(KernelAddr::NULL);
            return Err(ScanError::InconsistentStructure(format!(
                "bucket {bucket}: record {node} links back to {found}, expected {}",
                cursor.link_slot
            )));
        }

        self.cursor = match record.next {
            Some(next) => {
                let link_slot = node.checked_add(self.decoder.next_offset()).ok_or_else(|| {
                    ScanError::InconsistentStructure(format!(
                        "record {node} lies outside the address space"
                    ))
                })?;
                Some(Cursor { node: next, link_slot })
            }
            None => None,
        };
        Ok(record)
    }

    fn step(&mut self) -> Option<Result<Record, ScanError>> {
        loop {
            if let Some(cursor) = self.cursor.take() {
                return Some(self.visit(cursor));
            }
            if self.next_bucket >= self.descriptor.bucket_count {
                return None;
            }
            let index = self.next_bucket;
            self.next_bucket += 1;
            match self.open_bucket(index) {
                Ok(cursor) => self.cursor = cursor,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<I: MemoryImage + ?Sized> Iterator for HashTableWalker<'_, I> {
    type Item = Result<Record, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::SparseImage;
    use lockscan_layout::NFSLOCKFILE_AMD64;

    const TABLE: u64 = 0x10_0000;

    fn decoder() -> RecordDecoder {
        RecordDecoder::new(&NFSLOCKFILE_AMD64, None).unwrap()
    }

    fn limits() -> WalkLimits {
        WalkLimits { max_records: 1_000, verify_links: true }
    }

    fn record(next: u64, prev: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; 96];
        bytes[40..48].copy_from_slice(&next.to_le_bytes());
        bytes[48..56].copy_from_slice(&prev.to_le_bytes());
        bytes
    }

    /// One bucket per chain; each chain lists record addresses in order
    fn table(chains: &[&[u64]]) -> SparseImage {
        let mut image = SparseImage::new();
        for (i, chain) in chains.iter().enumerate() {
            let slot = TABLE + i as u64 * 8;
            image.map_u64(KernelAddr(slot), chain.first().copied().unwrap_or(0));
            let mut prev = slot;
            for (j, &addr) in chain.iter().enumerate() {
                let next = chain.get(j + 1).copied().unwrap_or(0);
                image.map(KernelAddr(addr), record(next, prev));
                prev = addr + 40;
            }
        }
        image
    }

    fn descriptor(count: u32) -> HashTableDescriptor {
        HashTableDescriptor { bucket_array: KernelAddr(TABLE), bucket_count: count }
    }

    #[test]
    fn test_walk_visits_every_record_in_order() {
        let image = table(&[&[0x2000, 0x3000], &[], &[0x4000]]);
        let decoder = decoder();

        let addrs: Vec<u64> = HashTableWalker::new(&image, &decoder, descriptor(3), limits())
            .map(|r| r.unwrap().self_addr.0)
            .collect();
        assert_eq!(addrs, vec![0x2000, 0x3000, 0x4000]);
    }

    #[test]
    fn test_zero_buckets_reads_nothing() {
        let image = SparseImage::new();
        let decoder = decoder();
        let desc = HashTableDescriptor { bucket_array: KernelAddr::NULL, bucket_count: 0 };

        assert_eq!(HashTableWalker::new(&image, &decoder, desc, limits()).count(), 0);
    }

    #[test]
    fn test_self_loop_is_inconsistent() {
        let mut image = table(&[&[0x2000]]);
        image.map(KernelAddr(0x2000), record(0x2000, TABLE));
        let decoder = decoder();

        let mut walker = HashTableWalker::new(&image, &decoder, descriptor(1), limits());
        assert!(walker.next().unwrap().is_ok());
        let err = walker.next().unwrap().unwrap_err();
        assert!(matches!(err, ScanError::InconsistentStructure(_)));
        assert!(err.to_string().contains("cycle"));
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_longer_cycle_detected_without_link_checks() {
        let mut image = table(&[&[0x2000, 0x3000, 0x4000]]);
        image.map(KernelAddr(0x4000), record(0x2000, 0x3000 + 40));
        let decoder = decoder();
        let limits = WalkLimits { max_records: 1_000, verify_links: false };

        let results: Vec<_> = HashTableWalker::new(&image, &decoder, descriptor(1), limits).collect();
        assert_eq!(results.len(), 4);
        assert!(matches!(results[3], Err(ScanError::InconsistentStructure(_))));
    }

    #[test]
    fn test_visit_ceiling_enforced() {
        let image = table(&[&[0x2000, 0x3000], &[0x4000, 0x5000]]);
        let decoder = decoder();
        let limits = WalkLimits { max_records: 3, verify_links: true };

        let results: Vec<_> = HashTableWalker::new(&image, &decoder, descriptor(2), limits).collect();
        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(Result::is_ok));
        assert!(results[3].as_ref().unwrap_err().to_string().contains("more than 3 records"));
    }

    #[test]
    fn test_same_record_in_two_buckets_is_not_a_cycle() {
        // Visited sets are per bucket; a mid-unlink record can briefly appear twice.
        let mut image = table(&[&[0x2000], &[]]);
        image.map_u64(KernelAddr(TABLE + 8), 0x2000);
        let decoder = decoder();
        let limits = WalkLimits { max_records: 1_000, verify_links: false };

        let results: Vec<_> = HashTableWalker::new(&image, &decoder, descriptor(2), limits).collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn test_bad_back_link_is_inconsistent() {
        let mut image = table(&[&[0x2000]]);
        image.map(KernelAddr(0x2000), record(0, 0xdead_0000));
        let decoder = decoder();

        let err = HashTableWalker::new(&image, &decoder, descriptor(1), limits())
            .find_map(Result::err)
            .unwrap();
        assert!(err.to_string().contains("links back to"));
    }

    #[test]
    fn test_unmapped_record_faults() {
        let mut image = SparseImage::new();
        image.map_u64(KernelAddr(TABLE), 0x9000);
        let decoder = decoder();

        let results: Vec<_> = HashTableWalker::new(&image, &decoder, descriptor(1), limits()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ScanError::ReadFault { address: KernelAddr(0x9000), .. })));
    }

    #[test]
    fn test_descriptor_rejects_out_of_range_counts() {
        let mut image = SparseImage::new();
        image.map_u64(KernelAddr(0x100), TABLE).map_i32(KernelAddr(0x200), -1);
        let err = HashTableDescriptor::read(&image, KernelAddr(0x100), KernelAddr(0x200), 64)
            .unwrap_err();
        assert!(matches!(err, ScanError::InconsistentStructure(_)));

        image.map_i32(KernelAddr(0x200), 65);
        assert!(HashTableDescriptor::read(&image, KernelAddr(0x100), KernelAddr(0x200), 64).is_err());

        image.map_i32(KernelAddr(0x200), 64);
        let desc = HashTableDescriptor::read(&image, KernelAddr(0x100), KernelAddr(0x200), 64).unwrap();
        assert_eq!(desc, HashTableDescriptor { bucket_array: KernelAddr(TABLE), bucket_count: 64 });
    }

    #[test]
    fn test_descriptor_zero_count_skips_array_pointer() {
        let mut image = SparseImage::new();
        image.map_i32(KernelAddr(0x200), 0);
        let desc = HashTableDescriptor::read(&image, KernelAddr(0x100), KernelAddr(0x200), 64).unwrap();
        assert_eq!(desc.bucket_count, 0);
    }

    #[test]
    fn test_descriptor_null_array_is_inconsistent() {
        let mut image = SparseImage::new();
        image.map_u64(KernelAddr(0x100), 0).map_i32(KernelAddr(0x200), 4);
        let err = HashTableDescriptor::read(&image, KernelAddr(0x100), KernelAddr(0x200), 64)
            .unwrap_err();
        assert!(err.to_string().contains("null"));
    }
}
