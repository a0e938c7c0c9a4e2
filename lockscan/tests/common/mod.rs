#![allow(dead_code)]

use lockscan::domain::KernelAddr;
use lockscan::image::SparseImage;
use lockscan::symbols::SymbolTable;
use lockscan_layout::{AssociationKind, FieldRole, NFSLOCKFILE_AMD64};
use std::io::Write;
use std::path::Path;

pub const TABLE_VAR: u64 = 0xffff_ffff_82a1_c2c0;
pub const SIZE_VAR: u64 = 0xffff_ffff_82a1_c2c8;
pub const BUCKET_ARRAY: u64 = 0xffff_f800_0100_0000;
pub const RECORD_BASE: u64 = 0xffff_f800_0200_0000;
pub const RECORD_STRIDE: u64 = 0x100;

const RECORD_SIZE: usize = 96;
const NEXT_OFFSET: u64 = 40;

/// Lockfile to place in a synthetic table
#[derive(Debug, Clone, Default)]
pub struct Lockfile {
    pub live: Vec<AssociationKind>,
    pub fsid: [u32; 2],
}

impl Lockfile {
    pub fn lost() -> Self {
        Self::default()
    }

    pub fn live(kinds: &[AssociationKind]) -> Self {
        Self { live: kinds.to_vec(), ..Self::default() }
    }
}

/// Lays out a lockfile hash table the way the kernel links it
pub struct TableBuilder {
    buckets: Vec<Vec<Lockfile>>,
    /// Overrides the stored bucket count
    count_override: Option<i32>,
}

impl TableBuilder {
    pub fn new(bucket_count: usize) -> Self {
        Self { buckets: vec![Vec::new(); bucket_count], count_override: None }
    }

    pub fn push(&mut self, bucket: usize, lockfile: Lockfile) -> &mut Self {
        self.buckets[bucket].push(lockfile);
        self
    }

    pub fn stored_count(&mut self, count: i32) -> &mut Self {
        self.count_override = Some(count);
        self
    }

    pub fn record_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Address of the `n`th record in bucket order
    pub fn record_addr(n: usize) -> u64 {
        RECORD_BASE + n as u64 * RECORD_STRIDE
    }

    /// Every mapped region as `(vaddr, bytes)`
    pub fn regions(&self) -> Vec<(u64, Vec<u8>)> {
        let count = self.count_override.unwrap_or(self.buckets.len() as i32);
        let mut regions = vec![
            (TABLE_VAR, BUCKET_ARRAY.to_le_bytes().to_vec()),
            (SIZE_VAR, count.to_le_bytes().to_vec()),
        ];

        let mut heads = Vec::with_capacity(self.buckets.len() * 8);
        let mut n = 0;
        for (i, chain) in self.buckets.iter().enumerate() {
            let slot = BUCKET_ARRAY + i as u64 * 8;
            let head = if chain.is_empty() { 0 } else { Self::record_addr(n) };
            heads.extend_from_slice(&head.to_le_bytes());

            let mut prev_link = slot;
            for (j, lockfile) in chain.iter().enumerate() {
                let addr = Self::record_addr(n);
                let next = if j + 1 < chain.len() { Self::record_addr(n + 1) } else { 0 };
                regions.push((addr, encode(lockfile, next, prev_link)));
                prev_link = addr + NEXT_OFFSET;
                n += 1;
            }
        }
        if !heads.is_empty() {
            regions.push((BUCKET_ARRAY, heads));
        }
        regions
    }

    pub fn image(&self) -> SparseImage {
        let mut image = SparseImage::new();
        for (addr, bytes) in self.regions() {
            image.map(KernelAddr(addr), bytes);
        }
        image
    }
}

pub fn symbols() -> SymbolTable {
    [("nfslockhash", TABLE_VAR), ("nfsrv_lockhashsize", SIZE_VAR)].into_iter().collect()
}

pub fn kallsyms_text(include_size: bool) -> String {
    let mut text = format!(
        "ffffffff80200000 T _start\n{TABLE_VAR:016x} B nfslockhash\t[nfsd]\n"
    );
    if include_size {
        text.push_str(&format!("{SIZE_VAR:016x} D nfsrv_lockhashsize\t[nfsd]\n"));
    }
    text
}

/// Encode one record using the layout's field offsets
pub fn encode(lockfile: &Lockfile, next: u64, prev_link: u64) -> Vec<u8> {
    let mut bytes = vec![0u8; RECORD_SIZE];
    for field in NFSLOCKFILE_AMD64.fields {
        let at = field.offset as usize;
        match field.role {
            FieldRole::Association(kind) if lockfile.live.contains(&kind) => {
                let value = 0xffff_f800_0f00_0000 + kind.index() as u64 * 0x40;
                bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
            }
            FieldRole::HashNext => bytes[at..at + 8].copy_from_slice(&next.to_le_bytes()),
            FieldRole::HashPrev => bytes[at..at + 8].copy_from_slice(&prev_link.to_le_bytes()),
            FieldRole::Fsid => {
                bytes[at..at + 4].copy_from_slice(&lockfile.fsid[0].to_le_bytes());
                bytes[at + 4..at + 8].copy_from_slice(&lockfile.fsid[1].to_le_bytes());
            }
            FieldRole::UseCount => bytes[at..at + 4].copy_from_slice(&1i32.to_le_bytes()),
            _ => {}
        }
    }
    bytes
}

/// Write a little-endian ELF64 core file with one `PT_LOAD` per region
pub fn write_elf_core(path: &Path, regions: &[(u64, Vec<u8>)]) {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;

    let phnum = regions.len() as u64;
    let mut data_offset = EHDR_SIZE + phnum * PHDR_SIZE;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&4u16.to_le_bytes()); // e_type = ET_CORE
    out.extend_from_slice(&62u16.to_le_bytes()); // e_machine = EM_X86_64
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(phnum as u16).to_le_bytes());
    out.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(out.len() as u64, EHDR_SIZE);

    for (vaddr, bytes) in regions {
        let len = bytes.len() as u64;
        out.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        out.extend_from_slice(&4u32.to_le_bytes()); // PF_R
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&vaddr.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // p_paddr
        out.extend_from_slice(&len.to_le_bytes()); // p_filesz
        out.extend_from_slice(&len.to_le_bytes()); // p_memsz
        out.extend_from_slice(&8u64.to_le_bytes()); // p_align
        data_offset += len;
    }
    for (_, bytes) in regions {
        out.extend_from_slice(bytes);
    }

    let mut file = std::fs::File::create(path).expect("create core file");
    file.write_all(&out).expect("write core file");
}
