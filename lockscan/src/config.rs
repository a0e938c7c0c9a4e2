//! Scan configuration
//!
//! Every field has a default, so a scan needs no arguments. The CLI layer
//! ([`crate::cli::Args`]) only overrides these.

use std::path::PathBuf;

use crate::walker::WalkLimits;

/// Live FreeBSD kernel memory, addressed by kernel virtual address
pub const DEFAULT_IMAGE_PATH: &str = "/dev/kmem";

/// Running FreeBSD kernel binary; its `.symtab` locates the table
pub const DEFAULT_SYMBOLS_PATH: &str = "/boot/kernel/kernel";

/// Kernel pointer variable holding the bucket array address
pub const DEFAULT_TABLE_SYMBOL: &str = "nfslockhash";

/// Kernel `int` holding the bucket count
pub const DEFAULT_SIZE_SYMBOL: &str = "nfsrv_lockhashsize";

/// Largest bucket count accepted before assuming a symbol or layout mismatch
pub const DEFAULT_MAX_BUCKETS: u32 = 1 << 20;

/// Largest number of records visited before assuming a runaway walk
pub const DEFAULT_MAX_RECORDS: u64 = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Kernel memory device or ELF core image, told apart by file type
    pub image_path: PathBuf,
    /// kallsyms text or kernel ELF file to resolve symbols from
    pub symbols_path: PathBuf,
    pub table_symbol: String,
    pub size_symbol: String,
    pub max_buckets: u32,
    pub max_records: u64,
    /// Check each record's `le_prev` against the slot that led to it
    pub verify_links: bool,
    /// Record size obtained independently of the built-in layout
    pub record_size: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from(DEFAULT_IMAGE_PATH),
            symbols_path: PathBuf::from(DEFAULT_SYMBOLS_PATH),
            table_symbol: DEFAULT_TABLE_SYMBOL.to_string(),
            size_symbol: DEFAULT_SIZE_SYMBOL.to_string(),
            max_buckets: DEFAULT_MAX_BUCKETS,
            max_records: DEFAULT_MAX_RECORDS,
            verify_links: true,
            record_size: None,
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn walk_limits(&self) -> WalkLimits {
        WalkLimits { max_records: self.max_records, verify_links: self.verify_links }
    }
}
