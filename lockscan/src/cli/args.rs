//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    ScanConfig, DEFAULT_IMAGE_PATH, DEFAULT_MAX_BUCKETS, DEFAULT_MAX_RECORDS, DEFAULT_SIZE_SYMBOL,
    DEFAULT_SYMBOLS_PATH, DEFAULT_TABLE_SYMBOL,
};

#[derive(Parser, Debug)]
#[command(
    name = "lockscan",
    about = "Count NFSv4 server lockfiles and report the ones that were lost",
    after_help = "\
EXAMPLES:
    sudo lockscan                                          Scan the running FreeBSD kernel
    sudo lockscan --symbols /boot/kernel.old/kernel        Use a different kernel binary's symbols
    lockscan --image core.elf --symbols kernel.debug       Scan an ELF core with virtual addresses"
)]
pub struct Args {
    /// Kernel memory device (/dev/kmem) or ELF core image with virtual addresses
    #[arg(long, value_name = "FILE", default_value = DEFAULT_IMAGE_PATH)]
    pub image: PathBuf,

    /// Kernel symbols: kallsyms/nm text or the kernel ELF binary
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SYMBOLS_PATH)]
    pub symbols: PathBuf,

    /// Symbol of the pointer to the lockfile hash bucket array
    #[arg(long, value_name = "NAME", default_value = DEFAULT_TABLE_SYMBOL)]
    pub table_symbol: String,

    /// Symbol of the bucket count
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SIZE_SYMBOL)]
    pub size_symbol: String,

    /// Reject bucket counts above this
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_BUCKETS)]
    pub max_buckets: u32,

    /// Abort after visiting this many records
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RECORDS)]
    pub max_records: u64,

    /// Expected sizeof(struct nfslockfile) on the target, checked against the built-in layout
    #[arg(long, value_name = "BYTES")]
    pub record_size: Option<u32>,

    /// Do not check hash chain back links
    #[arg(long)]
    pub no_verify_links: bool,
}

impl From<Args> for ScanConfig {
    fn from(args: Args) -> Self {
        Self {
            image_path: args.image,
            symbols_path: args.symbols,
            table_symbol: args.table_symbol,
            size_symbol: args.size_symbol,
            max_buckets: args.max_buckets,
            max_records: args.max_records,
            verify_links: !args.no_verify_links,
            record_size: args.record_size,
        }
    }
}
