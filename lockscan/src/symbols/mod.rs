//! # Kernel Symbol Resolution
//!
//! Maps kernel symbol names to addresses in the inspected kernel. The table is
//! built once per run from one of two sources:
//!
//! - **kallsyms / `nm` text**: `<hex address> <type> <name> [module]` per line,
//!   as produced by `/proc/kallsyms` or `nm` run on a kernel binary.
//! - **Kernel ELF binary**: the `.symtab` (or dynamic symbols) of the booted
//!   kernel file, read with the `object` crate.
//!
//! [`SymbolTable::load`] picks the source by looking for the ELF magic.
//!
//! Symbol names are a versioned contract with the kernel build. A missing
//! symbol means the kernel does not match, and is always fatal.

pub mod elf;
pub mod kallsyms;

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::{KernelAddr, ScanError};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Name to address map for one kernel build
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, KernelAddr>,
    /// Entries whose address was reported as zero
    hidden: usize,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a kallsyms-format text file or a kernel ELF binary
    ///
    /// # Errors
    /// [`ScanError::ImageUnavailable`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let data = fs::read(path).map_err(|e| ScanError::unavailable(&display, e))?;

        let table = if data.starts_with(ELF_MAGIC) {
            elf::parse(&data).map_err(|e| ScanError::unavailable(&display, e))?
        } else {
            let text = String::from_utf8_lossy(&data);
            kallsyms::parse(&text)
        };

        info!("Loaded {} symbols from {display}", table.len());
        Ok(table)
    }

    /// Record a symbol; the first address seen for a name wins
    pub fn insert(&mut self, name: &str, addr: u64) {
        if addr == 0 {
            self.hidden += 1;
            return;
        }
        match self.entries.get(name) {
            Some(existing) if existing.0 != addr => {
                debug!("Ignoring duplicate {name} at 0x{addr:x} (keeping {existing})");
            }
            Some(_) => {}
            None => {
                self.entries.insert(name.to_owned(), KernelAddr(addr));
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<KernelAddr> {
        self.entries.get(name).copied()
    }

    /// Resolve every name in `names`
    ///
    /// # Errors
    /// - [`ScanError::SymbolNotFound`] naming the first missing symbol
    /// - [`ScanError::ImageUnavailable`] when the source reported every
    ///   address as zero (kallsyms read without privilege)
    pub fn resolve(&self, names: &[&str]) -> Result<HashMap<String, KernelAddr>, ScanError> {
        if self.entries.is_empty() && self.hidden > 0 {
            warn!("All {} symbol addresses are zero", self.hidden);
            return Err(ScanError::unavailable(
                "kernel symbol table",
                "symbol addresses are hidden (kptr_restrict); run as root",
            ));
        }

        let mut resolved = HashMap::with_capacity(names.len());
        for &name in names {
            let addr =
                self.get(name).ok_or_else(|| ScanError::SymbolNotFound { name: name.to_owned() })?;
            info!("Resolved {name} at {addr}");
            resolved.insert(name.to_owned(), addr);
        }
        Ok(resolved)
    }
}

impl<'a> FromIterator<(&'a str, u64)> for SymbolTable {
    fn from_iter<T: IntoIterator<Item = (&'a str, u64)>>(iter: T) -> Self {
        let mut table = SymbolTable::new();
        for (name, addr) in iter {
            table.insert(name, addr);
        }
        table
    }
}
