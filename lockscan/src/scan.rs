//! # Whole-Scan Driver
//!
//! Runs the components in order and tracks the [`ScanState`] machine:
//!
//! ```text
//! Start            open the memory image
//! ImageOpened      load the symbol table, resolve table and size symbols
//! SymbolsResolved  read the bucket count and bucket array pointer
//! DescriptorRead   build the record decoder
//! Walking          walk, classify and count every record
//! Done             hand out the ScanResult
//! ```
//!
//! Any error moves the scan to `Failed` and is returned as a [`ScanFailure`]
//! naming the state it left from. Nothing partial is returned. The image is
//! owned by the [`Scan`] and closed when it is dropped, on every path.

use log::debug;

use crate::config::ScanConfig;
use crate::decode::RecordDecoder;
use crate::domain::{ScanError, ScanFailure, ScanState};
use crate::image::{self, MemoryImage};
use crate::preflight;
use crate::report::{Reporter, ScanResult};
use crate::symbols::SymbolTable;
use crate::walker::{HashTableDescriptor, HashTableWalker};
use lockscan_layout::NFSLOCKFILE_AMD64;

/// A scan holding its memory image
pub struct Scan<I: MemoryImage> {
    image: I,
    state: ScanState,
}

impl Scan<Box<dyn MemoryImage>> {
    /// Open the configured image, as kernel memory or an ELF core
    ///
    /// # Errors
    /// [`ScanFailure`] in state `Start` if the image cannot be opened.
    pub fn open(config: &ScanConfig) -> Result<Self, ScanFailure> {
        preflight::check_privileges();
        preflight::check_readable(&config.image_path)
            .and_then(|()| image::open(&config.image_path))
            .map(Self::with_image)
            .map_err(|e| ScanFailure::new(ScanState::Start, e))
    }
}

impl<I: MemoryImage> Scan<I> {
    /// Wrap an already opened image
    pub fn with_image(image: I) -> Self {
        debug!("Scan state: {}", ScanState::ImageOpened);
        Self { image, state: ScanState::ImageOpened }
    }

    /// Run the scan to completion, consuming it and releasing the image
    ///
    /// # Errors
    /// The first [`ScanError`] hit, tagged with the state the scan was in.
    pub fn run(mut self, symbols: &SymbolTable, config: &ScanConfig) -> Result<ScanResult, ScanFailure> {
        let outcome = self.drive(symbols, config);
        if let Err(failure) = &outcome {
            debug!("Scan failed while {}: {}", failure.state.activity(), failure.source);
        }
        outcome
    }

    fn advance(&mut self) {
        self.state = self.state.advance();
        debug!("Scan state: {}", self.state);
    }

    fn fail(&mut self, source: ScanError) -> ScanFailure {
        let failure = ScanFailure::new(self.state, source);
        self.state = ScanState::Failed;
        failure
    }

    fn drive(&mut self, symbols: &SymbolTable, config: &ScanConfig) -> Result<ScanResult, ScanFailure> {
        let names = [config.table_symbol.as_str(), config.size_symbol.as_str()];
        let resolved = symbols.resolve(&names).map_err(|e| self.fail(e))?;
        let table_var = resolved[config.table_symbol.as_str()];
        let size_var = resolved[config.size_symbol.as_str()];
        self.advance();

        let descriptor =
            HashTableDescriptor::read(&self.image, table_var, size_var, config.max_buckets)
                .map_err(|e| self.fail(e))?;
        debug!(
            "Hash table: {} buckets at {}",
            descriptor.bucket_count, descriptor.bucket_array
        );
        self.advance();

        let decoder =
            RecordDecoder::new(&NFSLOCKFILE_AMD64, config.record_size).map_err(|e| self.fail(e))?;
        self.advance();

        let walker =
            HashTableWalker::new(&self.image, &decoder, descriptor, config.walk_limits());
        let outcome = Reporter::new().consume(walker);
        let result = outcome.map_err(|e| self.fail(e))?;
        self.advance();

        Ok(result)
    }
}

/// Open the configured image and symbol table and run one scan
///
/// # Errors
/// [`ScanFailure`] describing the stage and cause of the first error.
pub fn run(config: &ScanConfig) -> Result<ScanResult, ScanFailure> {
    let scan = Scan::open(config)?;

    let symbols = preflight::check_readable(&config.symbols_path)
        .and_then(|()| SymbolTable::load(&config.symbols_path))
        .map_err(|e| ScanFailure::new(ScanState::ImageOpened, e))?;

    scan.run(&symbols, config)
}
