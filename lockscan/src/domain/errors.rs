//! Structured error types for lockscan
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every variant is fatal to a scan; none is retried.

use super::state::ScanState;
use super::types::KernelAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot open {path}: {reason}")]
    ImageUnavailable { path: String, reason: String },

    #[error("symbol {name} not found in kernel symbol table")]
    SymbolNotFound { name: String },

    #[error("cannot read {size} bytes at {address}: {reason}")]
    ReadFault { address: KernelAddr, size: usize, reason: String },

    #[error("cannot decode {layout} record: {reason}")]
    DecodeError { layout: &'static str, reason: String },

    #[error("inconsistent structure: {0}")]
    InconsistentStructure(String),
}

impl ScanError {
    pub(crate) fn unavailable(path: impl Into<String>, reason: impl ToString) -> Self {
        ScanError::ImageUnavailable { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn fault(address: KernelAddr, size: usize, reason: impl ToString) -> Self {
        ScanError::ReadFault { address, size, reason: reason.to_string() }
    }
}

/// A scan that stopped in `state`
///
/// Displays as `<stage>: <cause>`, one line, which is what the binary prints.
#[derive(Error, Debug)]
#[error("{}: {source}", .state.activity())]
pub struct ScanFailure {
    /// Last state reached before the failure
    pub state: ScanState,
    #[source]
    pub source: ScanError,
}

impl ScanFailure {
    #[must_use]
    pub fn new(state: ScanState, source: ScanError) -> Self {
        Self { state, source }
    }
}
