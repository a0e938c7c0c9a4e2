//! Domain model for lockscan
//!
//! This module contains core domain types and errors that provide:
//! - Opaque kernel addresses that cannot be dereferenced by accident
//! - The scan state machine
//! - Structured error handling

pub mod errors;
pub mod state;
pub mod types;

// Re-export common types for convenience
pub use types::{Fsid, KernelAddr};

pub use errors::{ScanError, ScanFailure};
pub use state::ScanState;
