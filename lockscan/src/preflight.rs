//! Pre-flight checks for lockscan
//!
//! Validates that input files are present and readable before any parsing
//! starts, so the error says what to fix (missing file, missing privilege)
//! instead of surfacing as a parse failure later.

#![allow(unsafe_code)] // geteuid() requires unsafe

use log::warn;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::domain::ScanError;

/// Warn when not running as root
///
/// Live images (`/dev/kmem`, `/proc/kcore`) need root, but captured
/// images can be readable by anyone, so this never fails.
pub fn check_privileges() {
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; live kernel images will likely be unreadable");
    }
}

/// Check that `path` is an existing file we can open for reading
///
/// # Errors
/// [`ScanError::ImageUnavailable`] with a hint for the common causes.
pub fn check_readable(path: &Path) -> Result<(), ScanError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ScanError::unavailable(display, "no such file"));
    }
    if path.is_dir() {
        return Err(ScanError::unavailable(display, "is a directory, expected a file"));
    }
    match File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(ScanError::unavailable(display, "permission denied (run as root)"))
        }
        Err(e) => Err(ScanError::unavailable(display, e)),
    }
}
