//! Lost lockfile classification
//!
//! A lockfile is released when the last open, lock, delegation, local lock or
//! rollback entry referring to it goes away. One that is still hashed but
//! referenced by none of those can never be released through normal paths:
//! it is lost.

use crate::decode::Record;

/// True if `record` is lost: every association pointer is null
#[must_use]
pub fn classify(record: &Record) -> bool {
    record.associations.all_null()
}
