//! Totals and the final summary

use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;

use crate::classify::classify;
use crate::decode::Record;
use crate::domain::Fsid;

/// Outcome of a completed scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanResult {
    pub total: u64,
    pub lost: u64,
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total file handles: {}", self.total)?;
        write!(f, "Lost file handles: {}", self.lost)
    }
}

/// Accumulates counts while records stream past
#[derive(Debug, Default)]
pub struct Reporter {
    total: u64,
    lost: u64,
    lost_by_fsid: BTreeMap<Fsid, u64>,
}

impl Reporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &Record) {
        self.total += 1;
        if classify(record) {
            self.lost += 1;
            debug!(
                "Lost lockfile at {} (fsid {}, usecount {})",
                record.self_addr,
                record.fsid.map_or_else(|| "?".to_string(), |f| f.to_string()),
                record.use_count.map_or_else(|| "?".to_string(), |c| c.to_string()),
            );
            if let Some(fsid) = record.fsid {
                *self.lost_by_fsid.entry(fsid).or_default() += 1;
            }
        }
    }

    /// Drain `records`; the first error discards every count
    ///
    /// # Errors
    /// Whatever error the sequence yields first.
    pub fn consume<E, I>(mut self, records: I) -> Result<ScanResult, E>
    where
        I: IntoIterator<Item = Result<Record, E>>,
    {
        for record in records {
            self.observe(&record?);
        }
        Ok(self.finish())
    }

    /// Lost counts per filesystem id
    #[must_use]
    pub fn lost_by_fsid(&self) -> &BTreeMap<Fsid, u64> {
        &self.lost_by_fsid
    }

    #[must_use]
    pub fn finish(self) -> ScanResult {
        for (fsid, lost) in &self.lost_by_fsid {
            info!("fsid {fsid}: {lost} lost");
        }
        info!("Scanned {} lockfiles, {} lost", self.total, self.lost);
        ScanResult { total: self.total, lost: self.lost }
    }
}
