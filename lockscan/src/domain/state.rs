//! Whole-scan state machine
//!
//! ```text
//! Start -> ImageOpened -> SymbolsResolved -> DescriptorRead -> Walking -> Done
//!   \__________\______________\_________________\_______________\-> Failed
//! ```
//!
//! Only `Done` hands out a result.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Start,
    ImageOpened,
    SymbolsResolved,
    DescriptorRead,
    Walking,
    Done,
    Failed,
}

impl ScanState {
    /// What the scan is doing while leaving this state
    #[must_use]
    pub fn activity(self) -> &'static str {
        match self {
            ScanState::Start => "opening memory image",
            ScanState::ImageOpened => "resolving kernel symbols",
            ScanState::SymbolsResolved => "reading hash table descriptor",
            ScanState::DescriptorRead => "checking record layout",
            ScanState::Walking => "walking hash table",
            ScanState::Done => "reporting",
            ScanState::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Done | ScanState::Failed)
    }

    /// The state that follows on success; terminal states stay put
    #[must_use]
    pub fn advance(self) -> ScanState {
        match self {
            ScanState::Start => ScanState::ImageOpened,
            ScanState::ImageOpened => ScanState::SymbolsResolved,
            ScanState::SymbolsResolved => ScanState::DescriptorRead,
            ScanState::DescriptorRead => ScanState::Walking,
            ScanState::Walking | ScanState::Done => ScanState::Done,
            ScanState::Failed => ScanState::Failed,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
