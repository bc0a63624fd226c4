//! Scan progress and outcome reporting.

use std::path::PathBuf;
use std::time::Duration;

use medley_core::ScanType;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Directories committed, skipped ones included.
    pub directories: u64,
    /// Directories the worker reported as unchanged.
    pub skipped: u64,
    pub tracks_upserted: u64,
    pub tracks_deleted: u64,
    pub directories_deleted: u64,
    /// Per-item problems that did not stop the pass.
    pub errors: Vec<String>,
}

/// Progress information during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Directory units received so far.
    pub directories_received: u64,
    /// The worker's announced directory count, if any.
    pub expected: Option<u64>,
    /// Last directory received.
    pub current_path: PathBuf,
    /// Worker restarts so far.
    pub restarts: u32,
}

impl ScanProgress {
    /// Fraction done, when the worker announced a count.
    pub fn fraction(&self) -> Option<f64> {
        self.expected
            .filter(|n| *n > 0)
            .map(|n| (self.directories_received as f64 / n as f64).min(1.0))
    }
}

/// Event published by the scan orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A worker was launched for a new scan.
    Started {
        scan_type: ScanType,
        directories: Vec<PathBuf>,
    },
    /// A saved scan stream is being imported.
    ImportStarted,
    Progress(ScanProgress),
    /// The worker died and is being relaunched.
    Restarting { attempt: u32 },
    /// Everything was committed.
    Finished {
        scan_type: ScanType,
        summary: CommitSummary,
        elapsed: Duration,
    },
    /// The scan was cancelled. Not an error.
    Aborted { reason: String },
    /// The scan failed and was rolled back.
    Failed { message: String },
    /// The worker binary reports a different version than the orchestrator.
    VersionMismatch { expected: String, found: String },
}
