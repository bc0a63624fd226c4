//! Error types for the scanner worker.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The batch file could not be read.
    #[error("Cannot read batch file {path}: {source}")]
    Batch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint could not be written.
    #[error("Cannot write checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the output stream failed.
    #[error("Failed to write scanner output: {0}")]
    Output(#[from] quick_xml::Error),

    /// Flushing the output stream failed.
    #[error("Failed to flush scanner output: {0}")]
    Io(#[from] std::io::Error),

    /// Neither a batch file nor directories were given.
    #[error("Nothing to scan: pass --batch or at least one directory")]
    NothingToScan,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
