//! Error types for scanning and cataloguing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a scan job.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The batch description for the worker could not be written.
    #[error("Failed to write scanner batch file {path}: {source}")]
    BatchFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker process could not be started.
    #[error("Unable to start collection scanner {path}: {source}")]
    WorkerLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker kept crashing.
    #[error("The collection scan had to be aborted after {restarts} scanner restarts")]
    TooManyRestarts { restarts: u32 },

    /// The worker's output stream was malformed.
    #[error("Malformed scanner output: {message}")]
    Protocol { message: String },

    /// The worker's output ended in the middle of a directory unit.
    #[error("Scanner output ended unexpectedly")]
    TruncatedStream,

    /// The catalog rejected an operation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The scan was cancelled.
    #[error("Scan aborted: {reason}")]
    Aborted { reason: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether this is a user cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Errors reported by a catalog store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Referenced directory does not exist.
    #[error("Unknown directory id {0}")]
    UnknownDirectory(crate::DirectoryId),

    /// Referenced track does not exist.
    #[error("Unknown track id {0}")]
    UnknownTrack(crate::TrackId),

    /// Snapshot could not be read or written.
    #[error("Catalog storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be (de)serialized.
    #[error("Catalog snapshot is invalid: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("{message}")]
    Backend { message: String },
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::ScannerConfig`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
