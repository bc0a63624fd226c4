//! Device layer errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the durable device table.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device table file could not be read or written.
    #[error("Device table I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device table file is not valid.
    #[error("Device table is invalid: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A factory was asked to handle a device it does not support.
    #[error("{kind} handler cannot handle device {identity}")]
    Unsupported { kind: String, identity: String },
}
