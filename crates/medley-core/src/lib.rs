//! Core types for medley, a music collection scanner.
//!
//! This crate holds everything the scanner worker, the device layer and the
//! scan orchestrator share:
//!
//! - [`DirectoryRecord`] / [`TrackRecord`]: what the worker reports
//! - [`Catalog`]: the store scan results are reconciled into
//! - [`MemoryCatalog`]: a thread-safe in-memory catalog
//! - [`ScannerConfig`]: orchestrator configuration
//! - [`BatchFile`] / [`Checkpoint`]: files exchanged with the worker

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod memory;
pub mod record;
pub mod scan;
pub mod wire;

pub use batch::{BatchFile, Checkpoint, CheckpointWriter, MtimeHint};
pub use catalog::{
    Catalog, CatalogEvent, KnownDirectory, Location, NoopPlaylistImporter, PlaylistImporter,
    RecordingPlaylistImporter,
};
pub use config::{SCANNER_BINARY, ScannerConfig, ScannerConfigBuilder};
pub use error::{CatalogError, ConfigError, ScanError};
pub use ids::{DeviceId, DirectoryId, TrackId};
pub use memory::{CatalogTrack, MemoryCatalog};
pub use record::{AlbumRecord, DirectoryRecord, FieldPolicy, FileType, PlaylistRef, TrackRecord};
pub use scan::ScanType;

/// Version string the orchestrator and the worker compare.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
