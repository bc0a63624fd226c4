//! Collection scanning for medley.
//!
//! This crate runs the out-of-process scanner worker and merges what it
//! reports into the catalog:
//!
//! - [`ScanManager`] merges scan requests, launches one worker at a time and
//!   restarts it when it crashes
//! - [`ScanStreamParser`] reassembles directory units from the worker's
//!   arbitrarily chunked output
//! - [`ResultReconciler`] commits directory units to the catalog and deletes
//!   what a scan no longer found
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use medley_core::{MemoryCatalog, NoopPlaylistImporter, ScannerConfig};
//! use medley_devices::{DeviceResolver, DeviceTable};
//! use medley_scan::{ScanEvent, ScanManager};
//!
//! # async fn run() {
//! let resolver = Arc::new(DeviceResolver::new(Arc::new(DeviceTable::in_memory())));
//! resolver.set_collection_folders(&["/home/me/music".into()]).unwrap();
//!
//! let manager = ScanManager::new(
//!     ScannerConfig::default(),
//!     Arc::new(MemoryCatalog::new()),
//!     resolver,
//!     Arc::new(NoopPlaylistImporter),
//! );
//! let mut events = manager.subscribe();
//! manager.request_full_scan();
//!
//! while let Ok(event) = events.recv().await {
//!     if let ScanEvent::Finished { summary, .. } = event {
//!         println!("{} tracks", summary.tracks_upserted);
//!         break;
//!     }
//! }
//! # }
//! ```

mod events;
mod job;
mod manager;
mod reconciler;
mod request;
mod stream;
mod worker;

pub use events::{CommitSummary, ScanEvent, ScanProgress};
pub use manager::ScanManager;
pub use reconciler::{DEFAULT_NOTIFY_INTERVAL, ResultReconciler};
pub use request::{ImportSource, ScanRequest};
pub use stream::{ScanStreamParser, StreamEvent};
pub use worker::{WorkerCommand, worker_version};

// Re-export core types for convenience
pub use medley_core::{ScanError, ScanType};
