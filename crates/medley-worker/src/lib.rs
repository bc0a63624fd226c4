//! The medley collection scanner.
//!
//! Runs as a separate process so that crashes in tag parsing never take the
//! orchestrator down. It walks the directories of a batch file, reads tags
//! of every audio file and writes one `<directory>` unit per directory to
//! stdout, recording its progress in a checkpoint file so a relaunched
//! worker can resume where the crashed one stopped.

pub mod directory;
pub mod emit;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod run;
pub mod tracker;
pub mod walk;

pub use directory::scan_directory;
pub use emit::StreamWriter;
pub use error::{Result, WorkerError};
pub use run::{WorkerOptions, run};
