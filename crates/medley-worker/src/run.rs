//! The worker's main loop.

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};

use medley_core::{BatchFile, Checkpoint, CheckpointWriter};

use crate::directory::scan_directory;
use crate::emit::StreamWriter;
use crate::error::{Result, WorkerError};
use crate::walk::collect_directories;

/// What to scan and how.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Batch file written by the orchestrator.
    pub batch: Option<PathBuf>,
    /// Directories given on the command line, scanned after the batch.
    pub directories: Vec<PathBuf>,
    /// Journal of the directories emitted so far.
    pub checkpoint: Option<PathBuf>,
    /// Skip directories whose mtime matches the batch's known mtime.
    pub incremental: bool,
    pub recursive: bool,
    /// Skip the directories recorded in the checkpoint.
    pub restart: bool,
}

/// Scan everything `options` names and write the stream to `out`.
///
/// Returns the number of directories written by this run.
pub fn run<W: Write>(options: &WorkerOptions, out: W) -> Result<u64> {
    let mut batch = match &options.batch {
        Some(path) => BatchFile::read(path).map_err(|source| WorkerError::Batch {
            path: path.clone(),
            source,
        })?,
        None => BatchFile::default(),
    };
    batch.directories.extend(options.directories.iter().cloned());
    if batch.directories.is_empty() {
        return Err(WorkerError::NothingToScan);
    }

    let directories = collect_directories(&batch.directories, options.recursive);
    let known = batch.known_mtimes();
    let done = match (&options.checkpoint, options.restart) {
        (Some(path), true) => Checkpoint::read(path),
        _ => Checkpoint::default(),
    };
    info!(
        directories = directories.len(),
        already_emitted = done.len(),
        incremental = options.incremental,
        "Scanning collection"
    );

    let mut journal = match &options.checkpoint {
        Some(path) => Some(CheckpointWriter::open(path, options.restart).map_err(|source| {
            WorkerError::Checkpoint {
                path: path.clone(),
                source,
            }
        })?),
        None => None,
    };

    let mut writer = StreamWriter::new(out);
    writer.header(directories.len(), options.incremental)?;

    let mut written = 0;
    for directory in directories.iter().filter(|d| !done.contains(d)) {
        let record = scan_directory(
            directory,
            known.get(directory.as_path()).copied(),
            options.incremental,
        );
        debug!(path = %directory.display(), tracks = record.track_count(), skipped = record.skipped, "Directory scanned");
        writer.directory(&record)?;
        written += 1;

        if let (Some(journal), Some(path)) = (journal.as_mut(), &options.checkpoint) {
            journal
                .record(directory)
                .map_err(|source| WorkerError::Checkpoint {
                    path: path.clone(),
                    source,
                })?;
        }
    }

    writer.footer()?;
    Ok(written)
}
