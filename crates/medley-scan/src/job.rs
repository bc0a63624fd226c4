//! One scan, from launching the worker to the final commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medley_core::{
    BatchFile, Catalog, CatalogError, MtimeHint, PlaylistImporter, ScanError, ScanType,
    ScannerConfig,
};
use medley_devices::DeviceResolver;

use crate::events::{CommitSummary, ScanEvent, ScanProgress};
use crate::reconciler::ResultReconciler;
use crate::request::ImportSource;
use crate::stream::{ScanStreamParser, StreamEvent};
use crate::worker::{WorkerCommand, WorkerProcess};

const READ_CHUNK: usize = 64 * 1024;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Batch file and checkpoint of one scan, removed when dropped.
#[derive(Debug)]
struct ScratchFiles {
    batch: PathBuf,
    checkpoint: PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Path) -> Result<Self, ScanError> {
        std::fs::create_dir_all(dir).map_err(|source| ScanError::BatchFile {
            path: dir.to_path_buf(),
            source,
        })?;
        let stem = format!(
            "scan-{}-{}",
            std::process::id(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Ok(Self {
            batch: dir.join(format!("{stem}.batch.json")),
            checkpoint: dir.join(format!("{stem}.checkpoint")),
        })
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.batch, &self.checkpoint] {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "Failed to remove scratch file");
                }
            }
        }
    }
}

/// What a job reads its scan results from.
#[derive(Debug)]
pub(crate) enum JobInput {
    Worker {
        scan_type: ScanType,
        directories: Vec<PathBuf>,
    },
    Import(ImportSource),
}

/// Result of a successful job.
#[derive(Debug)]
pub(crate) struct JobOutcome {
    pub scan_type: ScanType,
    pub summary: CommitSummary,
}

/// Everything a job needs, cloned out of the orchestrator so the job never
/// touches the orchestrator's lock.
pub(crate) struct ScanJob {
    pub config: Arc<ScannerConfig>,
    pub catalog: Arc<dyn Catalog>,
    pub resolver: Arc<DeviceResolver>,
    pub playlists: Arc<dyn PlaylistImporter>,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<ScanEvent>,
}

impl ScanJob {
    pub async fn run(self, input: JobInput) -> Result<JobOutcome, ScanError> {
        match input {
            JobInput::Worker {
                scan_type,
                directories,
            } => self.run_worker(scan_type, directories).await,
            JobInput::Import(source) => self.run_import(source).await,
        }
    }

    fn reconciler(&self, scan_type: ScanType) -> ResultReconciler {
        ResultReconciler::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.resolver),
            Arc::clone(&self.playlists),
            scan_type,
        )
        .with_notify_interval(self.config.notify_interval())
    }

    fn aborted() -> ScanError {
        ScanError::Aborted {
            reason: "Scanner aborted".to_string(),
        }
    }

    /// Directories to scan plus the mtimes of every known directory on a
    /// live device.
    fn batch_file(&self, directories: Vec<PathBuf>) -> Result<BatchFile, ScanError> {
        let live = self.resolver.live_device_ids();
        let mut batch = BatchFile::new(directories);
        batch.known = self
            .catalog
            .known_directories()?
            .into_iter()
            .filter(|dir| live.contains(&dir.location.device_id))
            .map(|dir| MtimeHint {
                path: self
                    .resolver
                    .resolve_absolute(dir.location.device_id, &dir.location.rpath),
                mtime: dir.mtime,
            })
            .collect();
        Ok(batch)
    }

    async fn run_worker(
        self,
        scan_type: ScanType,
        directories: Vec<PathBuf>,
    ) -> Result<JobOutcome, ScanError> {
        let scratch = ScratchFiles::new(&self.config.scratch_dir)?;
        let batch = self.batch_file(directories)?;
        batch
            .write(&scratch.batch)
            .map_err(|source| ScanError::BatchFile {
                path: scratch.batch.clone(),
                source,
            })?;

        let command = WorkerCommand {
            program: self.config.scanner_path.clone(),
            batch: scratch.batch.clone(),
            checkpoint: scratch.checkpoint.clone(),
            incremental: scan_type.is_incremental(),
            recursive: self.config.recursive,
        };

        let mut parser = ScanStreamParser::new();
        let mut reconciler = self.reconciler(scan_type);
        let mut progress = ScanProgress::default();
        let grace = self.config.kill_grace();
        let mut restarts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Self::aborted());
            }

            let (tx, mut rx) = mpsc::channel(32);
            let mut worker = WorkerProcess::spawn(&command, restarts > 0, tx)?;
            debug!(pid = ?worker.id(), attempt = restarts, "Collection scanner started");

            let status = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        worker.shutdown(grace).await;
                        reconciler.rollback();
                        return Err(Self::aborted());
                    }
                    chunk = rx.recv() => match chunk {
                        Some(bytes) => {
                            if let Err(err) = self.feed(&mut parser, &mut reconciler, &mut progress, &bytes, false) {
                                worker.shutdown(grace).await;
                                reconciler.rollback();
                                return Err(err);
                            }
                        }
                        None => break worker.wait().await,
                    }
                }
            };

            match status {
                Ok(status) if status.success() => break,
                Ok(status) => warn!(%status, attempt = restarts, "Collection scanner crashed"),
                Err(err) => warn!(error = %err, attempt = restarts, "Collection scanner vanished"),
            }

            if restarts >= self.config.max_restarts {
                reconciler.rollback();
                return Err(ScanError::TooManyRestarts { restarts });
            }
            restarts += 1;
            progress.restarts = restarts;
            parser.restart_stream();
            let _ = self.events.send(ScanEvent::Restarting { attempt: restarts });
        }

        if let Err(err) = parser.finish() {
            reconciler.rollback();
            return Err(err);
        }
        let summary = self.commit(reconciler).await?;
        Ok(JobOutcome { scan_type, summary })
    }

    async fn run_import(self, source: ImportSource) -> Result<JobOutcome, ScanError> {
        let mut reader: Box<dyn AsyncRead + Send + Unpin> = match source {
            ImportSource::File(path) => Box::new(
                tokio::fs::File::open(&path)
                    .await
                    .map_err(|err| ScanError::io(&path, err))?,
            ),
            ImportSource::Reader(reader) => reader,
        };

        let mut parser = ScanStreamParser::new();
        let mut reconciler = self.reconciler(ScanType::Full);
        let mut progress = ScanProgress::default();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    reconciler.rollback();
                    return Err(Self::aborted());
                }
                read = reader.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    reconciler.rollback();
                    return Err(ScanError::io("<import>", err));
                }
            };
            if let Err(err) = self.feed(&mut parser, &mut reconciler, &mut progress, &buf[..n], true) {
                reconciler.rollback();
                return Err(err);
            }
        }

        if let Err(err) = parser.finish() {
            reconciler.rollback();
            return Err(err);
        }
        let scan_type = reconciler.scan_type();
        let summary = self.commit(reconciler).await?;
        Ok(JobOutcome { scan_type, summary })
    }

    /// Push a chunk through the parser, buffering completed directories.
    fn feed(
        &self,
        parser: &mut ScanStreamParser,
        reconciler: &mut ResultReconciler,
        progress: &mut ScanProgress,
        bytes: &[u8],
        header_sets_type: bool,
    ) -> Result<(), ScanError> {
        for event in parser.push(bytes)? {
            match event {
                StreamEvent::Header { count, incremental } => {
                    debug!(?count, incremental, "Scanner stream started");
                    progress.expected = count;
                    if header_sets_type && incremental {
                        reconciler.set_scan_type(ScanType::PartialUpdateScan);
                    }
                }
                StreamEvent::Directory(directory) => {
                    progress.directories_received += 1;
                    progress.current_path.clone_from(&directory.path);
                    reconciler.add_directory(directory);
                    let _ = self.events.send(ScanEvent::Progress(progress.clone()));
                }
                StreamEvent::End => debug!(
                    directories = parser.directories_decoded(),
                    "Scanner stream complete"
                ),
            }
        }
        Ok(())
    }

    /// Run the commit on a blocking thread.
    async fn commit(&self, mut reconciler: ResultReconciler) -> Result<CommitSummary, ScanError> {
        info!(
            directories = reconciler.pending(),
            scan_type = %reconciler.scan_type(),
            "Committing scan results"
        );
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || reconciler.commit(&cancel))
            .await
            .map_err(|err| {
                ScanError::Catalog(CatalogError::Backend {
                    message: format!("commit task failed: {err}"),
                })
            })?
    }
}
