//! The scan orchestrator.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use medley_core::{Catalog, PlaylistImporter, ScanError, ScanType, ScannerConfig, VERSION};
use medley_devices::{DeviceResolver, clean_path};

use crate::events::ScanEvent;
use crate::job::{JobInput, JobOutcome, ScanJob};
use crate::request::{ImportSource, PendingScanState, ScanRequest};
use crate::worker::worker_version;

/// The job currently running.
#[derive(Debug)]
struct RunningJob {
    id: u64,
    cancel: CancellationToken,
    abort_reason: Option<String>,
}

#[derive(Debug, Default)]
struct ManagerState {
    pending: PendingScanState,
    /// Requests made while scanning was blocked.
    blocked_requests: PendingScanState,
    block_count: u32,
    running: Option<RunningJob>,
    next_job_id: u64,
}

struct Inner {
    config: Arc<ScannerConfig>,
    catalog: Arc<dyn Catalog>,
    resolver: Arc<DeviceResolver>,
    playlists: Arc<dyn PlaylistImporter>,
    runtime: Handle,
    state: Mutex<ManagerState>,
    events_tx: broadcast::Sender<ScanEvent>,
    idle_tx: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ScanEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn request(self: &Arc<Self>, request: ScanRequest) {
        let mut state = self.lock();

        let mut incoming = PendingScanState::default();
        match request {
            ScanRequest::Full => incoming.full = true,
            ScanRequest::IncrementalAll => {
                incoming.directories.extend(self.resolver.collection_folders());
            }
            ScanRequest::IncrementalDirectory(dir) => {
                let dir = clean_path(&dir);
                if !self.resolver.is_dir_in_collection(&dir) {
                    debug!(directory = %dir.display(), "Ignoring scan request outside the collection");
                    return;
                }
                incoming.directories.insert(dir);
            }
            ScanRequest::Import(source) => {
                // An import replaces everything requested so far.
                Self::abort_running(&mut state, "Import requested");
                state.pending = PendingScanState::default();
                state.blocked_requests = PendingScanState::default();
                incoming.import = Some(source);
            }
        }

        if state.block_count > 0 {
            debug!(blocks = state.block_count, "Scan blocked, keeping request for later");
            state.blocked_requests.merge(incoming);
        } else {
            state.pending.merge(incoming);
            self.try_launch(&mut state);
        }
    }

    fn abort_running(state: &mut ManagerState, reason: &str) {
        if let Some(job) = state.running.as_mut() {
            if !job.cancel.is_cancelled() {
                info!(reason, "Aborting collection scan");
                job.abort_reason = Some(reason.to_string());
                job.cancel.cancel();
            }
        }
    }

    /// Start a job for the pending requests if nothing prevents it.
    fn try_launch(self: &Arc<Self>, state: &mut ManagerState) {
        if state.block_count > 0 || state.running.is_some() || !state.pending.has_work() {
            return;
        }
        let mut pending = state.pending.take();

        let input = match pending.import.take() {
            Some(source) => {
                // Directory requests made after the import run afterwards.
                state.pending = pending;
                self.emit(ScanEvent::ImportStarted);
                JobInput::Import(source)
            }
            None => {
                let folders: BTreeSet<PathBuf> =
                    self.resolver.collection_folders().into_iter().collect();
                let (scan_type, directories) = if pending.full {
                    (ScanType::Full, folders)
                } else if pending.directories == folders {
                    (ScanType::UpdateScan, pending.directories)
                } else {
                    (ScanType::PartialUpdateScan, pending.directories)
                };
                let directories: Vec<PathBuf> = directories.into_iter().collect();
                info!(%scan_type, directories = directories.len(), "Starting collection scan");
                self.emit(ScanEvent::Started {
                    scan_type,
                    directories: directories.clone(),
                });
                JobInput::Worker {
                    scan_type,
                    directories,
                }
            }
        };

        let id = state.next_job_id;
        state.next_job_id += 1;
        let cancel = self.shutdown.child_token();
        state.running = Some(RunningJob {
            id,
            cancel: cancel.clone(),
            abort_reason: None,
        });
        self.idle_tx.send_replace(false);

        let job = ScanJob {
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
            resolver: Arc::clone(&self.resolver),
            playlists: Arc::clone(&self.playlists),
            cancel,
            events: self.events_tx.clone(),
        };
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let started = Instant::now();
            let result = job.run(input).await;
            inner.job_finished(id, result, started);
        });
    }

    fn job_finished(self: &Arc<Self>, id: u64, result: Result<JobOutcome, ScanError>, started: Instant) {
        let mut state = self.lock();
        let Some(job) = state.running.take_if(|job| job.id == id) else {
            warn!(job = id, "Finished job is not the running one");
            return;
        };

        let event = match result {
            Ok(outcome) => ScanEvent::Finished {
                scan_type: outcome.scan_type,
                summary: outcome.summary,
                elapsed: started.elapsed(),
            },
            Err(err) if err.is_cancellation() || job.cancel.is_cancelled() => {
                let reason = job
                    .abort_reason
                    .unwrap_or_else(|| "Scanner aborted".to_string());
                debug!(%reason, "Collection scan aborted");
                ScanEvent::Aborted { reason }
            }
            Err(err) => {
                error!(error = %err, "Collection scan failed");
                ScanEvent::Failed {
                    message: err.to_string(),
                }
            }
        };
        self.emit(event);

        if !self.shutdown.is_cancelled() {
            self.try_launch(&mut state);
        }
        if state.running.is_none() {
            self.idle_tx.send_replace(true);
        }
    }

    fn block(&self) {
        let mut state = self.lock();
        state.block_count += 1;
        debug!(blocks = state.block_count, "Scanning blocked");
        Self::abort_running(&mut state, "Scan blocked");
    }

    fn unblock(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.block_count == 0 {
            warn!("unblock_scan called without matching block_scan");
            return;
        }
        state.block_count -= 1;
        debug!(blocks = state.block_count, "Scanning unblocked");
        if state.block_count == 0 {
            let requested = state.blocked_requests.take();
            state.pending.merge(requested);
            self.try_launch(&mut state);
        }
    }
}

/// Schedules collection scans: merges requests, runs one worker at a time,
/// restarts crashed workers and reconciles results into the catalog.
///
/// All methods can be called from any thread. Must be created inside a
/// Tokio runtime.
pub struct ScanManager {
    inner: Arc<Inner>,
}

impl ScanManager {
    /// Create an orchestrator on the current Tokio runtime.
    pub fn new(
        config: ScannerConfig,
        catalog: Arc<dyn Catalog>,
        resolver: Arc<DeviceResolver>,
        playlists: Arc<dyn PlaylistImporter>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        let (idle_tx, _) = watch::channel(true);
        let inner = Arc::new(Inner {
            config: Arc::new(config),
            catalog,
            resolver,
            playlists,
            runtime: Handle::current(),
            state: Mutex::new(ManagerState::default()),
            events_tx,
            idle_tx,
            shutdown: CancellationToken::new(),
        });

        if inner.config.check_version {
            spawn_version_check(&inner);
        }
        if inner.config.monitor_changes {
            spawn_folder_watch(&inner);
        }
        Self { inner }
    }

    /// Subscribe to scan events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.inner.events_tx.subscribe()
    }

    /// The orchestrator's configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// Queue a request and launch a scan if possible.
    pub fn request(&self, request: ScanRequest) {
        self.inner.request(request);
    }

    /// Re-read the whole collection.
    pub fn request_full_scan(&self) {
        self.request(ScanRequest::Full);
    }

    /// Rescan one directory, or the whole collection when `directory` is
    /// `None`, skipping unchanged directories. Directories outside the
    /// collection are ignored.
    pub fn request_incremental_scan(&self, directory: Option<&Path>) {
        match directory {
            Some(dir) => self.request(ScanRequest::IncrementalDirectory(dir.to_path_buf())),
            None => self.request(ScanRequest::IncrementalAll),
        }
    }

    /// Abort any scan and reconcile a saved scanner stream instead.
    pub fn request_import(&self, source: ImportSource) {
        self.request(ScanRequest::Import(source));
    }

    /// Prevent scans from starting and abort the running one. Calls nest.
    pub fn block_scan(&self) {
        self.inner.block();
    }

    /// Undo one [`ScanManager::block_scan`]; the last one launches anything
    /// requested meanwhile.
    pub fn unblock_scan(&self) {
        self.inner.unblock();
    }

    /// Abort the running scan, if any.
    pub fn abort(&self, reason: &str) {
        Inner::abort_running(&mut self.inner.lock(), reason);
    }

    /// Whether a scan is running.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running.is_some()
    }

    /// Wait until no scan is running.
    pub async fn wait_until_idle(&self) {
        let mut idle = self.inner.idle_tx.subscribe();
        // The sender lives as long as `self`.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

impl Drop for ScanManager {
    fn drop(&mut self) {
        Inner::abort_running(&mut self.inner.lock(), "Collection manager shut down");
        self.inner.shutdown.cancel();
    }
}

/// Compare the worker's version with ours once, after a delay.
fn spawn_version_check(inner: &Arc<Inner>) {
    let program = inner.config.scanner_path.clone();
    let delay = inner.config.version_check_delay();
    let events_tx = inner.events_tx.clone();
    let shutdown = inner.shutdown.clone();

    inner.runtime.spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        match worker_version(&program).await {
            Ok(found) if found == VERSION => debug!(version = %found, "Scanner version matches"),
            Ok(found) => {
                warn!(expected = VERSION, %found, "The collection scanner version does not match");
                let _ = events_tx.send(ScanEvent::VersionMismatch {
                    expected: VERSION.to_string(),
                    found,
                });
            }
            Err(err) => warn!(error = %err, "Unable to check the collection scanner version"),
        }
    });
}

/// Request an incremental scan of the collection every watch interval.
fn spawn_folder_watch(inner: &Arc<Inner>) {
    let weak = Arc::downgrade(inner);
    let interval = inner.config.watch_interval();
    let shutdown = inner.shutdown.clone();

    inner.runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    debug!("Checking collection folders for changes");
                    inner.request(ScanRequest::IncrementalAll);
                }
            }
        }
    });
}
