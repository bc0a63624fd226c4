//! Reconciliation of scan results into the catalog.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medley_core::{
    Catalog, DirectoryId, DirectoryRecord, PlaylistImporter, ScanError, ScanType, TrackId,
};
use medley_devices::DeviceResolver;

use crate::events::CommitSummary;

/// Default longest stretch without a catalog change notification.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(5);

/// Holds catalog notifications back while committing, letting one through
/// every `interval` so readers see progress on long scans.
struct NotificationGuard<'a> {
    catalog: &'a dyn Catalog,
    interval: Duration,
    since: Instant,
}

impl<'a> NotificationGuard<'a> {
    fn new(catalog: &'a dyn Catalog, interval: Duration) -> Self {
        catalog.suppress_change_notifications();
        Self {
            catalog,
            interval,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        if self.since.elapsed() >= self.interval {
            self.catalog.resume_change_notifications();
            self.catalog.suppress_change_notifications();
            self.since = Instant::now();
        }
    }
}

impl Drop for NotificationGuard<'_> {
    fn drop(&mut self) {
        self.catalog.resume_change_notifications();
    }
}

/// What one commit pass has seen so far.
#[derive(Debug, Default)]
struct ReconciliationSession {
    found_directories: HashSet<DirectoryId>,
    /// Unique ids committed so far and the catalog track they went to.
    found_unique_ids: HashMap<String, TrackId>,
    summary: CommitSummary,
}

impl ReconciliationSession {
    fn error(&mut self, message: String) {
        warn!("{message}");
        self.summary.errors.push(message);
    }
}

/// Buffers directory records of one scan and merges them into the catalog.
pub struct ResultReconciler {
    catalog: Arc<dyn Catalog>,
    resolver: Arc<DeviceResolver>,
    playlists: Arc<dyn PlaylistImporter>,
    scan_type: ScanType,
    notify_interval: Duration,
    directories: IndexMap<PathBuf, DirectoryRecord>,
}

impl ResultReconciler {
    /// Create a reconciler for one scan.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        resolver: Arc<DeviceResolver>,
        playlists: Arc<dyn PlaylistImporter>,
        scan_type: ScanType,
    ) -> Self {
        Self {
            catalog,
            resolver,
            playlists,
            scan_type,
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
            directories: IndexMap::new(),
        }
    }

    /// Set how often notifications are let through while committing.
    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    /// Change the scan type before committing.
    pub fn set_scan_type(&mut self, scan_type: ScanType) {
        self.scan_type = scan_type;
    }

    /// Buffer one directory for the next commit.
    ///
    /// A second unit for the same path replaces the first one, keeping its
    /// place in the commit order.
    pub fn add_directory(&mut self, directory: DirectoryRecord) {
        if let Some(previous) = self.directories.insert(directory.path.clone(), directory) {
            debug!(path = %previous.path.display(), "Directory reported twice, keeping the latest unit");
        }
    }

    /// Number of buffered directories.
    pub fn pending(&self) -> usize {
        self.directories.len()
    }

    /// Drop every buffered directory. Already committed directories stay.
    pub fn rollback(&mut self) -> usize {
        let dropped = self.directories.len();
        if dropped > 0 {
            debug!(dropped, "Rolling back uncommitted directories");
        }
        self.directories.clear();
        dropped
    }

    /// Commit every buffered directory, then delete what the scan did not
    /// confirm if the scan type covers the whole collection.
    ///
    /// `cancel` is checked before each directory; on cancellation the
    /// directories committed so far stay and the rest are dropped.
    pub fn commit(&mut self, cancel: &CancellationToken) -> Result<CommitSummary, ScanError> {
        let catalog = Arc::clone(&self.catalog);
        let mut guard = NotificationGuard::new(catalog.as_ref(), self.notify_interval);
        let mut session = ReconciliationSession::default();
        let directories = mem::take(&mut self.directories);
        let total = directories.len();

        for (index, directory) in directories.into_values().enumerate() {
            if cancel.is_cancelled() {
                debug!(committed = index, dropped = total - index, "Commit interrupted");
                return Err(ScanError::Aborted {
                    reason: "commit interrupted".to_string(),
                });
            }
            self.commit_directory(&directory, &mut session)?;
            guard.tick();
        }

        if self.scan_type.covers_whole_tree() {
            if cancel.is_cancelled() {
                return Err(ScanError::Aborted {
                    reason: "commit interrupted".to_string(),
                });
            }
            self.delete_unconfirmed(&mut session)?;
        }

        let summary = session.summary;
        info!(
            scan_type = %self.scan_type,
            directories = summary.directories,
            tracks = summary.tracks_upserted,
            deleted_tracks = summary.tracks_deleted,
            deleted_directories = summary.directories_deleted,
            errors = summary.errors.len(),
            "Scan results committed"
        );
        Ok(summary)
    }

    fn commit_directory(
        &self,
        directory: &DirectoryRecord,
        session: &mut ReconciliationSession,
    ) -> Result<(), ScanError> {
        let location = self.resolver.locate(&directory.path);
        let dir_id = self.catalog.upsert_directory(&location, directory.mtime)?;
        session.found_directories.insert(dir_id);
        session.summary.directories += 1;

        if directory.skipped {
            session.summary.skipped += 1;
            return Ok(());
        }

        let policy = self.scan_type.field_policy();
        let mut confirmed: BTreeSet<TrackId> = BTreeSet::new();
        for track in directory.tracks() {
            if track.unique_id.is_empty() {
                session.error(format!(
                    "Track {} has no unique id, not adding",
                    track.path.display()
                ));
                continue;
            }
            if track.path.as_os_str().is_empty() {
                session.error(format!("Track {} has no path, not adding", track.unique_id));
                continue;
            }
            if let Some(&existing) = session.found_unique_ids.get(&track.unique_id) {
                confirmed.insert(existing);
                session.error(format!(
                    "Track {} with unique id {} was already added in this scan, skipping duplicate",
                    track.path.display(),
                    track.unique_id
                ));
                continue;
            }

            let track_location = self.resolver.locate(&track.path);
            match self
                .catalog
                .upsert_track(dir_id, &track_location, track, policy)
            {
                Ok(id) => {
                    confirmed.insert(id);
                    session.found_unique_ids.insert(track.unique_id.clone(), id);
                    session.summary.tracks_upserted += 1;
                }
                Err(err) => session.error(format!(
                    "Failed to store track {}: {err}",
                    track.path.display()
                )),
            }
        }

        for playlist in &directory.playlists {
            if let Err(err) = self.playlists.import(&playlist.path) {
                session.error(format!(
                    "Failed to import playlist {}: {err}",
                    playlist.path.display()
                ));
            }
        }

        for stale in self.catalog.known_track_ids(dir_id)?.difference(&confirmed) {
            self.catalog.delete_track(*stale)?;
            session.summary.tracks_deleted += 1;
        }
        Ok(())
    }

    /// Remove catalog directories on live devices that this scan did not
    /// see. Directories on unplugged devices are left alone.
    fn delete_unconfirmed(&self, session: &mut ReconciliationSession) -> Result<(), ScanError> {
        let live = self.resolver.live_device_ids();
        for known in self.catalog.known_directories()? {
            if session.found_directories.contains(&known.id)
                || !live.contains(&known.location.device_id)
            {
                continue;
            }
            debug!(directory = %known.location.rpath.display(), device_id = %known.location.device_id, "Deleting directory no longer on disk");
            let tracks = self.catalog.delete_directory(known.id)?;
            session.summary.directories_deleted += 1;
            session.summary.tracks_deleted += tracks as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::{
        AlbumRecord, MemoryCatalog, NoopPlaylistImporter, RecordingPlaylistImporter, TrackRecord,
    };
    use medley_devices::DeviceTable;

    fn setup(scan_type: ScanType) -> (Arc<MemoryCatalog>, ResultReconciler) {
        let catalog = Arc::new(MemoryCatalog::new());
        let resolver = Arc::new(DeviceResolver::new(Arc::new(DeviceTable::in_memory())));
        let reconciler = ResultReconciler::new(
            catalog.clone(),
            resolver,
            Arc::new(NoopPlaylistImporter),
            scan_type,
        );
        (catalog, reconciler)
    }

    fn dir(path: &str, uids: &[&str]) -> DirectoryRecord {
        let album = uids.iter().fold(AlbumRecord::new("A"), |album, uid| {
            album.with_track(TrackRecord::new(*uid, format!("{path}/{uid}.mp3")))
        });
        DirectoryRecord::new(path, 1).with_album(album)
    }

    #[test]
    fn test_rollback_discards_buffer() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        reconciler.add_directory(dir("/m/a", &["1"]));
        assert_eq!(reconciler.rollback(), 1);

        let summary = reconciler.commit(&CancellationToken::new()).unwrap();
        assert_eq!(summary.directories, 0);
        assert_eq!(catalog.track_count(), 0);
    }

    #[test]
    fn test_track_without_unique_id_is_not_added() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        reconciler.add_directory(dir("/m/a", &["", "2"]));

        let summary = reconciler.commit(&CancellationToken::new()).unwrap();
        assert_eq!(catalog.track_count(), 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn test_duplicate_unique_id_is_skipped() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        reconciler.add_directory(dir("/m/a", &["1"]));
        let mut copy = dir("/m/b", &[]);
        copy.albums[0]
            .tracks
            .push(TrackRecord::new("1", "/m/b/copy.mp3"));
        reconciler.add_directory(copy);

        let summary = reconciler.commit(&CancellationToken::new()).unwrap();
        assert_eq!(catalog.track_count(), 1);
        assert_eq!(summary.tracks_upserted, 1);
        assert!(summary.errors[0].contains("duplicate"));
        assert_eq!(
            catalog.track_by_uid("1").unwrap().record.path,
            std::path::PathBuf::from("/m/a/1.mp3")
        );
    }

    #[test]
    fn test_playlists_are_imported() {
        let catalog = Arc::new(MemoryCatalog::new());
        let resolver = Arc::new(DeviceResolver::new(Arc::new(DeviceTable::in_memory())));
        let importer = Arc::new(RecordingPlaylistImporter::new());
        let mut reconciler =
            ResultReconciler::new(catalog, resolver, importer.clone(), ScanType::UpdateScan);

        reconciler.add_directory(dir("/m/a", &["1"]).with_playlist("/m/a/best.m3u"));
        reconciler.commit(&CancellationToken::new()).unwrap();

        assert_eq!(
            importer.imported(),
            vec![std::path::PathBuf::from("/m/a/best.m3u")]
        );
    }

    #[test]
    fn test_notifications_released_after_commit() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        reconciler.add_directory(dir("/m/a", &["1", "2"]));
        reconciler.add_directory(dir("/m/b", &["3"]));
        reconciler.commit(&CancellationToken::new()).unwrap();

        assert!(!catalog.notifications_suppressed());
        assert_eq!(catalog.notifications_sent(), 1);
    }

    #[test]
    fn test_notifications_released_during_long_commit() {
        let (catalog, reconciler) = setup(ScanType::Full);
        let mut reconciler = reconciler.with_notify_interval(Duration::ZERO);
        reconciler.add_directory(dir("/m/a", &["1"]));
        reconciler.add_directory(dir("/m/b", &["2"]));
        reconciler.add_directory(dir("/m/c", &["3"]));
        reconciler.commit(&CancellationToken::new()).unwrap();

        assert_eq!(catalog.notifications_sent(), 3);
        assert!(!catalog.notifications_suppressed());
    }

    #[test]
    fn test_repeated_unit_keeps_its_tracks() {
        let (catalog, reconciler) = setup(ScanType::Full);
        let mut session = ReconciliationSession::default();
        reconciler
            .commit_directory(&dir("/m/a", &["1", "2"]), &mut session)
            .unwrap();
        reconciler
            .commit_directory(&dir("/m/a", &["1", "2"]), &mut session)
            .unwrap();

        assert_eq!(catalog.track_count(), 2);
        assert_eq!(session.summary.tracks_deleted, 0);
        assert!(catalog.track_by_uid("1").is_some());
        assert!(catalog.track_by_uid("2").is_some());
    }

    #[test]
    fn test_same_path_buffered_twice_is_committed_once() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        reconciler.add_directory(dir("/m/a", &["1", "2"]));
        reconciler.add_directory(dir("/m/b", &["3"]));
        reconciler.add_directory(dir("/m/a", &["1", "2"]));
        assert_eq!(reconciler.pending(), 2);

        let summary = reconciler.commit(&CancellationToken::new()).unwrap();
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.tracks_upserted, 3);
        assert_eq!(summary.tracks_deleted, 0);
        assert!(summary.errors.is_empty());
        assert_eq!(catalog.track_count(), 3);
    }

    #[test]
    fn test_notifications_released_on_error() {
        let (catalog, mut reconciler) = setup(ScanType::Full);
        let cancel = CancellationToken::new();
        cancel.cancel();
        reconciler.add_directory(dir("/m/a", &["1"]));

        assert!(reconciler.commit(&cancel).is_err());
        assert!(!catalog.notifications_suppressed());
    }
}
