//! Interfaces of the persistent collection catalog and the playlist store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::ids::{DeviceId, DirectoryId, TrackId};
use crate::record::{FieldPolicy, TrackRecord};

/// Device-independent location of a file or directory: the device it lives
/// on and its path relative to that device's mount point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub device_id: DeviceId,
    pub rpath: PathBuf,
}

impl Location {
    /// Create a new location.
    pub fn new(device_id: DeviceId, rpath: impl Into<PathBuf>) -> Self {
        Self {
            device_id,
            rpath: rpath.into(),
        }
    }
}

/// A directory row as the catalog knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDirectory {
    pub id: DirectoryId,
    pub location: Location,
    pub mtime: u64,
}

/// Change notification emitted by a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    /// The catalog content changed. `generation` increases with every
    /// notification.
    Changed { generation: u64 },
}

/// Persistent store the reconciler writes into.
///
/// Implementations must stay readable by other threads while a scan
/// commits. Change notifications can be suppressed in nested pairs; a
/// notification for everything that changed meanwhile is emitted when the
/// outermost suppression is released.
pub trait Catalog: Send + Sync {
    /// Insert a directory or update the mtime of an existing one.
    fn upsert_directory(&self, location: &Location, mtime: u64)
    -> Result<DirectoryId, CatalogError>;

    /// Insert or update a track. Existing tracks are matched by unique id
    /// first and by location second.
    fn upsert_track(
        &self,
        directory: DirectoryId,
        location: &Location,
        track: &TrackRecord,
        policy: FieldPolicy,
    ) -> Result<TrackId, CatalogError>;

    /// Remove one track.
    fn delete_track(&self, id: TrackId) -> Result<(), CatalogError>;

    /// Remove a directory and every track in it. Returns the number of
    /// tracks removed.
    fn delete_directory(&self, id: DirectoryId) -> Result<usize, CatalogError>;

    /// Every directory in the catalog.
    fn known_directories(&self) -> Result<Vec<KnownDirectory>, CatalogError>;

    /// Tracks currently stored for a directory.
    fn known_track_ids(&self, directory: DirectoryId) -> Result<BTreeSet<TrackId>, CatalogError>;

    fn suppress_change_notifications(&self);

    fn resume_change_notifications(&self);
}

/// Receives playlist files found by a scan.
pub trait PlaylistImporter: Send + Sync {
    /// Import (or refresh) the playlist at `path`.
    fn import(&self, path: &Path) -> Result<(), CatalogError>;
}

/// Importer that ignores every playlist.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlaylistImporter;

impl PlaylistImporter for NoopPlaylistImporter {
    fn import(&self, _path: &Path) -> Result<(), CatalogError> {
        Ok(())
    }
}

/// Importer that remembers every playlist it was given.
#[derive(Debug, Default)]
pub struct RecordingPlaylistImporter {
    imported: Mutex<Vec<PathBuf>>,
}

impl RecordingPlaylistImporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Playlists imported so far, in order.
    pub fn imported(&self) -> Vec<PathBuf> {
        self.imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlaylistImporter for RecordingPlaylistImporter {
    fn import(&self, path: &Path) -> Result<(), CatalogError> {
        self.imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_importer() {
        let importer = RecordingPlaylistImporter::new();
        importer.import(Path::new("/m/a.m3u")).unwrap();
        importer.import(Path::new("/m/b.pls")).unwrap();
        assert_eq!(
            importer.imported(),
            vec![PathBuf::from("/m/a.m3u"), PathBuf::from("/m/b.pls")]
        );
    }

    #[test]
    fn test_location_ordering() {
        let a = Location::new(DeviceId::NONE, "music/a");
        let b = Location::new(DeviceId::new(1), "music/a");
        assert!(a < b);
    }
}
