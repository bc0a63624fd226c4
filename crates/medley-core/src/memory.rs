//! Thread-safe in-memory catalog with JSON snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::catalog::{Catalog, CatalogEvent, KnownDirectory, Location};
use crate::error::CatalogError;
use crate::ids::{DirectoryId, TrackId};
use crate::record::{FieldPolicy, TrackRecord};

/// A track row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: TrackId,
    pub directory: DirectoryId,
    pub location: Location,
    pub record: TrackRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_directory: u64,
    next_track: u64,
    directories: Vec<KnownDirectory>,
    tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Default)]
struct State {
    next_directory: u64,
    next_track: u64,
    directories: BTreeMap<DirectoryId, KnownDirectory>,
    directory_at: HashMap<Location, DirectoryId>,
    tracks: BTreeMap<TrackId, CatalogTrack>,
    track_by_uid: HashMap<String, TrackId>,
    track_at: HashMap<Location, TrackId>,
    suppress_depth: u32,
    dirty: bool,
    generation: u64,
}

impl State {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = State {
            next_directory: snapshot.next_directory,
            next_track: snapshot.next_track,
            ..Default::default()
        };
        for dir in snapshot.directories {
            state.directory_at.insert(dir.location.clone(), dir.id);
            state.next_directory = state.next_directory.max(dir.id.0 + 1);
            state.directories.insert(dir.id, dir);
        }
        for track in snapshot.tracks {
            state.index_track(&track);
            state.next_track = state.next_track.max(track.id.0 + 1);
            state.tracks.insert(track.id, track);
        }
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            next_directory: self.next_directory,
            next_track: self.next_track,
            directories: self.directories.values().cloned().collect(),
            tracks: self.tracks.values().cloned().collect(),
        }
    }

    fn index_track(&mut self, track: &CatalogTrack) {
        if !track.record.unique_id.is_empty() {
            self.track_by_uid
                .insert(track.record.unique_id.clone(), track.id);
        }
        self.track_at.insert(track.location.clone(), track.id);
    }

    fn unindex_track(&mut self, track: &CatalogTrack) {
        if self.track_by_uid.get(&track.record.unique_id) == Some(&track.id) {
            self.track_by_uid.remove(&track.record.unique_id);
        }
        if self.track_at.get(&track.location) == Some(&track.id) {
            self.track_at.remove(&track.location);
        }
    }

    fn remove_track(&mut self, id: TrackId) -> Option<CatalogTrack> {
        let track = self.tracks.remove(&id)?;
        self.unindex_track(&track);
        Some(track)
    }
}

/// Reference [`Catalog`] keeping everything in memory behind one mutex.
///
/// Readers take the same lock for the duration of a single query, so the
/// catalog stays queryable while a scan commits.
#[derive(Debug)]
pub struct MemoryCatalog {
    state: Mutex<State>,
    events_tx: broadcast::Sender<CatalogEvent>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::with_state(State::default())
    }

    fn with_state(state: State) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(state),
            events_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events_tx.subscribe()
    }

    /// Load a snapshot written by [`MemoryCatalog::save`].
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path).map_err(|source| CatalogError::Storage {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(Self::with_state(State::from_snapshot(snapshot)))
    }

    /// Load a snapshot, or start empty if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, CatalogError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Write the whole catalog as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let json = serde_json::to_vec_pretty(&self.lock().to_snapshot())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Storage {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| CatalogError::Storage {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of directories.
    pub fn directory_count(&self) -> usize {
        self.lock().directories.len()
    }

    /// Number of tracks.
    pub fn track_count(&self) -> usize {
        self.lock().tracks.len()
    }

    /// Directory stored at a location.
    pub fn directory_at(&self, location: &Location) -> Option<KnownDirectory> {
        let state = self.lock();
        state
            .directory_at
            .get(location)
            .and_then(|id| state.directories.get(id))
            .cloned()
    }

    /// Every track, ordered by id.
    pub fn tracks(&self) -> Vec<CatalogTrack> {
        self.lock().tracks.values().cloned().collect()
    }

    /// Look up a track.
    pub fn track(&self, id: TrackId) -> Option<CatalogTrack> {
        self.lock().tracks.get(&id).cloned()
    }

    /// Look up a track by its unique id.
    pub fn track_by_uid(&self, unique_id: &str) -> Option<CatalogTrack> {
        let state = self.lock();
        state
            .track_by_uid
            .get(unique_id)
            .and_then(|id| state.tracks.get(id))
            .cloned()
    }

    /// Tracks stored in a directory, ordered by id.
    pub fn tracks_in(&self, directory: DirectoryId) -> Vec<CatalogTrack> {
        self.lock()
            .tracks
            .values()
            .filter(|t| t.directory == directory)
            .cloned()
            .collect()
    }

    /// Number of change notifications emitted so far.
    pub fn notifications_sent(&self) -> u64 {
        self.lock().generation
    }

    /// Whether notifications are currently held back.
    pub fn notifications_suppressed(&self) -> bool {
        self.lock().suppress_depth > 0
    }

    /// Record a modification and notify unless suppressed.
    fn changed(&self, state: &mut State) {
        state.dirty = true;
        if state.suppress_depth == 0 {
            self.flush(state);
        }
    }

    fn flush(&self, state: &mut State) {
        if !state.dirty {
            return;
        }
        state.dirty = false;
        state.generation += 1;
        // No subscribers is fine.
        let _ = self.events_tx.send(CatalogEvent::Changed {
            generation: state.generation,
        });
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for MemoryCatalog {
    fn upsert_directory(
        &self,
        location: &Location,
        mtime: u64,
    ) -> Result<DirectoryId, CatalogError> {
        let mut state = self.lock();
        let id = match state.directory_at.get(location).copied() {
            Some(id) => {
                let dir = state
                    .directories
                    .get_mut(&id)
                    .ok_or(CatalogError::UnknownDirectory(id))?;
                if dir.mtime == mtime {
                    return Ok(id);
                }
                dir.mtime = mtime;
                id
            }
            None => {
                let id = DirectoryId::new(state.next_directory);
                state.next_directory += 1;
                state.directory_at.insert(location.clone(), id);
                state.directories.insert(
                    id,
                    KnownDirectory {
                        id,
                        location: location.clone(),
                        mtime,
                    },
                );
                id
            }
        };
        self.changed(&mut state);
        Ok(id)
    }

    fn upsert_track(
        &self,
        directory: DirectoryId,
        location: &Location,
        track: &TrackRecord,
        policy: FieldPolicy,
    ) -> Result<TrackId, CatalogError> {
        let mut state = self.lock();
        if !state.directories.contains_key(&directory) {
            return Err(CatalogError::UnknownDirectory(directory));
        }

        let by_uid = state.track_by_uid.get(&track.unique_id).copied();
        let at_location = state.track_at.get(location).copied();

        let id = match by_uid.or(at_location) {
            Some(id) => {
                // An older file at the same location is replaced by the
                // track that moved there.
                if let Some(other) = at_location.filter(|other| *other != id) {
                    debug!(track = %other, "Removing track replaced at its location");
                    state.remove_track(other);
                }
                let mut stored = state
                    .remove_track(id)
                    .ok_or(CatalogError::UnknownTrack(id))?;
                stored.record.apply(track, policy);
                stored.directory = directory;
                stored.location = location.clone();
                state.index_track(&stored);
                state.tracks.insert(id, stored);
                id
            }
            None => {
                let id = TrackId::new(state.next_track);
                state.next_track += 1;
                let stored = CatalogTrack {
                    id,
                    directory,
                    location: location.clone(),
                    record: track.clone(),
                };
                state.index_track(&stored);
                state.tracks.insert(id, stored);
                id
            }
        };
        self.changed(&mut state);
        Ok(id)
    }

    fn delete_track(&self, id: TrackId) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state
            .remove_track(id)
            .ok_or(CatalogError::UnknownTrack(id))?;
        self.changed(&mut state);
        Ok(())
    }

    fn delete_directory(&self, id: DirectoryId) -> Result<usize, CatalogError> {
        let mut state = self.lock();
        let dir = state
            .directories
            .remove(&id)
            .ok_or(CatalogError::UnknownDirectory(id))?;
        state.directory_at.remove(&dir.location);

        let doomed: Vec<TrackId> = state
            .tracks
            .values()
            .filter(|t| t.directory == id)
            .map(|t| t.id)
            .collect();
        for track in &doomed {
            state.remove_track(*track);
        }
        self.changed(&mut state);
        Ok(doomed.len())
    }

    fn known_directories(&self) -> Result<Vec<KnownDirectory>, CatalogError> {
        Ok(self.lock().directories.values().cloned().collect())
    }

    fn known_track_ids(&self, directory: DirectoryId) -> Result<BTreeSet<TrackId>, CatalogError> {
        Ok(self
            .lock()
            .tracks
            .values()
            .filter(|t| t.directory == directory)
            .map(|t| t.id)
            .collect())
    }

    fn suppress_change_notifications(&self) {
        self.lock().suppress_depth += 1;
    }

    fn resume_change_notifications(&self) {
        let mut state = self.lock();
        state.suppress_depth = state.suppress_depth.saturating_sub(1);
        if state.suppress_depth == 0 {
            self.flush(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeviceId;

    fn loc(rpath: &str) -> Location {
        Location::new(DeviceId::NONE, rpath)
    }

    #[test]
    fn test_upsert_directory_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let a = catalog.upsert_directory(&loc("m/a"), 1).unwrap();
        let again = catalog.upsert_directory(&loc("m/a"), 2).unwrap();
        assert_eq!(a, again);
        assert_eq!(catalog.directory_count(), 1);
        assert_eq!(catalog.directory_at(&loc("m/a")).unwrap().mtime, 2);
    }

    #[test]
    fn test_track_found_by_uid_after_move() {
        let catalog = MemoryCatalog::new();
        let a = catalog.upsert_directory(&loc("m/a"), 1).unwrap();
        let b = catalog.upsert_directory(&loc("m/b"), 1).unwrap();

        let track = TrackRecord::new("uid-1", "/m/a/x.mp3");
        let id = catalog
            .upsert_track(a, &loc("m/a/x.mp3"), &track, FieldPolicy::Merge)
            .unwrap();

        let moved = TrackRecord::new("uid-1", "/m/b/x.mp3");
        let id2 = catalog
            .upsert_track(b, &loc("m/b/x.mp3"), &moved, FieldPolicy::Merge)
            .unwrap();

        assert_eq!(id, id2);
        assert_eq!(catalog.track_count(), 1);
        assert!(catalog.known_track_ids(a).unwrap().is_empty());
        assert_eq!(catalog.track(id).unwrap().directory, b);
    }

    #[test]
    fn test_new_uid_at_occupied_location_replaces_old_track() {
        let catalog = MemoryCatalog::new();
        let a = catalog.upsert_directory(&loc("m/a"), 1).unwrap();
        let old = catalog
            .upsert_track(a, &loc("m/a/x.mp3"), &TrackRecord::new("old", "/m/a/x.mp3"), FieldPolicy::Merge)
            .unwrap();
        let new = catalog
            .upsert_track(a, &loc("m/a/x.mp3"), &TrackRecord::new("new", "/m/a/x.mp3"), FieldPolicy::Merge)
            .unwrap();

        // matched by location, so the row is reused with the new identity
        assert_eq!(old, new);
        assert_eq!(catalog.track_count(), 1);
        assert!(catalog.track_by_uid("old").is_none());
        assert!(catalog.track_by_uid("new").is_some());
    }

    #[test]
    fn test_delete_directory_removes_tracks() {
        let catalog = MemoryCatalog::new();
        let a = catalog.upsert_directory(&loc("m/a"), 1).unwrap();
        for n in 0..3 {
            let path = format!("m/a/{n}.mp3");
            catalog
                .upsert_track(a, &loc(&path), &TrackRecord::new(format!("u{n}"), &path), FieldPolicy::Merge)
                .unwrap();
        }
        assert_eq!(catalog.delete_directory(a).unwrap(), 3);
        assert_eq!(catalog.track_count(), 0);
        assert!(matches!(
            catalog.delete_directory(a),
            Err(CatalogError::UnknownDirectory(_))
        ));
    }

    #[test]
    fn test_nested_suppression_notifies_once() {
        let catalog = MemoryCatalog::new();
        let mut rx = catalog.subscribe();

        catalog.suppress_change_notifications();
        catalog.suppress_change_notifications();
        catalog.upsert_directory(&loc("m/a"), 1).unwrap();
        catalog.upsert_directory(&loc("m/b"), 1).unwrap();
        catalog.resume_change_notifications();
        assert_eq!(catalog.notifications_sent(), 0);
        catalog.resume_change_notifications();

        assert_eq!(catalog.notifications_sent(), 1);
        assert_eq!(rx.try_recv().unwrap(), CatalogEvent::Changed { generation: 1 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let catalog = MemoryCatalog::new();
        let a = catalog.upsert_directory(&loc("m/a"), 7).unwrap();
        let mut track = TrackRecord::new("uid-1", "/m/a/x.mp3");
        track.title = Some("X".into());
        catalog
            .upsert_track(a, &loc("m/a/x.mp3"), &track, FieldPolicy::Replace)
            .unwrap();
        catalog.save(&path).unwrap();

        let loaded = MemoryCatalog::load(&path).unwrap();
        assert_eq!(loaded.directory_count(), 1);
        let stored = loaded.track_by_uid("uid-1").unwrap();
        assert_eq!(stored.record.title.as_deref(), Some("X"));

        // ids keep increasing after a reload
        let b = loaded.upsert_directory(&loc("m/b"), 1).unwrap();
        assert!(b > a);
    }
}
