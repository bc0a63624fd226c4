//! Scanning of a single directory into a [`DirectoryRecord`].

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, warn};

use medley_core::{AlbumRecord, DirectoryRecord, FileType, PlaylistRef, TrackRecord};

use crate::metadata::read_track;

const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls", "xspf"];

fn is_playlist(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PLAYLIST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn mtime_secs(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

/// Scan the files directly inside `path`.
///
/// In incremental mode a directory whose mtime equals `known_mtime` is
/// reported as skipped without reading its files. A known directory that
/// cannot be listed is also reported as skipped so its tracks survive.
pub fn scan_directory(path: &Path, known_mtime: Option<u64>, incremental: bool) -> DirectoryRecord {
    let mtime = mtime_secs(path).unwrap_or(0);
    if incremental && known_mtime == Some(mtime) {
        debug!(path = %path.display(), "Directory unchanged");
        return DirectoryRecord::new(path, mtime).skipped();
    }

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cannot list directory");
            return match known_mtime {
                Some(known) => DirectoryRecord::new(path, known).skipped(),
                None => DirectoryRecord::new(path, mtime),
            };
        }
    };

    let files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .sorted()
        .collect();

    let (audio, other): (Vec<PathBuf>, Vec<PathBuf>) = files
        .into_iter()
        .partition(|file| FileType::from_path(file) != FileType::Unknown);

    let tracks: Vec<TrackRecord> = audio
        .par_iter()
        .filter_map(|file| read_track(file))
        .collect();

    let mut record = DirectoryRecord::new(path, mtime);
    record.albums = group_albums(tracks);
    record.playlists = other
        .into_iter()
        .filter(|file| is_playlist(file))
        .map(|file| PlaylistRef {
            path: file,
            rpath: PathBuf::new(),
        })
        .collect();
    record
}

/// Group tracks by album tag, keeping file order. The album artist is the
/// tagged album artist or the one artist all tracks share.
fn group_albums(tracks: Vec<TrackRecord>) -> Vec<AlbumRecord> {
    let mut albums: IndexMap<String, Vec<TrackRecord>> = IndexMap::new();
    for track in tracks {
        albums
            .entry(track.album.clone().unwrap_or_default())
            .or_default()
            .push(track);
    }

    albums
        .into_iter()
        .map(|(name, tracks)| {
            let artist = tracks
                .iter()
                .map(|t| t.album_artist.as_ref())
                .all_equal_value()
                .ok()
                .flatten()
                .or_else(|| {
                    tracks
                        .iter()
                        .map(|t| t.artist.as_ref())
                        .all_equal_value()
                        .ok()
                        .flatten()
                })
                .cloned();
            AlbumRecord {
                name,
                artist,
                tracks,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tagged(uid: &str, album: Option<&str>, artist: Option<&str>) -> TrackRecord {
        let mut track = TrackRecord::new(uid, format!("/m/{uid}.mp3"));
        track.album = album.map(str::to_string);
        track.artist = artist.map(str::to_string);
        track
    }

    #[test]
    fn test_group_albums_by_tag() {
        let albums = group_albums(vec![
            tagged("1", Some("X"), Some("Band")),
            tagged("2", Some("Y"), Some("Other")),
            tagged("3", Some("X"), Some("Band")),
        ]);
        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].name, "X");
        assert_eq!(albums[0].artist.as_deref(), Some("Band"));
        assert_eq!(albums[0].tracks.len(), 2);
    }

    #[test]
    fn test_mixed_artists_have_no_album_artist() {
        let albums = group_albums(vec![
            tagged("1", Some("Hits"), Some("A")),
            tagged("2", Some("Hits"), Some("B")),
        ]);
        assert_eq!(albums[0].artist, None);
    }

    #[test]
    fn test_scan_directory_lists_audio_and_playlists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("02.flac"), b"two").unwrap();
        fs::write(dir.path().join("01.mp3"), b"one").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"img").unwrap();
        fs::write(dir.path().join("all.m3u"), b"01.mp3\n").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let record = scan_directory(dir.path(), None, false);
        assert!(!record.skipped);
        let paths: Vec<_> = record.tracks().map(|t| t.path.clone()).collect();
        assert_eq!(
            paths,
            vec![dir.path().join("01.mp3"), dir.path().join("02.flac")]
        );
        assert_eq!(record.playlists.len(), 1);
        assert_eq!(record.playlists[0].path, dir.path().join("all.m3u"));
    }

    #[test]
    fn test_unchanged_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01.mp3"), b"one").unwrap();
        let mtime = mtime_secs(dir.path()).unwrap();

        let record = scan_directory(dir.path(), Some(mtime), true);
        assert!(record.skipped);
        assert_eq!(record.track_count(), 0);

        // a full scan reads it anyway
        let record = scan_directory(dir.path(), Some(mtime), false);
        assert!(!record.skipped);
        assert_eq!(record.track_count(), 1);
    }
}
