//! Records produced by the scanner worker, one [`DirectoryRecord`] per
//! scanned directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Audio container/codec family of a track.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Mp3,
    Ogg,
    Flac,
    Mp4,
    Wma,
    Opus,
    Wav,
    Aiff,
    Ape,
    Mpc,
    #[default]
    Unknown,
}

impl FileType {
    /// Guess the file type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "flac" => Self::Flac,
            "m4a" | "mp4" | "aac" => Self::Mp4,
            "wma" => Self::Wma,
            "opus" => Self::Opus,
            "wav" => Self::Wav,
            "aif" | "aiff" => Self::Aiff,
            "ape" => Self::Ape,
            "mpc" => Self::Mpc,
            _ => Self::Unknown,
        }
    }

    /// Guess the file type of a path from its extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or_default()
    }
}

/// How incoming track fields are merged into an existing catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Every field is taken from the scan, including absent ones.
    Replace,
    /// Only fields the scanner reported are taken; statistics are only
    /// filled in where the catalog has none yet.
    Merge,
}

/// Metadata of one audio file as reported by the worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Content-derived identity, stable across renames and moves.
    pub unique_id: String,
    /// Absolute path at scan time.
    pub path: PathBuf,
    /// Path relative to the device the file lives on.
    pub rpath: PathBuf,
    pub file_type: FileType,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub compilation: bool,
    pub no_compilation: bool,
    pub has_cover: bool,
    pub comment: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub year: Option<i32>,
    pub disc: Option<u32>,
    pub track_number: Option<u32>,
    pub bpm: Option<f32>,
    /// Bitrate in kbit/s.
    pub bitrate: Option<u32>,
    /// Length in milliseconds.
    pub length_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub file_size: Option<u64>,
    /// File modification time, seconds since the epoch.
    pub modified: Option<i64>,
    pub track_gain: Option<f32>,
    pub track_peak_gain: Option<f32>,
    pub album_gain: Option<f32>,
    pub album_peak_gain: Option<f32>,
    pub rating: Option<f32>,
    pub score: Option<f32>,
    pub play_count: Option<u32>,
}

impl TrackRecord {
    /// Create a track record with only its identity and location set.
    pub fn new(unique_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            unique_id: unique_id.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Merge a freshly scanned record into this (stored) one.
    pub fn apply(&mut self, scanned: &TrackRecord, policy: FieldPolicy) {
        let replace = policy == FieldPolicy::Replace;

        self.unique_id.clone_from(&scanned.unique_id);
        self.path.clone_from(&scanned.path);
        self.rpath.clone_from(&scanned.rpath);
        self.file_type = scanned.file_type;
        self.file_size = scanned.file_size.or(self.file_size);

        merge(&mut self.title, &scanned.title, replace);
        merge(&mut self.artist, &scanned.artist, replace);
        merge(&mut self.album_artist, &scanned.album_artist, replace);
        merge(&mut self.album, &scanned.album, replace);
        merge(&mut self.comment, &scanned.comment, replace);
        merge(&mut self.genre, &scanned.genre, replace);
        merge(&mut self.composer, &scanned.composer, replace);
        merge(&mut self.year, &scanned.year, replace);
        merge(&mut self.bpm, &scanned.bpm, replace);

        fill(&mut self.disc, &scanned.disc, replace);
        fill(&mut self.track_number, &scanned.track_number, replace);
        fill(&mut self.bitrate, &scanned.bitrate, replace);
        fill(&mut self.length_ms, &scanned.length_ms, replace);
        fill(&mut self.sample_rate, &scanned.sample_rate, replace);
        fill(&mut self.modified, &scanned.modified, replace);
        fill(&mut self.rating, &scanned.rating, replace);
        fill(&mut self.score, &scanned.score, replace);

        for (stored, fresh) in [
            (&mut self.track_gain, scanned.track_gain),
            (&mut self.track_peak_gain, scanned.track_peak_gain),
            (&mut self.album_gain, scanned.album_gain),
            (&mut self.album_peak_gain, scanned.album_peak_gain),
        ] {
            if fresh.is_some_and(|g| g != 0.0) {
                *stored = fresh;
            }
        }

        if replace {
            self.compilation = scanned.compilation;
            self.no_compilation = scanned.no_compilation;
            self.has_cover = scanned.has_cover;
            if scanned.play_count >= self.play_count {
                self.play_count = scanned.play_count;
            }
        } else {
            self.compilation |= scanned.compilation;
            self.no_compilation |= scanned.no_compilation;
            self.has_cover |= scanned.has_cover;
        }
    }
}

/// Take the scanned value when replacing, or when the scanner reported one.
fn merge<T: Clone>(stored: &mut Option<T>, scanned: &Option<T>, replace: bool) {
    if replace || scanned.is_some() {
        stored.clone_from(scanned);
    }
}

/// Take the scanned value when replacing, or when nothing is stored yet.
fn fill<T: Clone>(stored: &mut Option<T>, scanned: &Option<T>, replace: bool) {
    if replace || (stored.is_none() && scanned.is_some()) {
        stored.clone_from(scanned);
    }
}

/// An album found inside one directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub name: String,
    pub artist: Option<String>,
    pub tracks: Vec<TrackRecord>,
}

impl AlbumRecord {
    /// Create an empty album.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a track (builder style).
    pub fn with_track(mut self, track: TrackRecord) -> Self {
        self.tracks.push(track);
        self
    }
}

/// A playlist file found inside one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub path: PathBuf,
    pub rpath: PathBuf,
}

/// Everything the worker found in one filesystem directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Path relative to the directory's device.
    pub rpath: PathBuf,
    /// Directory modification time, seconds since the epoch.
    pub mtime: u64,
    /// The worker did not read the directory (unchanged or unreadable).
    pub skipped: bool,
    pub albums: Vec<AlbumRecord>,
    pub playlists: Vec<PlaylistRef>,
}

impl DirectoryRecord {
    /// Create an empty directory record.
    pub fn new(path: impl Into<PathBuf>, mtime: u64) -> Self {
        Self {
            path: path.into(),
            mtime,
            ..Default::default()
        }
    }

    /// Mark the directory as skipped (builder style).
    pub fn skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    /// Add an album (builder style).
    pub fn with_album(mut self, album: AlbumRecord) -> Self {
        self.albums.push(album);
        self
    }

    /// Add a playlist (builder style).
    pub fn with_playlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.playlists.push(PlaylistRef {
            path: path.into(),
            rpath: PathBuf::new(),
        });
        self
    }

    /// Iterate over all tracks of all albums.
    pub fn tracks(&self) -> impl Iterator<Item = &TrackRecord> {
        self.albums.iter().flat_map(|a| a.tracks.iter())
    }

    /// Total number of tracks in this directory.
    pub fn track_count(&self) -> usize {
        self.albums.iter().map(|a| a.tracks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path(Path::new("/a/b.FLAC")), FileType::Flac);
        assert_eq!(FileType::from_path(Path::new("/a/b.oga")), FileType::Ogg);
        assert_eq!(FileType::from_path(Path::new("/a/b")), FileType::Unknown);
        assert_eq!("mp3".parse::<FileType>().unwrap(), FileType::Mp3);
        assert_eq!(FileType::Opus.to_string(), "opus");
    }

    #[test]
    fn test_apply_merge_keeps_unreported_fields() {
        let mut stored = TrackRecord::new("uid", "/m/a.mp3");
        stored.title = Some("Old".into());
        stored.genre = Some("Rock".into());
        stored.track_number = Some(3);

        let mut scanned = TrackRecord::new("uid", "/m/a.mp3");
        scanned.title = Some("New".into());
        scanned.track_number = Some(7);

        stored.apply(&scanned, FieldPolicy::Merge);
        assert_eq!(stored.title.as_deref(), Some("New"));
        assert_eq!(stored.genre.as_deref(), Some("Rock"));
        // already set, so an update scan keeps it
        assert_eq!(stored.track_number, Some(3));
    }

    #[test]
    fn test_apply_replace_overwrites_everything() {
        let mut stored = TrackRecord::new("uid", "/m/a.mp3");
        stored.genre = Some("Rock".into());
        stored.track_number = Some(3);
        stored.play_count = Some(2);

        let mut scanned = TrackRecord::new("uid", "/m/b.mp3");
        scanned.track_number = Some(7);
        scanned.play_count = Some(1);

        stored.apply(&scanned, FieldPolicy::Replace);
        assert_eq!(stored.path, PathBuf::from("/m/b.mp3"));
        assert_eq!(stored.genre, None);
        assert_eq!(stored.track_number, Some(7));
        // play count never goes down
        assert_eq!(stored.play_count, Some(2));
    }

    #[test]
    fn test_directory_track_count() {
        let dir = DirectoryRecord::new("/m/a", 10)
            .with_album(
                AlbumRecord::new("A")
                    .with_track(TrackRecord::new("1", "/m/a/1.mp3"))
                    .with_track(TrackRecord::new("2", "/m/a/2.mp3")),
            )
            .with_album(AlbumRecord::new("B").with_track(TrackRecord::new("3", "/m/a/3.mp3")));
        assert_eq!(dir.track_count(), 3);
        assert_eq!(dir.tracks().count(), 3);
    }
}
