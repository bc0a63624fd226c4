//! Incremental decoding of the scanner worker's output stream.
//!
//! Bytes arrive in arbitrary chunks. The parser keeps everything after the
//! last complete directory unit in a buffer and only hands complete units to
//! the XML decoder, so the decoded records do not depend on where the chunk
//! boundaries fell.

use std::mem;
use std::path::PathBuf;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use medley_core::wire;
use medley_core::{AlbumRecord, DirectoryRecord, FileType, PlaylistRef, ScanError, TrackRecord};

/// Something decoded from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The `<scanner>` element opened. `count` is the worker's estimate of
    /// the number of directories and not a bound.
    Header { count: Option<u64>, incremental: bool },
    /// One complete directory unit.
    Directory(DirectoryRecord),
    /// The `<scanner>` element closed.
    End,
}

/// Element currently open in the decoder.
#[derive(Debug)]
enum Frame {
    Scanner,
    Directory,
    Album,
    Track,
    Playlist,
    Field { name: String, text: String },
    Unknown(String),
}

impl Frame {
    fn name(&self) -> &str {
        match self {
            Frame::Scanner => wire::SCANNER,
            Frame::Directory => wire::DIRECTORY,
            Frame::Album => wire::ALBUM,
            Frame::Track => wire::TRACK,
            Frame::Playlist => wire::PLAYLIST,
            Frame::Field { name, .. } | Frame::Unknown(name) => name,
        }
    }
}

/// Structural decoder. Keeps its element stack across fragments since the
/// `<scanner>` element spans the whole stream.
#[derive(Debug, Default)]
struct Decoder {
    stack: Vec<Frame>,
    directory: Option<DirectoryRecord>,
    loose_tracks: Vec<TrackRecord>,
    album: Option<AlbumRecord>,
    track: Option<TrackRecord>,
    playlist: Option<PlaylistRef>,
    ended: bool,
}

impl Decoder {
    fn decode(&mut self, fragment: &[u8], events: &mut Vec<StreamEvent>) -> Result<(), ScanError> {
        let mut reader = Reader::from_reader(fragment);
        reader.trim_text(true);
        reader.check_end_names(false);

        let mut buf = Vec::new();
        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                ScanError::protocol(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                ))
            })?;
            match event {
                Event::Start(start) => self.open(&start, events)?,
                Event::Empty(start) => {
                    self.open(&start, events)?;
                    let name = element_name(&start)?;
                    self.close(&name, events)?;
                }
                Event::End(end) => {
                    let name = std::str::from_utf8(end.name().as_ref())
                        .map_err(|e| ScanError::protocol(e.to_string()))?
                        .to_string();
                    self.close(&name, events)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| ScanError::protocol(e.to_string()))?;
                    self.text(&text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data);
                    self.text(&text);
                }
                Event::Eof => break,
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            }
            buf.clear();
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(Frame::Field { text: field, .. }) => field.push_str(text),
            Some(Frame::Unknown(_)) => {}
            _ => debug!(text, "Ignoring stray text in scanner output"),
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, events: &mut Vec<StreamEvent>) -> Result<(), ScanError> {
        let name = element_name(start)?;

        let frame = match (self.stack.last(), name.as_str()) {
            (None, wire::SCANNER) => {
                if self.ended {
                    return Err(ScanError::protocol("second <scanner> element in one stream"));
                }
                let (count, incremental) = header_attributes(start)?;
                events.push(StreamEvent::Header { count, incremental });
                Frame::Scanner
            }
            (None, _) => {
                return Err(ScanError::protocol(format!(
                    "<{name}> outside of <scanner>"
                )));
            }
            (Some(Frame::Scanner), wire::DIRECTORY) => {
                self.directory = Some(DirectoryRecord::default());
                self.loose_tracks.clear();
                Frame::Directory
            }
            (Some(Frame::Directory), wire::ALBUM) => {
                self.album = Some(AlbumRecord::default());
                Frame::Album
            }
            (Some(Frame::Directory | Frame::Album), wire::TRACK) => {
                self.track = Some(TrackRecord::default());
                Frame::Track
            }
            (Some(Frame::Directory), wire::PLAYLIST) => {
                self.playlist = Some(PlaylistRef::default());
                Frame::Playlist
            }
            (Some(Frame::Track), _)
            | (
                Some(Frame::Directory),
                wire::PATH | wire::RPATH | wire::MTIME | wire::SKIPPED,
            )
            | (Some(Frame::Album), wire::NAME | wire::ARTIST)
            | (Some(Frame::Playlist), wire::PATH | wire::RPATH) => Frame::Field {
                name: name.clone(),
                text: String::new(),
            },
            (Some(Frame::Field { name: parent, .. }), _) => {
                return Err(ScanError::protocol(format!(
                    "<{name}> inside scalar element <{parent}>"
                )));
            }
            (Some(Frame::Unknown(_)), _) => Frame::Unknown(name.clone()),
            (Some(parent), _) => {
                warn!(element = %name, parent = parent.name(), "Skipping unknown element in scanner output");
                Frame::Unknown(name.clone())
            }
        };
        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self, name: &str, events: &mut Vec<StreamEvent>) -> Result<(), ScanError> {
        let frame = self.stack.pop().ok_or_else(|| {
            ScanError::protocol(format!("</{name}> without matching start"))
        })?;
        if frame.name() != name {
            return Err(ScanError::protocol(format!(
                "expected </{}>, found </{name}>",
                frame.name()
            )));
        }

        match frame {
            Frame::Scanner => {
                self.ended = true;
                events.push(StreamEvent::End);
            }
            Frame::Directory => {
                let mut directory = self.directory.take().unwrap_or_default();
                group_loose_tracks(&mut directory, mem::take(&mut self.loose_tracks));
                events.push(StreamEvent::Directory(directory));
            }
            Frame::Album => {
                if let (Some(album), Some(directory)) = (self.album.take(), self.directory.as_mut()) {
                    directory.albums.push(album);
                }
            }
            Frame::Track => {
                if let Some(track) = self.track.take() {
                    match self.album.as_mut() {
                        Some(album) if matches!(self.stack.last(), Some(Frame::Album)) => {
                            album.tracks.push(track)
                        }
                        _ => self.loose_tracks.push(track),
                    }
                }
            }
            Frame::Playlist => {
                if let (Some(playlist), Some(directory)) =
                    (self.playlist.take(), self.directory.as_mut())
                {
                    directory.playlists.push(playlist);
                }
            }
            Frame::Field { name, text } => self.assign(&name, text),
            Frame::Unknown(_) => {}
        }
        Ok(())
    }

    /// Store a scalar field into the element that contains it.
    fn assign(&mut self, name: &str, text: String) {
        match self.stack.last() {
            Some(Frame::Track) => {
                if let Some(track) = self.track.as_mut() {
                    set_track_field(track, name, text);
                }
            }
            Some(Frame::Album) => {
                if let Some(album) = self.album.as_mut() {
                    match name {
                        wire::NAME => album.name = text,
                        wire::ARTIST => album.artist = non_empty(text),
                        _ => {}
                    }
                }
            }
            Some(Frame::Playlist) => {
                if let Some(playlist) = self.playlist.as_mut() {
                    match name {
                        wire::PATH => playlist.path = PathBuf::from(text),
                        wire::RPATH => playlist.rpath = PathBuf::from(text),
                        _ => {}
                    }
                }
            }
            Some(Frame::Directory) => {
                if let Some(directory) = self.directory.as_mut() {
                    match name {
                        wire::PATH => directory.path = PathBuf::from(text),
                        wire::RPATH => directory.rpath = PathBuf::from(text),
                        wire::MTIME => directory.mtime = parse_number(name, &text).unwrap_or(0),
                        wire::SKIPPED => directory.skipped = true,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn element_name(start: &BytesStart<'_>) -> Result<String, ScanError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| ScanError::protocol(e.to_string()))
}

fn header_attributes(start: &BytesStart<'_>) -> Result<(Option<u64>, bool), ScanError> {
    let mut count = None;
    let mut incremental = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ScanError::protocol(e.to_string()))?;
        match attr.key.as_ref() {
            k if k == wire::ATTR_COUNT.as_bytes() => {
                let value = attr
                    .unescape_value()
                    .map_err(|e| ScanError::protocol(e.to_string()))?;
                count = parse_number(wire::ATTR_COUNT, &value);
            }
            k if k == wire::ATTR_INCREMENTAL.as_bytes() => incremental = true,
            _ => {}
        }
    }
    Ok((count, incremental))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn parse_number<T: std::str::FromStr>(field: &str, text: &str) -> Option<T> {
    if text.is_empty() {
        return None;
    }
    match text.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(field, value = text, "Ignoring malformed number in scanner output");
            None
        }
    }
}

fn set_track_field(track: &mut TrackRecord, name: &str, text: String) {
    match name {
        wire::UNIQUE_ID => track.unique_id = text,
        wire::PATH => track.path = PathBuf::from(text),
        wire::RPATH => track.rpath = PathBuf::from(text),
        wire::FILE_TYPE => {
            track.file_type = text.parse().unwrap_or_else(|_| FileType::from_path(&track.path))
        }
        wire::TITLE => track.title = non_empty(text),
        wire::ARTIST => track.artist = non_empty(text),
        wire::ALBUM_ARTIST => track.album_artist = non_empty(text),
        wire::ALBUM => track.album = non_empty(text),
        wire::COMPILATION => track.compilation = true,
        wire::NO_COMPILATION => track.no_compilation = true,
        wire::HAS_COVER => track.has_cover = true,
        wire::COMMENT => track.comment = non_empty(text),
        wire::GENRE => track.genre = non_empty(text),
        wire::COMPOSER => track.composer = non_empty(text),
        wire::YEAR => track.year = parse_number(name, &text),
        wire::DISC => track.disc = parse_number(name, &text),
        wire::TRACK => track.track_number = parse_number(name, &text),
        wire::BPM => track.bpm = parse_number(name, &text),
        wire::BITRATE => track.bitrate = parse_number(name, &text),
        wire::LENGTH => track.length_ms = parse_number(name, &text),
        wire::SAMPLE_RATE => track.sample_rate = parse_number(name, &text),
        wire::FILE_SIZE => track.file_size = parse_number(name, &text),
        wire::MODIFIED => track.modified = parse_number(name, &text),
        wire::TRACK_GAIN => track.track_gain = parse_number(name, &text),
        wire::TRACK_PEAK_GAIN => track.track_peak_gain = parse_number(name, &text),
        wire::ALBUM_GAIN => track.album_gain = parse_number(name, &text),
        wire::ALBUM_PEAK_GAIN => track.album_peak_gain = parse_number(name, &text),
        wire::RATING => track.rating = parse_number(name, &text),
        wire::SCORE => track.score = parse_number(name, &text),
        wire::PLAY_COUNT => track.play_count = parse_number(name, &text),
        other => debug!(field = other, "Ignoring unknown track field"),
    }
}

/// Tracks placed directly under `<directory>` are grouped into albums by
/// their album tag, keeping first-seen order.
fn group_loose_tracks(directory: &mut DirectoryRecord, tracks: Vec<TrackRecord>) {
    if tracks.is_empty() {
        return;
    }
    let mut albums: IndexMap<String, AlbumRecord> = IndexMap::new();
    for track in tracks {
        let name = track.album.clone().unwrap_or_default();
        albums
            .entry(name.clone())
            .or_insert_with(|| AlbumRecord {
                name,
                artist: track.album_artist.clone(),
                tracks: Vec::new(),
            })
            .tracks
            .push(track);
    }
    directory.albums.extend(albums.into_values());
}

/// Position just past the last occurrence of `needle` in `haystack`.
fn end_of_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|w| w == needle)
        .map(|pos| pos + needle.len())
}

/// Reassembles directory units from arbitrarily split worker output.
#[derive(Debug, Default)]
pub struct ScanStreamParser {
    buffer: Vec<u8>,
    decoder: Decoder,
    header_reported: bool,
    directories: u64,
}

impl ScanStreamParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directory units decoded so far.
    pub fn directories_decoded(&self) -> u64 {
        self.directories
    }

    /// Whether the closing `</scanner>` has been seen.
    pub fn is_complete(&self) -> bool {
        self.decoder.ended
    }

    /// Append a chunk and decode every unit it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ScanError> {
        self.buffer.extend_from_slice(chunk);

        let cut = end_of_last(&self.buffer, wire::SCANNER_END)
            .or_else(|| end_of_last(&self.buffer, wire::DIRECTORY_END));
        let Some(cut) = cut else {
            return Ok(Vec::new());
        };

        let rest = self.buffer.split_off(cut);
        let fragment = mem::replace(&mut self.buffer, rest);

        let mut events = Vec::new();
        self.decoder.decode(&fragment, &mut events)?;

        // A relaunched worker starts its own stream; only the first header
        // is reported.
        events.retain(|event| match event {
            StreamEvent::Header { .. } => !mem::replace(&mut self.header_reported, true),
            StreamEvent::Directory(_) => {
                self.directories += 1;
                true
            }
            StreamEvent::End => true,
        });
        Ok(events)
    }

    /// Forget the partial unit of a crashed worker and expect a new stream.
    pub fn restart_stream(&mut self) {
        if !self.buffer.is_empty() {
            debug!(bytes = self.buffer.len(), "Dropping partial directory unit");
        }
        self.buffer.clear();
        self.decoder = Decoder::default();
    }

    /// Check that the stream ended cleanly.
    pub fn finish(&mut self) -> Result<(), ScanError> {
        let trailing = self.buffer.iter().any(|b| !b.is_ascii_whitespace());
        if !self.decoder.ended || trailing {
            return Err(ScanError::TruncatedStream);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_last() {
        assert_eq!(end_of_last(b"ab</x>cd</x>", b"</x>"), Some(12));
        assert_eq!(end_of_last(b"ab</x", b"</x>"), None);
    }

    #[test]
    fn test_incomplete_unit_is_buffered() {
        let mut parser = ScanStreamParser::new();
        let events = parser
            .push(b"<scanner count=\"1\"><directory><path>/a</path>")
            .unwrap();
        assert!(events.is_empty());

        let events = parser.push(b"<mtime>5</mtime></directory>").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::Header {
                count: Some(1),
                incremental: false
            }
        );
        match &events[1] {
            StreamEvent::Directory(dir) => {
                assert_eq!(dir.path, PathBuf::from("/a"));
                assert_eq!(dir.mtime, 5);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_end_tag() {
        let mut parser = ScanStreamParser::new();
        let result = parser.push(b"<scanner><directory><path>/a</rpath></directory>");
        assert!(matches!(result, Err(ScanError::Protocol { .. })));
    }

    #[test]
    fn test_directory_outside_scanner() {
        let mut parser = ScanStreamParser::new();
        let result = parser.push(b"<directory><path>/a</path></directory>");
        assert!(matches!(result, Err(ScanError::Protocol { .. })));
    }
}
