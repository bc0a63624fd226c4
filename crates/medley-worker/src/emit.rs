//! Writer for the scanner output stream.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use medley_core::wire;
use medley_core::{AlbumRecord, DirectoryRecord, PlaylistRef, TrackRecord};

use crate::error::Result;

/// Writes the `<scanner>` document one directory unit at a time, flushing
/// after each unit so the orchestrator sees it immediately.
pub struct StreamWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 1),
        }
    }

    /// Open the document. `count` is the number of directories the worker
    /// expects to report.
    pub fn header(&mut self, count: usize, incremental: bool) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let count = count.to_string();
        let mut start = BytesStart::new(wire::SCANNER);
        start.push_attribute((wire::ATTR_COUNT, count.as_str()));
        if incremental {
            start.push_attribute((wire::ATTR_INCREMENTAL, "true"));
        }
        self.writer.write_event(Event::Start(start))?;
        self.flush()
    }

    /// Write one complete directory unit.
    pub fn directory(&mut self, directory: &DirectoryRecord) -> Result<()> {
        self.open(wire::DIRECTORY)?;
        self.path(wire::PATH, &directory.path)?;
        self.path(wire::RPATH, &directory.rpath)?;
        self.number(wire::MTIME, Some(directory.mtime))?;
        self.flag(wire::SKIPPED, directory.skipped)?;
        for album in &directory.albums {
            self.album(album)?;
        }
        for playlist in &directory.playlists {
            self.playlist(playlist)?;
        }
        self.close(wire::DIRECTORY)?;
        self.flush()
    }

    /// Close the document.
    pub fn footer(&mut self) -> Result<()> {
        self.close(wire::SCANNER)?;
        self.writer.get_mut().write_all(b"\n")?;
        self.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn album(&mut self, album: &AlbumRecord) -> Result<()> {
        self.open(wire::ALBUM)?;
        self.text(wire::NAME, Some(&album.name))?;
        self.text(wire::ARTIST, album.artist.as_deref())?;
        for track in &album.tracks {
            self.track(track)?;
        }
        self.close(wire::ALBUM)
    }

    fn playlist(&mut self, playlist: &PlaylistRef) -> Result<()> {
        self.open(wire::PLAYLIST)?;
        self.path(wire::PATH, &playlist.path)?;
        self.path(wire::RPATH, &playlist.rpath)?;
        self.close(wire::PLAYLIST)
    }

    fn track(&mut self, track: &TrackRecord) -> Result<()> {
        self.open(wire::TRACK)?;
        self.text(wire::UNIQUE_ID, Some(&track.unique_id))?;
        self.path(wire::PATH, &track.path)?;
        self.path(wire::RPATH, &track.rpath)?;
        self.text(wire::FILE_TYPE, Some(&track.file_type.to_string()))?;
        self.text(wire::TITLE, track.title.as_deref())?;
        self.text(wire::ARTIST, track.artist.as_deref())?;
        self.text(wire::ALBUM_ARTIST, track.album_artist.as_deref())?;
        self.text(wire::ALBUM, track.album.as_deref())?;
        self.flag(wire::COMPILATION, track.compilation)?;
        self.flag(wire::NO_COMPILATION, track.no_compilation)?;
        self.flag(wire::HAS_COVER, track.has_cover)?;
        self.text(wire::COMMENT, track.comment.as_deref())?;
        self.text(wire::GENRE, track.genre.as_deref())?;
        self.text(wire::COMPOSER, track.composer.as_deref())?;
        self.number(wire::YEAR, track.year)?;
        self.number(wire::DISC, track.disc)?;
        self.number(wire::TRACK, track.track_number)?;
        self.number(wire::BPM, track.bpm)?;
        self.number(wire::BITRATE, track.bitrate)?;
        self.number(wire::LENGTH, track.length_ms)?;
        self.number(wire::SAMPLE_RATE, track.sample_rate)?;
        self.number(wire::FILE_SIZE, track.file_size)?;
        self.number(wire::MODIFIED, track.modified)?;
        self.number(wire::TRACK_GAIN, track.track_gain)?;
        self.number(wire::TRACK_PEAK_GAIN, track.track_peak_gain)?;
        self.number(wire::ALBUM_GAIN, track.album_gain)?;
        self.number(wire::ALBUM_PEAK_GAIN, track.album_peak_gain)?;
        self.number(wire::RATING, track.rating)?;
        self.number(wire::SCORE, track.score)?;
        self.number(wire::PLAY_COUNT, track.play_count)?;
        self.close(wire::TRACK)
    }

    /// Empty values are left out.
    fn text(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.writer
                .create_element(name)
                .write_text_content(BytesText::new(value))?;
        }
        Ok(())
    }

    fn path(&mut self, name: &str, path: &Path) -> Result<()> {
        self.text(name, Some(&path.to_string_lossy()))
    }

    fn number<T: Display>(&mut self, name: &str, value: Option<T>) -> Result<()> {
        match value {
            Some(value) => self.text(name, Some(&value.to_string())),
            None => Ok(()),
        }
    }

    fn flag(&mut self, name: &str, set: bool) -> Result<()> {
        if set {
            self.writer.create_element(name).write_empty()?;
        }
        Ok(())
    }
}
