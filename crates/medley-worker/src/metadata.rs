//! Tag and audio property extraction.

use std::path::Path;
use std::time::UNIX_EPOCH;

use lofty::{Accessor, AudioFile, ItemKey, Probe, Tag, TaggedFileExt};
use tracing::{debug, warn};

use medley_core::{FileType, TrackRecord};

use crate::identity::unique_id;

/// Read one audio file. Files that cannot be opened are skipped; files
/// whose tags cannot be parsed are reported with file information only.
pub fn read_track(path: &Path) -> Option<TrackRecord> {
    let id = match unique_id(path) {
        Ok(id) => id,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cannot read audio file, skipping");
            return None;
        }
    };

    let mut track = TrackRecord::new(id, path);
    track.file_type = FileType::from_path(path);
    if let Ok(metadata) = std::fs::metadata(path) {
        track.file_size = Some(metadata.len());
        track.modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
    }

    match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(tagged) => {
            let properties = tagged.properties();
            let length = properties.duration().as_millis() as u64;
            track.length_ms = (length > 0).then_some(length);
            track.bitrate = properties
                .audio_bitrate()
                .or_else(|| properties.overall_bitrate());
            track.sample_rate = properties.sample_rate();

            match tagged.primary_tag().or_else(|| tagged.first_tag()) {
                Some(tag) => apply_tag(&mut track, tag),
                None => debug!(path = %path.display(), "No tags found"),
            }
        }
        Err(err) => warn!(path = %path.display(), error = %err, "Cannot parse tags"),
    }

    if track.title.is_none() {
        track.title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    Some(track)
}

fn text(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn item(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse "-6.5 dB" or "0.98" style ReplayGain values.
fn gain(value: Option<String>) -> Option<f32> {
    value?
        .split_whitespace()
        .next()
        .and_then(|number| number.parse().ok())
}

fn apply_tag(track: &mut TrackRecord, tag: &Tag) {
    track.title = text(tag.title());
    track.artist = text(tag.artist());
    track.album = text(tag.album());
    track.genre = text(tag.genre());
    track.comment = text(tag.comment());
    track.album_artist = item(tag, &ItemKey::AlbumArtist);
    track.composer = item(tag, &ItemKey::Composer);

    track.year = tag.year().and_then(|y| i32::try_from(y).ok()).filter(|y| *y > 0);
    track.track_number = tag.track();
    track.disc = tag.disk();
    track.bpm = item(tag, &ItemKey::Bpm).and_then(|bpm| bpm.parse().ok());

    match item(tag, &ItemKey::FlagCompilation).as_deref() {
        Some("1") => track.compilation = true,
        Some("0") => track.no_compilation = true,
        _ => {}
    }
    track.has_cover = tag.picture_count() > 0;

    track.track_gain = gain(item(tag, &ItemKey::ReplayGainTrackGain));
    track.track_peak_gain = gain(item(tag, &ItemKey::ReplayGainTrackPeak));
    track.album_gain = gain(item(tag, &ItemKey::ReplayGainAlbumGain));
    track.album_peak_gain = gain(item(tag, &ItemKey::ReplayGainAlbumPeak));
}
