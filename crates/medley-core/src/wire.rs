//! Element and attribute names of the scanner output stream.
//!
//! The stream is a single `<scanner>` element holding one `<directory>`
//! element per scanned directory:
//!
//! ```text
//! <scanner count="2" incremental="true">
//!   <directory>
//!     <path>/music/a</path><rpath>music/a</rpath><mtime>1700000000</mtime>
//!     <album><name>A</name><track>...</track></album>
//!     <playlist><path>/music/a/p.m3u</path><rpath>music/a/p.m3u</rpath></playlist>
//!   </directory>
//!   <directory>...<skipped/></directory>
//! </scanner>
//! ```
//!
//! Inside `<track>` every child element is a scalar field, so `<track>`
//! nested in `<track>` is the track number.

pub const SCANNER: &str = "scanner";
pub const DIRECTORY: &str = "directory";
pub const ALBUM: &str = "album";
pub const TRACK: &str = "track";
pub const PLAYLIST: &str = "playlist";

pub const ATTR_COUNT: &str = "count";
pub const ATTR_INCREMENTAL: &str = "incremental";

pub const PATH: &str = "path";
pub const RPATH: &str = "rpath";
pub const MTIME: &str = "mtime";
pub const SKIPPED: &str = "skipped";
pub const NAME: &str = "name";
pub const ARTIST: &str = "artist";

pub const UNIQUE_ID: &str = "uniqueid";
pub const FILE_TYPE: &str = "filetype";
pub const TITLE: &str = "title";
pub const ALBUM_ARTIST: &str = "albumArtist";
pub const COMPILATION: &str = "compilation";
pub const NO_COMPILATION: &str = "noCompilation";
pub const HAS_COVER: &str = "hasCover";
pub const COMMENT: &str = "comment";
pub const GENRE: &str = "genre";
pub const COMPOSER: &str = "composer";
pub const YEAR: &str = "year";
pub const DISC: &str = "discNumber";
pub const BPM: &str = "bpm";
pub const BITRATE: &str = "bitrate";
pub const LENGTH: &str = "length";
pub const SAMPLE_RATE: &str = "samplerate";
pub const FILE_SIZE: &str = "filesize";
pub const MODIFIED: &str = "mtime";
pub const TRACK_GAIN: &str = "trackGain";
pub const TRACK_PEAK_GAIN: &str = "trackPeakGain";
pub const ALBUM_GAIN: &str = "albumGain";
pub const ALBUM_PEAK_GAIN: &str = "albumPeakGain";
pub const RATING: &str = "rating";
pub const SCORE: &str = "score";
pub const PLAY_COUNT: &str = "playcount";

/// Closing tag of the whole stream.
pub const SCANNER_END: &[u8] = b"</scanner>";

/// Closing tag of one directory unit.
pub const DIRECTORY_END: &[u8] = b"</directory>";
