//! Files exchanged between the orchestrator and the scanner worker.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// A directory the catalog already knows, with its last recorded mtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtimeHint {
    pub path: PathBuf,
    pub mtime: u64,
}

/// Work description handed to the worker through `--batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    /// Directories to scan.
    pub directories: Vec<PathBuf>,
    /// Known directories, used by incremental scans to skip unchanged ones.
    #[serde(default)]
    pub known: Vec<MtimeHint>,
}

impl BatchFile {
    /// Create a batch for the given directories.
    pub fn new(directories: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            directories: directories.into_iter().collect(),
            known: Vec::new(),
        }
    }

    /// Add a known directory (builder style).
    pub fn with_known(mut self, path: impl Into<PathBuf>, mtime: u64) -> Self {
        self.known.push(MtimeHint {
            path: path.into(),
            mtime,
        });
        self
    }

    /// Index the known mtimes by path.
    pub fn known_mtimes(&self) -> HashMap<&Path, u64> {
        self.known
            .iter()
            .map(|hint| (hint.path.as_path(), hint.mtime))
            .collect()
    }

    /// Write the batch as JSON, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.as_file_mut().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Read a batch written by [`BatchFile::write`].
    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Directories the worker has fully emitted.
///
/// Stored as a journal with one JSON-encoded path per line. A restarted
/// worker skips every directory in it, so directories appearing or
/// vanishing between attempts do not shift what gets resumed. A line cut
/// short by a crash is ignored and its directory emitted again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    emitted: HashSet<PathBuf>,
}

impl Checkpoint {
    /// Read a checkpoint. A missing file means nothing was emitted.
    pub fn read(path: &Path) -> Self {
        let Ok(file) = File::open(path) else {
            return Self::default();
        };
        let emitted = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str::<PathBuf>(&line).ok())
            .collect();
        Self { emitted }
    }

    /// Whether `directory` was fully emitted.
    pub fn contains(&self, directory: &Path) -> bool {
        self.emitted.contains(directory)
    }

    /// Number of directories fully emitted.
    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }
}

/// Appends emitted directories to a checkpoint journal.
#[derive(Debug)]
pub struct CheckpointWriter {
    file: File,
}

impl CheckpointWriter {
    /// Open the journal. `resume` keeps existing entries, otherwise the
    /// journal starts empty.
    pub fn open(path: &Path, resume: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(resume)
            .write(true)
            .truncate(!resume)
            .open(path)?;
        Ok(Self { file })
    }

    /// Record one fully emitted directory. Paths that are not valid UTF-8
    /// are not recorded and get emitted again after a restart.
    pub fn record(&mut self, directory: &Path) -> io::Result<()> {
        let Some(text) = directory.to_str() else {
            return Ok(());
        };
        let mut line = serde_json::to_string(text)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}
