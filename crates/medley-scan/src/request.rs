//! Scan requests and the pending-request state they accumulate in.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use tokio::io::AsyncRead;

/// A saved scanner stream to import instead of running the worker.
pub enum ImportSource {
    /// Read the stream from a file.
    File(PathBuf),
    /// Read the stream from any async reader.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl ImportSource {
    /// Import from an async reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Something a caller asked the orchestrator to do.
#[derive(Debug)]
pub enum ScanRequest {
    /// Re-read every file of the collection.
    Full,
    /// Rescan every collection folder, skipping unchanged directories.
    IncrementalAll,
    /// Rescan one directory inside the collection.
    IncrementalDirectory(PathBuf),
    /// Feed a saved scanner stream through the reconciler.
    Import(ImportSource),
}

/// Requests merged since the last launch.
#[derive(Debug, Default)]
pub(crate) struct PendingScanState {
    pub full: bool,
    pub directories: BTreeSet<PathBuf>,
    pub import: Option<ImportSource>,
}

impl PendingScanState {
    /// Whether there is anything to launch.
    pub fn has_work(&self) -> bool {
        self.full || !self.directories.is_empty() || self.import.is_some()
    }

    /// Merge another pending state into this one.
    pub fn merge(&mut self, other: PendingScanState) {
        self.full |= other.full;
        self.directories.extend(other.directories);
        if other.import.is_some() {
            self.import = other.import;
        }
    }

    /// Take everything, leaving this state empty.
    pub fn take(&mut self) -> PendingScanState {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_merge_is_union() {
        let mut a = PendingScanState::default();
        a.directories.insert(PathBuf::from("/m/a"));

        let mut b = PendingScanState::default();
        b.directories.insert(PathBuf::from("/m/a"));
        b.directories.insert(PathBuf::from("/m/b"));
        b.full = true;

        a.merge(b);
        assert!(a.full);
        assert_eq!(a.directories.len(), 2);
        assert!(a.has_work());

        let taken = a.take();
        assert!(taken.has_work());
        assert!(!a.has_work());
    }

    #[test]
    fn test_import_source_debug() {
        let source = ImportSource::from_reader(tokio::io::empty());
        assert_eq!(format!("{source:?}"), "Reader(..)");
    }
}
