//! Tracking of visited directories.

use std::fs::Metadata;

use dashmap::DashSet;

/// Identity of a directory on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryKey {
    pub device: u64,
    pub inode: u64,
}

impl DirectoryKey {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Remembers directories already listed, so that overlapping batch entries
/// and bind mounts are scanned once.
#[derive(Debug, Default)]
pub struct DirectoryTracker {
    seen: DashSet<DirectoryKey>,
}

impl DirectoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directory. Returns `true` the first time it is seen.
    ///
    /// Directories without a stable identity are always new.
    pub fn visit(&self, metadata: &Metadata) -> bool {
        match DirectoryKey::from_metadata(metadata) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_visit_once() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = DirectoryTracker::new();
        let metadata = std::fs::metadata(dir.path()).unwrap();

        assert!(tracker.visit(&metadata));
        assert!(!tracker.visit(&metadata));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_different_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tracker = DirectoryTracker::new();

        assert!(tracker.visit(&std::fs::metadata(dir.path()).unwrap()));
        assert!(tracker.visit(&std::fs::metadata(dir.path().join("sub")).unwrap()));
    }
}
