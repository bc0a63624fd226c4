//! Expansion of the batch roots into the ordered list of directories to scan.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexSet;
use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use crate::tracker::DirectoryTracker;

/// Every directory to scan, in a stable order.
///
/// Children are sorted by name and roots keep batch order.
pub fn collect_directories(roots: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let tracker = DirectoryTracker::new();
    let mut directories = IndexSet::new();

    for root in roots {
        if !root.is_dir() {
            warn!(path = %root.display(), "Collection folder is not a directory, skipping");
            continue;
        }
        if recursive {
            walk_root(root, &tracker, &mut directories);
        } else if let Ok(metadata) = std::fs::metadata(root) {
            if tracker.visit(&metadata) {
                directories.insert(root.clone());
            }
        }
    }

    debug!(
        roots = roots.len(),
        directories = directories.len(),
        "Collected directories to scan"
    );
    directories.into_iter().collect()
}

fn walk_root(root: &Path, tracker: &DirectoryTracker, directories: &mut IndexSet<PathBuf>) {
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_millis(100),
        })
        .sort(true)
        .skip_hidden(true)
        .follow_links(false);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                warn!(path = %path.display(), error = %err, "Cannot read directory");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        match entry.metadata() {
            Ok(metadata) if !tracker.visit(&metadata) => {
                debug!(path = %path.display(), "Directory already scanned, skipping");
            }
            Ok(_) => {
                directories.insert(path);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot stat directory");
                directories.insert(path);
            }
        }
    }
}
