//! File discovery
//!
//! A cheap filesystem walk. Nothing here opens a file; whether a candidate is
//! actually a DICOM study is decided later by the transformer.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List regular files under `root`.
///
/// Symbolic links and special files are skipped. Unreadable directory
/// entries are logged and skipped. The order of the result is unspecified.
pub fn discover_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    tracing::info!("Found {} files in {:?}", files.len(), root);
    files
}
