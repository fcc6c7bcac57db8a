//! Directory walk for bulk indexing.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::filter::FileFilter;

/// Files found under one root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Regular files that passed the path filters, in directory-then-filename
    /// lexical order.
    pub files: Vec<PathBuf>,
    /// Regular files rejected by a path filter.
    pub rejected: u64,
}

/// Walk `root`, pruning excluded directories.
///
/// Unreadable entries are logged and skipped. A root that is itself a file
/// yields just that file.
pub fn discover(root: &Path, filter: &FileFilter, follow_symlinks: bool) -> Discovery {
    let mut discovery = Discovery::default();
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !filter.is_excluded_dir(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if filter.path_rejection(&path).is_some() {
            discovery.rejected += 1;
        } else {
            discovery.files.push(path);
        }
    }

    discovery.files.sort_by(|a, b| lexical_order(a, b));
    discovery
}

/// Parent directory first, then file name.
fn lexical_order(a: &Path, b: &Path) -> Ordering {
    a.parent()
        .cmp(&b.parent())
        .then_with(|| a.file_name().cmp(&b.file_name()))
}
