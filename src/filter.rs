//! Path and size filters applied before extraction.
//!
//! A file is skipped when any path component is an excluded directory
//! name, its extension (or whole name) is in the excluded set, it matches
//! an exclude glob, or it is larger than `max_file_size`.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;

use crate::config::IndexingConfig;

#[derive(Debug, Clone)]
pub struct FileFilter {
    excluded_extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
    exclude_globs: GlobSet,
    max_file_size: u64,
}

impl FileFilter {
    pub fn from_config(config: &IndexingConfig) -> Result<Self> {
        Ok(Self {
            excluded_extensions: config
                .excluded_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            excluded_dirs: config.excluded_dirs.iter().cloned().collect(),
            exclude_globs: build_globset(&config.exclude_globs)?,
            max_file_size: config.max_file_size,
        })
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.contains(name)
    }

    /// Reason the path should be skipped, ignoring size.
    pub fn path_rejection(&self, path: &Path) -> Option<String> {
        if let Some(dir) = path
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .filter_map(|c| c.as_os_str().to_str())
            .find(|c| self.excluded_dirs.contains(*c))
        {
            return Some(format!("inside excluded directory '{}'", dir));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.excluded_extensions.contains(&name) {
            return Some(format!("excluded file name '{}'", name));
        }
        if let Some(ext) = path.extension() {
            let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
            if self.excluded_extensions.contains(&ext) {
                return Some(format!("excluded extension '{}'", ext));
            }
        }

        if self.exclude_globs.is_match(path) {
            return Some("matches exclude glob".to_string());
        }
        None
    }

    pub fn size_rejection(&self, size: u64) -> Option<String> {
        (size > self.max_file_size).then(|| {
            format!(
                "file size {} exceeds max_file_size {}",
                size, self.max_file_size
            )
        })
    }

    /// Combined path and size check.
    pub fn rejection(&self, path: &Path, size: u64) -> Option<String> {
        self.path_rejection(path)
            .or_else(|| self.size_rejection(size))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
