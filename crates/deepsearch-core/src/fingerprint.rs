//! Content fingerprints and the per-path fingerprint table.
//!
//! A file's `content_hash` is the hex SHA-256 of its raw bytes, so it
//! changes exactly when the bytes change. Size and mtime are kept alongside
//! as a cheap pre-check for the bulk scanner; the hash is authoritative.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::FingerprintEntry;

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Change-detection state for every indexed path.
///
/// Mutated only by the index sequencer; readers take snapshots.
#[derive(Debug, Clone, Default)]
pub struct FingerprintTable {
    entries: HashMap<String, FingerprintEntry>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FingerprintEntry> {
        self.entries.get(path)
    }

    /// True when `hash` equals the stored hash for `path`.
    pub fn matches(&self, path: &str, hash: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|e| e.content_hash == hash)
    }

    /// True when size and mtime both equal the stored values.
    pub fn stat_matches(&self, path: &str, size: u64, modified: DateTime<Utc>) -> bool {
        self.entries
            .get(path)
            .is_some_and(|e| e.size == size && e.modified_time == modified)
    }

    pub fn insert(&mut self, entry: FingerprintEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<FingerprintEntry> {
        self.entries.remove(path)
    }

    /// Refresh bookkeeping for a path whose content did not change.
    pub fn touch(&mut self, path: &str, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(path) {
            Some(e) => {
                e.last_indexed_time = at;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indexed paths located under `root`, sorted.
    pub fn paths_under(&self, root: &Path) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .keys()
            .filter(|k| Path::new(k.as_str()).starts_with(root))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerprintEntry> {
        self.entries.values()
    }
}

impl FromIterator<FingerprintEntry> for FingerprintTable {
    fn from_iter<I: IntoIterator<Item = FingerprintEntry>>(iter: I) -> Self {
        let mut table = FingerprintTable::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, hash: &str) -> FingerprintEntry {
        let now = Utc::now();
        FingerprintEntry {
            path: path.to_string(),
            content_hash: hash.to_string(),
            size: 3,
            modified_time: now,
            last_indexed_time: now,
        }
    }

    #[test]
    fn test_hash_tracks_bytes() {
        let a = content_hash(b"hello");
        assert_eq!(a, content_hash(b"hello"));
        assert_ne!(a, content_hash(b"hello!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_matches_and_remove() {
        let mut t = FingerprintTable::new();
        t.insert(entry("/a/x.txt", "h1"));
        assert!(t.matches("/a/x.txt", "h1"));
        assert!(!t.matches("/a/x.txt", "h2"));
        assert!(!t.matches("/a/y.txt", "h1"));
        assert!(t.remove("/a/x.txt").is_some());
        assert!(t.remove("/a/x.txt").is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn test_touch_only_updates_time() {
        let mut t = FingerprintTable::new();
        t.insert(entry("/a/x.txt", "h1"));
        let later = Utc::now() + chrono::Duration::seconds(60);
        assert!(t.touch("/a/x.txt", later));
        let e = t.get("/a/x.txt").unwrap();
        assert_eq!(e.last_indexed_time, later);
        assert_eq!(e.content_hash, "h1");
        assert!(!t.touch("/missing", later));
    }

    #[test]
    fn test_paths_under_root() {
        let mut t = FingerprintTable::new();
        t.insert(entry("/docs/b.txt", "1"));
        t.insert(entry("/docs/a.txt", "2"));
        t.insert(entry("/docsx/c.txt", "3"));
        assert_eq!(
            t.paths_under(Path::new("/docs")),
            vec!["/docs/a.txt".to_string(), "/docs/b.txt".to_string()]
        );
    }
}
