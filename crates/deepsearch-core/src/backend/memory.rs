//! In-memory backends for tests and embedding without SQLite.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Keyword search scores a
//! document by the number of query-term occurrences; vector search is
//! brute-force cosine similarity.
//!
//! Both backends can be switched offline with `set_available(false)`,
//! after which every call fails. Write counters let tests assert that an
//! operation did or did not touch an index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::similarity_score;
use crate::models::{EmbeddedChunk, FileMetadata, FingerprintEntry, KeywordHit, SemanticHit};

use super::{preview, FingerprintStore, KeywordBackend, VectorBackend};

struct StoredDoc {
    metadata: FileMetadata,
    text_lower: String,
    text: String,
}

/// In-memory [`KeywordBackend`].
pub struct InMemoryKeywordIndex {
    docs: RwLock<HashMap<String, StoredDoc>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryKeywordIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful upserts and deletes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).contains_key(path)
    }

    pub fn metadata(&self, path: &str) -> Option<FileMetadata> {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|d| d.metadata.clone())
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).get(path).map(|d| d.text.clone())
    }

    fn check(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("keyword index offline");
        }
        Ok(())
    }
}

impl Default for InMemoryKeywordIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeywordBackend for InMemoryKeywordIndex {
    async fn upsert(&self, metadata: &FileMetadata, text: &str) -> Result<()> {
        self.check()?;
        self.docs.write().unwrap_or_else(PoisonError::into_inner).insert(
            metadata.path.clone(),
            StoredDoc {
                metadata: metadata.clone(),
                text_lower: text.to_lowercase(),
                text: text.to_string(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check()?;
        self.docs.write().unwrap_or_else(PoisonError::into_inner).remove(path);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        self.check()?;
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<KeywordHit> = docs
            .values()
            .filter_map(|d| {
                let matches: usize = terms
                    .iter()
                    .map(|t| d.text_lower.matches(t).count())
                    .sum();
                (matches > 0).then(|| KeywordHit {
                    path: d.metadata.path.clone(),
                    filename: d.metadata.filename.clone(),
                    score: matches as f64,
                    snippet: Some(preview(&d.text, 200)),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.path.cmp(&b.path))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_by_filename(&self, pattern: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        self.check()?;
        let pattern = pattern.to_lowercase();
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<KeywordHit> = docs
            .values()
            .filter(|d| d.metadata.filename.to_lowercase().contains(&pattern))
            .map(|d| KeywordHit {
                path: d.metadata.path.clone(),
                filename: d.metadata.filename.clone(),
                score: 1.0,
                snippet: None,
            })
            .collect();
        hits.sort_by(|a, b| a.path.cmp(&b.path));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn document_count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.docs.read().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }
}

/// In-memory [`VectorBackend`].
pub struct InMemoryVectorIndex {
    chunks: RwLock<HashMap<String, EmbeddedChunk>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Chunk indices stored for `path`, sorted.
    pub fn chunk_indices(&self, path: &str) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.record.source_path == path)
            .map(|c| c.record.chunk_index)
            .collect();
        out.sort_unstable();
        out
    }

    fn check(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("vector index offline");
        }
        Ok(())
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorIndex {
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        self.check()?;
        let mut stored = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        for c in chunks {
            stored.insert(c.record.chunk_id.clone(), c.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_chunks(&self, path: &str) -> Result<()> {
        self.check()?;
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, c| c.record.source_path != path);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<SemanticHit>> {
        self.check()?;
        let stored = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<SemanticHit> = stored
            .values()
            .filter_map(|c| {
                let score = similarity_score(query_embedding, &c.embedding);
                (score >= threshold).then(|| SemanticHit {
                    chunk_id: c.record.chunk_id.clone(),
                    path: c.record.source_path.clone(),
                    chunk_index: c.record.chunk_index,
                    score,
                    text_preview: c.record.text_preview.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn chunk_count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.chunks.read().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }
}

/// In-memory [`FingerprintStore`].
#[derive(Default)]
pub struct InMemoryFingerprintStore {
    entries: RwLock<HashMap<String, FingerprintEntry>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<FingerprintEntry> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn load_all(&self) -> Result<Vec<FingerprintEntry>> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect())
    }

    async fn save(&self, entry: &FingerprintEntry) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.path.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(path);
        Ok(())
    }
}
