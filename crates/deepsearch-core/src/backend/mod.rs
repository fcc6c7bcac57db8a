//! Index backend abstraction for DeepSearch.
//!
//! The coordinator writes to two independent indexes keyed by file path:
//! a [`KeywordBackend`] holding one full-text document per file, and a
//! [`VectorBackend`] holding the embedded chunks of each file. Either can
//! fail on its own; the coordinator treats them as separate collaborators.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Deleting an absent path is a no-op, never an error.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EmbeddedChunk, FileMetadata, FingerprintEntry, KeywordHit, SemanticHit};

/// Full-text index over file metadata and extracted text.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](KeywordBackend::upsert) | Insert or replace the document for a path |
/// | [`delete`](KeywordBackend::delete) | Remove the document for a path |
/// | [`search`](KeywordBackend::search) | Ranked full-text query |
/// | [`search_by_filename`](KeywordBackend::search_by_filename) | Substring match on file names |
/// | [`document_count`](KeywordBackend::document_count) | Number of indexed documents |
#[async_trait]
pub trait KeywordBackend: Send + Sync {
    async fn upsert(&self, metadata: &FileMetadata, text: &str) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Hits ordered by descending raw score, at most `limit`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>>;

    async fn search_by_filename(&self, pattern: &str, limit: usize) -> Result<Vec<KeywordHit>>;

    async fn document_count(&self) -> Result<u64>;
}

/// Nearest-neighbour index over embedded chunks.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Remove every chunk whose `source_path` is `path`.
    async fn delete_chunks(&self, path: &str) -> Result<()>;

    /// Up to `top_k` chunk hits with similarity `>= threshold`, best first.
    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<SemanticHit>>;

    async fn chunk_count(&self) -> Result<u64>;
}

/// Durable copy of the fingerprint table.
///
/// Loaded once when the coordinator is built and written through by the
/// sequencer, so unchanged files are recognised across restarts.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<FingerprintEntry>>;

    async fn save(&self, entry: &FingerprintEntry) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;
}

/// First `max_chars` characters of `text`, for previews and snippets.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
