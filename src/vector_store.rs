//! SQLite vector backend.
//!
//! Chunks are stored with their embedding as a little-endian f32 BLOB.
//! Similarity search loads every vector and ranks by cosine similarity in
//! Rust, which is adequate for a single-user local index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use deepsearch_core::backend::VectorBackend;
use deepsearch_core::embedding::{blob_to_vec, similarity_score, vec_to_blob};
use deepsearch_core::models::{EmbeddedChunk, SemanticHit};

use crate::keyword_store::to_micros;
use crate::{db, migrate};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path)
            .await
            .with_context(|| format!("Failed to open vector index at {}", db_path.display()))?;
        migrate::migrate_vector(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorIndex {
    async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for c in chunks {
            let r = &c.record;
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, source_path, chunk_index, start_char, end_char,
                                    text_preview, embedding_model, dims, embedding, indexed_time)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    source_path = excluded.source_path,
                    chunk_index = excluded.chunk_index,
                    start_char = excluded.start_char,
                    end_char = excluded.end_char,
                    text_preview = excluded.text_preview,
                    embedding_model = excluded.embedding_model,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    indexed_time = excluded.indexed_time
                "#,
            )
            .bind(&r.chunk_id)
            .bind(&r.source_path)
            .bind(r.chunk_index as i64)
            .bind(r.start_char as i64)
            .bind(r.end_char as i64)
            .bind(&r.text_preview)
            .bind(&r.embedding_model)
            .bind(c.embedding.len() as i64)
            .bind(vec_to_blob(&c.embedding))
            .bind(to_micros(r.indexed_time))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_chunks(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<SemanticHit>> {
        let rows = sqlx::query(
            "SELECT chunk_id, source_path, chunk_index, text_preview, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SemanticHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = similarity_score(query_embedding, &blob_to_vec(&blob));
                (score >= threshold).then(|| SemanticHit {
                    chunk_id: row.get("chunk_id"),
                    path: row.get("source_path"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    score,
                    text_preview: row.get("text_preview"),
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
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
