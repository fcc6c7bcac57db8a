//! SQLite FTS5 keyword backend.
//!
//! One row per file in `files` (metadata) and `files_fts` (filename plus
//! extracted text). Ranking uses FTS5's BM25 `rank`, negated so that higher
//! is better. The same database holds the persisted fingerprint table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use deepsearch_core::backend::{FingerprintStore, KeywordBackend};
use deepsearch_core::models::{FileMetadata, FingerprintEntry, KeywordHit};

use crate::{db, migrate};

pub struct SqliteKeywordIndex {
    pool: SqlitePool,
}

impl SqliteKeywordIndex {
    /// Open the database at `db_path`, creating the schema if needed.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path)
            .await
            .with_context(|| format!("Failed to open keyword index at {}", db_path.display()))?;
        migrate::migrate_keyword(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}

/// Quote each whitespace-separated term so user input never hits FTS5
/// query syntax. Terms are ANDed.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[async_trait]
impl KeywordBackend for SqliteKeywordIndex {
    async fn upsert(&self, metadata: &FileMetadata, text: &str) -> Result<()> {
        let indexed = metadata.indexed_time.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (path, filename, extension, file_type, mime_type, size,
                               modified_time, created_time, content_hash, indexed_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                extension = excluded.extension,
                file_type = excluded.file_type,
                mime_type = excluded.mime_type,
                size = excluded.size,
                modified_time = excluded.modified_time,
                created_time = excluded.created_time,
                content_hash = excluded.content_hash,
                indexed_time = excluded.indexed_time
            "#,
        )
        .bind(&metadata.path)
        .bind(&metadata.filename)
        .bind(&metadata.extension)
        .bind(&metadata.file_type)
        .bind(&metadata.mime_type)
        .bind(metadata.size as i64)
        .bind(to_micros(metadata.modified_time))
        .bind(to_micros(metadata.created_time))
        .bind(&metadata.content_hash)
        .bind(to_micros(indexed))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM files_fts WHERE path = ?")
            .bind(&metadata.path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO files_fts (path, filename, content) VALUES (?, ?, ?)")
            .bind(&metadata.path)
            .bind(&metadata.filename)
            .bind(text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM files_fts WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT path, filename, rank,
                   snippet(files_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM files_fts
            WHERE files_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                KeywordHit {
                    path: row.get("path"),
                    filename: row.get("filename"),
                    score: -rank, // negate so higher = better
                    snippet: Some(row.get("snippet")),
                }
            })
            .collect())
    }

    async fn search_by_filename(&self, pattern: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let escaped = pattern
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows = sqlx::query(
            r#"
            SELECT path, filename FROM files
            WHERE lower(filename) LIKE ? ESCAPE '\'
            ORDER BY path
            LIMIT ?
            "#,
        )
        .bind(format!("%{}%", escaped))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KeywordHit {
                path: row.get("path"),
                filename: row.get("filename"),
                score: 1.0,
                snippet: None,
            })
            .collect())
    }

    async fn document_count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

#[async_trait]
impl FingerprintStore for SqliteKeywordIndex {
    async fn load_all(&self) -> Result<Vec<FingerprintEntry>> {
        let rows = sqlx::query(
            "SELECT path, content_hash, size, modified_time, last_indexed_time FROM fingerprints",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FingerprintEntry {
                path: row.get("path"),
                content_hash: row.get("content_hash"),
                size: row.get::<i64, _>("size") as u64,
                modified_time: from_micros(row.get("modified_time")),
                last_indexed_time: from_micros(row.get("last_indexed_time")),
            })
            .collect())
    }

    async fn save(&self, entry: &FingerprintEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fingerprints (path, content_hash, size, modified_time, last_indexed_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_hash = excluded.content_hash,
                size = excluded.size,
                modified_time = excluded.modified_time,
                last_indexed_time = excluded.last_indexed_time
            "#,
        )
        .bind(&entry.path)
        .bind(&entry.content_hash)
        .bind(entry.size as i64)
        .bind(to_micros(entry.modified_time))
        .bind(to_micros(entry.last_indexed_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM fingerprints WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("foo-bar baz").unwrap(), "\"foo-bar\" \"baz\"");
        assert_eq!(fts_query("say \"hi\"").unwrap(), "\"say\" \"\"\"hi\"\"\"");
        assert!(fts_query("   ").is_none());
    }

    #[test]
    fn test_micros_preserved() {
        let ts = from_micros(1_700_000_000_123_456);
        assert_eq!(to_micros(ts), 1_700_000_000_123_456);
    }
}
