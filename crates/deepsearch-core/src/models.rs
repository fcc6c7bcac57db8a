//! Core data models shared by the indexing pipeline and the search path.
//!
//! A file's path is its natural key in every index. Paths travel through
//! the pipeline as [`PathBuf`] and are stored in the backends as the lossy
//! UTF-8 string produced by [`path_key`].

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Render a path as the string key used by both backends.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Kind of filesystem change reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Moved => "moved",
        };
        f.write_str(s)
    }
}

/// A raw event from the filesystem watcher (or the bulk scanner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    /// Previous location, set only for [`EventKind::Moved`].
    pub old_path: Option<PathBuf>,
}

impl FsEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Created,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Modified,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Deleted,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Moved,
            path: to.into(),
            old_path: Some(from.into()),
        }
    }
}

/// A pending unit of indexing work for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingJob {
    pub path: PathBuf,
    pub event_kind: EventKind,
    /// Time the first event for this path entered the queue. Coalescing
    /// keeps it, so FIFO order follows first arrival.
    pub enqueue_time: DateTime<Utc>,
    /// Previous location for a [`EventKind::Moved`] job.
    pub old_path: Option<PathBuf>,
    /// Queue sequence number of the newest event folded into this job.
    pub seq: u64,
}

/// Metadata recorded for every indexed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub path: String,
    pub filename: String,
    /// Lower-case extension including the leading dot, or empty.
    pub extension: String,
    /// Extension without the dot, or `"unknown"`.
    pub file_type: String,
    pub mime_type: String,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    /// Hex SHA-256 of the file bytes.
    pub content_hash: String,
    pub indexed_time: Option<DateTime<Utc>>,
}

/// What the extraction stage decided for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Text was extracted (possibly empty).
    Extracted,
    /// The file hash matches the stored fingerprint; extraction was skipped.
    Unchanged,
    /// Rejected by the size/extension/directory filters before dispatch.
    Skipped { reason: String },
    /// The extractor failed or timed out.
    Failed { reason: String },
    /// The file disappeared between the event and extraction.
    Missing,
    /// A Deleted job; nothing to extract.
    Deletion,
}

/// Output of the extraction stage, consumed by the index sequencer.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub job: IndexingJob,
    pub path: PathBuf,
    pub extracted_text: String,
    pub metadata: Option<FileMetadata>,
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    pub fn extracted(job: IndexingJob, metadata: FileMetadata, text: String) -> Self {
        Self {
            path: job.path.clone(),
            job,
            extracted_text: text,
            metadata: Some(metadata),
            outcome: ExtractionOutcome::Extracted,
        }
    }

    pub fn unchanged(job: IndexingJob, metadata: FileMetadata) -> Self {
        Self {
            path: job.path.clone(),
            job,
            extracted_text: String::new(),
            metadata: Some(metadata),
            outcome: ExtractionOutcome::Unchanged,
        }
    }

    pub fn skipped(job: IndexingJob, reason: impl Into<String>) -> Self {
        Self::bare(
            job,
            ExtractionOutcome::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn failed(job: IndexingJob, reason: impl Into<String>) -> Self {
        Self::bare(
            job,
            ExtractionOutcome::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn missing(job: IndexingJob) -> Self {
        Self::bare(job, ExtractionOutcome::Missing)
    }

    pub fn deletion(job: IndexingJob) -> Self {
        Self::bare(job, ExtractionOutcome::Deletion)
    }

    fn bare(job: IndexingJob, outcome: ExtractionOutcome) -> Self {
        Self {
            path: job.path.clone(),
            job,
            extracted_text: String::new(),
            metadata: None,
            outcome,
        }
    }

    pub fn success(&self) -> bool {
        matches!(
            self.outcome,
            ExtractionOutcome::Extracted | ExtractionOutcome::Unchanged
        )
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Failed { reason } | ExtractionOutcome::Skipped { reason } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

/// One embedded span of a document, as stored by the vector backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    /// `"<path>#<chunk_index>"`, unique per chunk.
    pub chunk_id: String,
    pub source_path: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text_preview: String,
    pub embedding_model: String,
    pub indexed_time: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn chunk_id(source_path: &str, chunk_index: usize) -> String {
        format!("{}#{}", source_path, chunk_index)
    }
}

/// A chunk record paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// Change-detection record for one indexed path.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintEntry {
    pub path: String,
    pub content_hash: String,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub last_indexed_time: DateTime<Utc>,
}

/// A ranked hit from the keyword backend. `score` is the raw relevance,
/// higher is better, unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub path: String,
    pub filename: String,
    pub score: f64,
    pub snippet: Option<String>,
}

/// A ranked chunk hit from the vector backend. `score` is a similarity in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub chunk_id: String,
    pub path: String,
    pub chunk_index: usize,
    pub score: f64,
    pub text_preview: String,
}

/// Retrieval mode requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Keyword,
    Semantic,
    Hybrid,
}

impl std::str::FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(SearchKind::Keyword),
            "semantic" => Ok(SearchKind::Semantic),
            "hybrid" => Ok(SearchKind::Hybrid),
            other => Err(format!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            )),
        }
    }
}

/// How a returned result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Keyword,
    Semantic,
    Hybrid,
    Filename,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Keyword => "keyword",
            MatchType::Semantic => "semantic",
            MatchType::Hybrid => "hybrid",
            MatchType::Filename => "filename",
        };
        f.write_str(s)
    }
}

/// One entry of a ranked result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub filename: String,
    pub path: String,
    /// Min-max normalized keyword score in `[0, 1]`.
    pub keyword_score: Option<f64>,
    /// Best chunk similarity in `[0, 1]`.
    pub semantic_score: Option<f64>,
    pub combined_score: f64,
    pub search_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Lifecycle state of the index coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinatorState::Stopped => "stopped",
            CoordinatorState::Starting => "starting",
            CoordinatorState::Running => "running",
            CoordinatorState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by `get_stats()`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub state: CoordinatorState,
    pub total_documents: u64,
    pub total_chunks: u64,
    pub queue_depth: usize,
    pub last_error_count: u64,
    pub files_processed: u64,
    pub files_unchanged: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_removed: u64,
    pub dropped_events: u64,
    pub in_flight: usize,
    pub vector_enabled: bool,
}

/// Counts reported by a bulk indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkIndexReport {
    /// Regular files found under the scanned roots.
    pub discovered: u64,
    /// Created jobs handed to the queue.
    pub enqueued: u64,
    /// Files whose fingerprint already matched; not enqueued.
    pub unchanged: u64,
    /// Files rejected by the filters during the scan or the pipeline.
    pub skipped: u64,
    /// Files written to the indexes while the run was draining.
    pub processed: u64,
    /// Files whose extraction or index write failed while draining.
    pub failed: u64,
    /// Deleted jobs enqueued for indexed files that no longer exist.
    pub reconciled: u64,
}
