//! Index coordinator: lifecycle, sequenced index updates, bulk indexing
//! and search.
//!
//! # Pipeline
//!
//! ```text
//! events ─▶ JobQueue ─▶ dispatcher ─▶ ExtractionPool (N workers)
//!                                          │ results, completion order
//!                                          ▼
//!                              sequencer (one job at a time)
//!                              ├─▶ KeywordBackend
//!                              ├─▶ VectorBackend (chunk + embed)
//!                              └─▶ fingerprint table + FingerprintStore
//! ```
//!
//! The sequencer is the only writer of the backends and of the fingerprint
//! table. Keyword and vector updates for a job are retried independently;
//! the fingerprint is recorded only when both succeed, so a partial failure
//! is retried on the next event for the path.
//!
//! # States
//!
//! `Stopped → Starting → Running → Stopping → Stopped`. `start()` outside
//! `Stopped` fails with [`IndexError::InvalidState`]. Searches are served
//! in every state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use deepsearch_core::backend::{preview, FingerprintStore, KeywordBackend, VectorBackend};
use deepsearch_core::chunk::chunk_text;
use deepsearch_core::embedding::Embedder;
use deepsearch_core::fingerprint::{content_hash, FingerprintTable};
use deepsearch_core::merge::{normalize_scores, HybridMerger};
use deepsearch_core::models::{
    path_key, BulkIndexReport, ChunkRecord, CoordinatorState, EmbeddedChunk, EventKind,
    ExtractionOutcome, ExtractionResult, FileMetadata, FingerprintEntry, FsEvent, IndexStats,
    MatchType, SearchKind, SearchResult, SemanticHit,
};
use deepsearch_core::IndexError;

use crate::config::{absolute_path, Config};
use crate::extract::TextExtractor;
use crate::filter::FileFilter;
use crate::observer::{IndexEvent, IndexObserver};
use crate::pool::{file_times, ExtractionPool, PoolSettings};
use crate::queue::{EnqueueOutcome, JobQueue};
use crate::retry::RetryPolicy;
use crate::scan;

/// Characters kept in a chunk's `text_preview`.
const PREVIEW_CHARS: usize = 200;

/// Storage and model collaborators handed to the coordinator.
pub struct Backends {
    pub keyword: Arc<dyn KeywordBackend>,
    pub vector: Arc<dyn VectorBackend>,
    pub fingerprints: Arc<dyn FingerprintStore>,
    /// `None` disables vector indexing and semantic search.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub extractor: Arc<dyn TextExtractor>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    unchanged: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    removed: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }
}

/// Applies extraction results to the backends. One instance, one task.
struct Sequencer {
    keyword: Arc<dyn KeywordBackend>,
    vector: Arc<dyn VectorBackend>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Arc<dyn FingerprintStore>,
    fingerprints: Arc<RwLock<FingerprintTable>>,
    queue: Arc<JobQueue>,
    observer: Arc<dyn IndexObserver>,
    counters: Arc<Counters>,
    retry: RetryPolicy,
    max_tokens: usize,
    overlap_tokens: usize,
    embed_batch: usize,
    /// Newest job sequence applied per path; older results are stale.
    applied: Mutex<HashMap<String, u64>>,
}

struct Runtime {
    dispatcher: JoinHandle<()>,
    sequencer: JoinHandle<()>,
}

pub struct IndexCoordinator {
    config: Config,
    keyword: Arc<dyn KeywordBackend>,
    vector: Arc<dyn VectorBackend>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Arc<dyn FingerprintStore>,
    extractor: Arc<dyn TextExtractor>,
    observer: Arc<dyn IndexObserver>,
    filter: Arc<FileFilter>,
    queue: Arc<JobQueue>,
    fingerprints: Arc<RwLock<FingerprintTable>>,
    counters: Arc<Counters>,
    merger: HybridMerger,
    state: Mutex<CoordinatorState>,
    runtime: Mutex<Option<Runtime>>,
}

impl IndexCoordinator {
    /// Build a stopped coordinator. Validates `config`.
    pub fn new(
        config: Config,
        backends: Backends,
        observer: Arc<dyn IndexObserver>,
    ) -> Result<Self, IndexError> {
        config.validate()?;
        let filter = FileFilter::from_config(&config.indexing)
            .map_err(|e| IndexError::Configuration(e.to_string()))?;
        let queue = Arc::new(JobQueue::new(
            config.indexing.queue_capacity,
            Arc::clone(&observer),
        ));
        let merger = HybridMerger::new(
            config.retrieval.keyword_weight,
            config.retrieval.semantic_weight,
        );
        Ok(Self {
            keyword: backends.keyword,
            vector: backends.vector,
            embedder: backends.embedder,
            store: backends.fingerprints,
            extractor: backends.extractor,
            observer,
            filter: Arc::new(filter),
            queue,
            fingerprints: Arc::new(RwLock::new(FingerprintTable::new())),
            counters: Arc::new(Counters::default()),
            merger,
            state: Mutex::new(CoordinatorState::Stopped),
            runtime: Mutex::new(None),
            config,
        })
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CoordinatorState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.observer.on_event(&IndexEvent::StateChanged { state });
    }

    /// Move from `from` to `to`, or fail with `InvalidState` naming `operation`.
    fn transition(
        &self,
        operation: &'static str,
        from: CoordinatorState,
        to: CoordinatorState,
    ) -> Result<(), IndexError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != from {
                return Err(IndexError::InvalidState {
                    operation,
                    state: *state,
                });
            }
            *state = to;
        }
        self.observer.on_event(&IndexEvent::StateChanged { state: to });
        Ok(())
    }

    pub fn vector_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    /// Start the pipeline.
    pub async fn start(&self) -> Result<(), IndexError> {
        self.launch().await?;
        self.set_state(CoordinatorState::Running);
        Ok(())
    }

    /// Start the pipeline and enqueue every file under the monitored paths
    /// whose fingerprint does not match. Returns the scan counts; the jobs
    /// are processed in the background.
    pub async fn start_with_scan(&self) -> Result<BulkIndexReport, IndexError> {
        self.launch().await?;
        let roots = self.config.indexing.monitored_paths.clone();
        let report = self.scan_and_enqueue(&roots).await;
        self.set_state(CoordinatorState::Running);
        Ok(report)
    }

    /// Stopped → Starting: load fingerprints, spawn dispatcher and sequencer.
    async fn launch(&self) -> Result<(), IndexError> {
        self.transition("start", CoordinatorState::Stopped, CoordinatorState::Starting)?;

        let entries = match self.store.load_all().await {
            Ok(entries) => entries,
            Err(e) => {
                self.set_state(CoordinatorState::Stopped);
                return Err(IndexError::BackendUnavailable {
                    backend: "fingerprint",
                    reason: format!("{:#}", e),
                });
            }
        };
        let loaded = entries.len();
        *self
            .fingerprints
            .write()
            .unwrap_or_else(PoisonError::into_inner) = entries.into_iter().collect();
        tracing::info!(fingerprints = loaded, "loaded fingerprint table");

        self.queue.reopen();
        let ix = &self.config.indexing;
        let (pool, results) = ExtractionPool::start(
            PoolSettings {
                workers: ix.max_workers,
                extraction_timeout: Duration::from_secs(ix.extraction_timeout_secs),
                buffer: ix.max_workers * 2,
            },
            Arc::clone(&self.extractor),
            Arc::clone(&self.filter),
            Arc::clone(&self.fingerprints),
        );

        let sequencer = Arc::new(Sequencer {
            keyword: Arc::clone(&self.keyword),
            vector: Arc::clone(&self.vector),
            embedder: self.embedder.clone(),
            store: Arc::clone(&self.store),
            fingerprints: Arc::clone(&self.fingerprints),
            queue: Arc::clone(&self.queue),
            observer: Arc::clone(&self.observer),
            counters: Arc::clone(&self.counters),
            retry: RetryPolicy::from_config(&self.config.backend),
            max_tokens: self.config.chunking.max_tokens,
            overlap_tokens: self.config.chunking.overlap_tokens,
            embed_batch: self.config.embedding.batch_size,
            applied: Mutex::new(HashMap::new()),
        });

        let runtime = Runtime {
            dispatcher: tokio::spawn(dispatch(
                Arc::clone(&self.queue),
                pool,
                ix.batch_size,
                self.grace(),
            )),
            sequencer: tokio::spawn(sequence(sequencer, results)),
        };
        *self.runtime.lock().unwrap_or_else(PoisonError::into_inner) = Some(runtime);
        tracing::info!(workers = ix.max_workers, "indexing pipeline started");
        Ok(())
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.indexing.shutdown_grace_secs)
    }

    /// Running → Stopping → Stopped.
    ///
    /// Pending jobs are cancelled; in-flight extractions and index writes
    /// get the shutdown grace period, after which they are abandoned.
    /// Stopping an already stopped coordinator is a no-op.
    pub async fn stop(&self) -> Result<(), IndexError> {
        if self.state() == CoordinatorState::Stopped {
            return Ok(());
        }
        self.transition("stop", CoordinatorState::Running, CoordinatorState::Stopping)?;

        let cancelled = self.queue.cancel_pending();
        self.queue.close();
        if cancelled > 0 {
            tracing::info!(cancelled, "cancelled pending jobs");
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Runtime {
            mut dispatcher,
            mut sequencer,
        }) = runtime
        {
            // The dispatcher applies the grace period to the workers itself.
            let deadline = tokio::time::Instant::now() + self.grace() * 2;
            if tokio::time::timeout_at(deadline, &mut dispatcher)
                .await
                .is_err()
            {
                dispatcher.abort();
            }
            if tokio::time::timeout_at(deadline, &mut sequencer)
                .await
                .is_err()
            {
                tracing::warn!("index writes still running after grace period; abandoning");
                sequencer.abort();
            }
        }
        self.queue.abandon_outstanding();

        self.set_state(CoordinatorState::Stopped);
        tracing::info!("indexing pipeline stopped");
        Ok(())
    }

    /// Feed a filesystem event into the queue. Never blocks.
    ///
    /// Relative paths are resolved against the working directory so they
    /// share keys with scanned and watched paths.
    pub fn submit_event(&self, mut event: FsEvent) -> Result<EnqueueOutcome, IndexError> {
        event.path = absolute_path(&event.path);
        event.old_path = event.old_path.as_deref().map(absolute_path);
        self.queue.enqueue(event)
    }

    /// Wait until every queued job has been applied.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Walk `paths`, enqueue changed files, reconcile vanished ones and, when
    /// running, wait for the pipeline to drain.
    pub async fn bulk_index(&self, paths: &[PathBuf]) -> Result<BulkIndexReport, IndexError> {
        let state = self.state();
        if !matches!(
            state,
            CoordinatorState::Running | CoordinatorState::Starting
        ) {
            return Err(IndexError::InvalidState {
                operation: "bulk index",
                state,
            });
        }

        let before = self.snapshot_counters();
        let mut report = self.scan_and_enqueue(paths).await;
        if state == CoordinatorState::Running {
            self.queue.wait_idle().await;
            let after = self.snapshot_counters();
            report.processed = after.processed - before.processed;
            report.failed = after.failed - before.failed;
            report.skipped += after.skipped - before.skipped;
        }
        Ok(report)
    }

    fn snapshot_counters(&self) -> BulkIndexReport {
        BulkIndexReport {
            processed: Counters::get(&self.counters.processed),
            failed: Counters::get(&self.counters.failed),
            skipped: Counters::get(&self.counters.skipped),
            ..BulkIndexReport::default()
        }
    }

    async fn scan_and_enqueue(&self, roots: &[PathBuf]) -> BulkIndexReport {
        let mut report = BulkIndexReport::default();
        let batch_size = self.config.indexing.batch_size;
        let follow = self.config.indexing.follow_symlinks;

        for root in roots {
            let root = &absolute_path(root);
            self.observer
                .on_event(&IndexEvent::Discovering { root: root.clone() });
            let filter = Arc::clone(&self.filter);
            let walk_root = root.clone();
            let discovery = match tokio::task::spawn_blocking(move || {
                scan::discover(&walk_root, &filter, follow)
            })
            .await
            {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "scan failed");
                    continue;
                }
            };
            report.discovered += discovery.files.len() as u64 + discovery.rejected;
            report.skipped += discovery.rejected;

            let mut candidates = Vec::new();
            for path in discovery.files {
                match self.needs_indexing(&path).await {
                    Candidate::Index { known } => candidates.push((path, known)),
                    Candidate::Unchanged => report.unchanged += 1,
                    Candidate::Skip(reason) => {
                        report.skipped += 1;
                        self.observer
                            .on_event(&IndexEvent::Skipped { path, reason });
                    }
                }
            }

            let total = candidates.len() as u64;
            for batch in candidates.chunks(batch_size) {
                for (path, known) in batch {
                    // A known path is a modification: a Deleted arriving
                    // before it is processed must still remove the entry.
                    let event = if *known {
                        FsEvent::modified(path)
                    } else {
                        FsEvent::created(path)
                    };
                    if self.queue.enqueue_wait(event).await != EnqueueOutcome::Closed {
                        report.enqueued += 1;
                    }
                }
                self.observer.on_event(&IndexEvent::Enqueued {
                    n: report.enqueued,
                    total,
                });
            }

            report.reconciled += self.reconcile(root).await;
        }
        report
    }

    /// Cheap stat check first; the hash decides when the stat differs.
    async fn needs_indexing(&self, path: &Path) -> Candidate {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => return Candidate::Skip(format!("stat failed: {}", e)),
        };
        if let Some(reason) = self.filter.size_rejection(meta.len()) {
            return Candidate::Skip(reason);
        }
        let key = path_key(path);
        let (modified, _) = file_times(&meta);
        let known_hash = {
            let table = self.fingerprints.read().unwrap_or_else(PoisonError::into_inner);
            if table.stat_matches(&key, meta.len(), modified) {
                return Candidate::Unchanged;
            }
            table.get(&key).map(|e| e.content_hash.clone())
        };
        let Some(known_hash) = known_hash else {
            return Candidate::Index { known: false };
        };
        match tokio::fs::read(path).await {
            Ok(bytes) if content_hash(&bytes) == known_hash => Candidate::Unchanged,
            _ => Candidate::Index { known: true },
        }
    }

    /// Enqueue deletions for indexed files under `root` that no longer exist.
    async fn reconcile(&self, root: &Path) -> u64 {
        let known = self
            .fingerprints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .paths_under(root);
        let mut reconciled = 0;
        for path in known {
            if tokio::fs::try_exists(&path).await.unwrap_or(true) {
                continue;
            }
            if self.queue.enqueue_wait(FsEvent::deleted(&path)).await != EnqueueOutcome::Closed {
                reconciled += 1;
            }
        }
        if reconciled > 0 {
            tracing::info!(root = %root.display(), reconciled, "removing vanished files");
        }
        reconciled
    }

    /// Ranked results for `query`.
    ///
    /// Hybrid queries both backends concurrently; if one fails, the other's
    /// results are returned with their own `search_type`. Fails only when
    /// no backend could answer.
    pub async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = limit.saturating_mul(self.config.retrieval.candidate_multiplier);

        match kind {
            SearchKind::Keyword => {
                let hits = self
                    .keyword
                    .search(query, candidates)
                    .await
                    .map_err(IndexError::keyword_backend)?;
                Ok(self.merger.keyword_only(&hits, limit))
            }
            SearchKind::Semantic => {
                let hits = self
                    .semantic_hits(query, candidates)
                    .await
                    .map_err(IndexError::vector_backend)?;
                Ok(self.merger.semantic_only(&hits, limit))
            }
            SearchKind::Hybrid => {
                let (keyword, semantic) = tokio::join!(
                    self.keyword.search(query, candidates),
                    self.semantic_hits(query, candidates)
                );
                match (keyword, semantic) {
                    (Ok(kw), Ok(sem)) => Ok(self.merger.merge(&kw, &sem, limit)),
                    (Ok(kw), Err(e)) => {
                        if self.vector_enabled() {
                            tracing::warn!(error = %e, "vector search failed; keyword results only");
                        }
                        Ok(self.merger.keyword_only(&kw, limit))
                    }
                    (Err(e), Ok(sem)) => {
                        tracing::warn!(error = %e, "keyword search failed; semantic results only");
                        Ok(self.merger.semantic_only(&sem, limit))
                    }
                    (Err(kw), Err(sem)) => Err(IndexError::Query(format!(
                        "no search backend available (keyword: {}; vector: {})",
                        kw, sem
                    ))),
                }
            }
        }
    }

    async fn semantic_hits(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SemanticHit>> {
        let Some(embedder) = &self.embedder else {
            anyhow::bail!("vector indexing is disabled");
        };
        let mut vectors = embedder.embed(&[query.to_string()]).await?;
        let Some(query_vec) = vectors.pop() else {
            anyhow::bail!("embedder returned no vector for the query");
        };
        self.vector
            .similarity_search(
                &query_vec,
                top_k,
                self.config.retrieval.similarity_threshold,
            )
            .await
    }

    /// Case-insensitive substring match on file names.
    pub async fn search_by_filename(
        &self,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if pattern.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let hits = self
            .keyword
            .search_by_filename(pattern.trim(), limit)
            .await
            .map_err(IndexError::keyword_backend)?;
        Ok(normalize_scores(&hits)
            .into_iter()
            .map(|(hit, score)| SearchResult {
                filename: hit.filename.clone(),
                path: hit.path.clone(),
                keyword_score: Some(score),
                semantic_score: None,
                combined_score: score,
                search_type: MatchType::Filename,
                snippet: None,
            })
            .collect())
    }

    pub async fn get_stats(&self) -> Result<IndexStats, IndexError> {
        let total_documents = self
            .keyword
            .document_count()
            .await
            .map_err(IndexError::keyword_backend)?;
        let total_chunks = if self.vector_enabled() {
            self.vector
                .chunk_count()
                .await
                .map_err(IndexError::vector_backend)?
        } else {
            0
        };
        let c = &self.counters;
        Ok(IndexStats {
            state: self.state(),
            total_documents,
            total_chunks,
            queue_depth: self.queue.len(),
            last_error_count: Counters::get(&c.errors),
            files_processed: Counters::get(&c.processed),
            files_unchanged: Counters::get(&c.unchanged),
            files_skipped: Counters::get(&c.skipped),
            files_failed: Counters::get(&c.failed),
            files_removed: Counters::get(&c.removed),
            dropped_events: self.queue.dropped_count(),
            in_flight: self.queue.outstanding(),
            vector_enabled: self.vector_enabled(),
        })
    }
}

enum Candidate {
    /// `known` is set when the path already has a fingerprint.
    Index { known: bool },
    Unchanged,
    Skip(String),
}

async fn dispatch(
    queue: Arc<JobQueue>,
    mut pool: ExtractionPool,
    batch_size: usize,
    grace: Duration,
) {
    while let Some(batch) = queue.dequeue_batch(batch_size).await {
        for job in batch {
            let path = job.path.clone();
            if let Err(e) = pool.submit(job).await {
                tracing::warn!(path = %path.display(), error = %e, "dispatch failed");
                queue.task_done(1);
            }
        }
    }
    pool.shutdown(grace).await;
}

/// Enqueue a follow-up job from inside the pipeline without dropping it.
///
/// The sequencer must not wait for room itself: the workers may be waiting
/// on the sequencer. On overflow the wait moves to a background task.
fn requeue(queue: &Arc<JobQueue>, event: FsEvent) {
    if let Err(e) = queue.enqueue(event.clone()) {
        tracing::warn!(path = %event.path.display(), error = %e, "queue full; re-enqueue deferred");
        let queue = Arc::clone(queue);
        tokio::spawn(async move {
            queue.enqueue_wait(event).await;
        });
    }
}

async fn sequence(sequencer: Arc<Sequencer>, mut results: mpsc::Receiver<ExtractionResult>) {
    while let Some(result) = results.recv().await {
        sequencer.apply(result).await;
        sequencer.queue.task_done(1);
        if sequencer.queue.is_idle() {
            sequencer
                .applied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }
}

impl Sequencer {
    fn table(&self) -> std::sync::RwLockReadGuard<'_, FingerprintTable> {
        self.fingerprints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> std::sync::RwLockWriteGuard<'_, FingerprintTable> {
        self.fingerprints.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// False when a newer job for the same path was already applied.
    fn claim(&self, key: &str, seq: u64) -> bool {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        match applied.get(key) {
            Some(&newest) if newest > seq => false,
            _ => {
                applied.insert(key.to_string(), seq);
                true
            }
        }
    }

    async fn apply(&self, result: ExtractionResult) {
        let key = path_key(&result.path);
        if !self.claim(&key, result.job.seq) {
            tracing::debug!(path = %result.path.display(), "dropping stale result");
            return;
        }

        if result.job.event_kind == EventKind::Moved {
            if let Some(old) = &result.job.old_path {
                self.remove(old).await;
            }
        }

        match result.outcome {
            ExtractionOutcome::Deletion | ExtractionOutcome::Missing => {
                self.remove(&result.path).await;
            }
            ExtractionOutcome::Skipped { reason } => {
                Counters::bump(&self.counters.skipped);
                self.observer.on_event(&IndexEvent::Skipped {
                    path: result.path,
                    reason,
                });
            }
            ExtractionOutcome::Failed { reason } => {
                Counters::bump(&self.counters.failed);
                Counters::bump(&self.counters.errors);
                self.observer.on_event(&IndexEvent::ExtractionFailed {
                    path: result.path,
                    reason,
                });
            }
            ExtractionOutcome::Unchanged | ExtractionOutcome::Extracted => {
                let Some(metadata) = result.metadata else {
                    return;
                };
                // The file may have been deleted after extraction.
                if !tokio::fs::try_exists(&result.path).await.unwrap_or(false) {
                    self.remove(&result.path).await;
                    return;
                }
                if result.outcome == ExtractionOutcome::Unchanged {
                    self.refresh(&result.path, metadata).await;
                } else {
                    self.index(&result.path, metadata, &result.extracted_text)
                        .await;
                }
            }
        }
    }

    /// Content unchanged: bump bookkeeping only.
    async fn refresh(&self, path: &Path, metadata: FileMetadata) {
        let now = Utc::now();
        let entry = {
            let mut table = self.table_mut();
            if !table.matches(&metadata.path, &metadata.content_hash) {
                None
            } else {
                table.touch(&metadata.path, now);
                table.get(&metadata.path).cloned()
            }
        };
        let Some(entry) = entry else {
            // The fingerprint changed after the worker compared it.
            requeue(&self.queue, FsEvent::modified(path));
            return;
        };
        if let Err(e) = self.store.save(&entry).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist fingerprint");
        }
        Counters::bump(&self.counters.unchanged);
        self.observer.on_event(&IndexEvent::Unchanged {
            path: path.to_path_buf(),
        });
    }

    async fn index(&self, path: &Path, mut metadata: FileMetadata, text: &str) {
        if self
            .table()
            .matches(&metadata.path, &metadata.content_hash)
        {
            return self.refresh(path, metadata).await;
        }
        let now = Utc::now();
        metadata.indexed_time = Some(now);

        let keyword_write = self
            .retry
            .run("keyword", || self.keyword.upsert(&metadata, text));
        let vector_write = async {
            match &self.embedder {
                Some(embedder) => self
                    .retry
                    .run("vector", || self.replace_chunks(embedder.as_ref(), &metadata, text, now))
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let (keyword_res, vector_res) = tokio::join!(keyword_write, vector_write);

        let mut failures = Vec::new();
        if let Err(e) = keyword_res {
            failures.push(("keyword", e));
        }
        let chunks = match vector_res {
            Ok(n) => n.unwrap_or(0),
            Err(e) => {
                failures.push(("vector", e));
                0
            }
        };

        if !failures.is_empty() {
            // Forget the old fingerprint so the next event re-indexes.
            self.forget(&metadata.path).await;
            Counters::bump(&self.counters.failed);
            for (backend, error) in failures {
                Counters::bump(&self.counters.errors);
                self.observer.on_event(&IndexEvent::BackendFailed {
                    path: path.to_path_buf(),
                    backend,
                    error: format!("{:#}", error),
                });
            }
            return;
        }

        let entry = FingerprintEntry {
            path: metadata.path.clone(),
            content_hash: metadata.content_hash.clone(),
            size: metadata.size,
            modified_time: metadata.modified_time,
            last_indexed_time: now,
        };
        if let Err(e) = self.retry.run("fingerprint", || self.store.save(&entry)).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist fingerprint");
        }
        self.table_mut().insert(entry);
        Counters::bump(&self.counters.processed);
        self.observer.on_event(&IndexEvent::Indexed {
            path: path.to_path_buf(),
            chunks,
        });
    }

    /// Chunk and embed the new text, then swap it in for the file's old
    /// chunks. An embedding failure leaves the old chunks in place. Returns
    /// the number of chunks written.
    async fn replace_chunks(
        &self,
        embedder: &dyn Embedder,
        metadata: &FileMetadata,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let chunks = chunk_text(text, self.max_tokens, self.overlap_tokens);

        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }
            for (chunk, embedding) in batch.iter().zip(vectors) {
                if embedding.len() != embedder.dims() {
                    anyhow::bail!(
                        "embedding has {} dimensions, expected {}",
                        embedding.len(),
                        embedder.dims()
                    );
                }
                embedded.push(EmbeddedChunk {
                    record: ChunkRecord {
                        chunk_id: ChunkRecord::chunk_id(&metadata.path, chunk.index),
                        source_path: metadata.path.clone(),
                        chunk_index: chunk.index,
                        start_char: chunk.start_char,
                        end_char: chunk.end_char,
                        text_preview: preview(&chunk.text, PREVIEW_CHARS),
                        embedding_model: embedder.model_name().to_string(),
                        indexed_time: now,
                    },
                    embedding,
                });
            }
        }
        self.vector.delete_chunks(&metadata.path).await?;
        if !embedded.is_empty() {
            self.vector.upsert_chunks(&embedded).await?;
        }
        Ok(embedded.len())
    }

    /// Remove a path from both backends and the fingerprint table.
    /// Absent paths are a no-op.
    async fn remove(&self, path: &Path) {
        let key = path_key(path);
        let was_indexed = self.table().get(&key).is_some();

        let keyword_delete = self.retry.run("keyword", || self.keyword.delete(&key));
        let vector_delete = async {
            match self.embedder {
                Some(_) => self.retry.run("vector", || self.vector.delete_chunks(&key)).await,
                None => Ok(()),
            }
        };
        let (keyword_res, vector_res) = tokio::join!(keyword_delete, vector_delete);
        self.forget(&key).await;

        let mut ok = true;
        for (backend, res) in [("keyword", keyword_res), ("vector", vector_res)] {
            if let Err(e) = res {
                ok = false;
                Counters::bump(&self.counters.errors);
                self.observer.on_event(&IndexEvent::BackendFailed {
                    path: path.to_path_buf(),
                    backend,
                    error: format!("{:#}", e),
                });
            }
        }
        if ok && was_indexed {
            Counters::bump(&self.counters.removed);
            self.observer.on_event(&IndexEvent::Removed {
                path: path.to_path_buf(),
            });
        }
    }

    /// Drop the fingerprint so the path is treated as never indexed.
    async fn forget(&self, key: &str) {
        let had = self.table_mut().remove(key).is_some();
        if had {
            if let Err(e) = self.retry.run("fingerprint", || self.store.remove(key)).await {
                tracing::warn!(path = key, error = %e, "failed to remove fingerprint");
            }
        }
    }
}
