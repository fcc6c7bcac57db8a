//! Coordinator behaviour against in-memory backends.
//!
//! Files live in a temp dir; extraction is real for text files, except
//! that files named "corrupt*" or starting with `CORRUPT` fail. The embedder hashes
//! words into a small bag-of-words vector, so similar texts score high, and
//! rejects any text containing "unembeddable".

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use deepsearch::config::Config;
use deepsearch::coordinator::{Backends, IndexCoordinator};
use deepsearch::extract::{DefaultExtractor, ExtractError, TextExtractor};
use deepsearch::observer::NoopObserver;
use deepsearch_core::backend::memory::{
    InMemoryFingerprintStore, InMemoryKeywordIndex, InMemoryVectorIndex,
};
use deepsearch_core::embedding::Embedder;
use deepsearch_core::models::{path_key, CoordinatorState, FsEvent, MatchType, SearchKind};
use deepsearch_core::IndexError;

const DIMS: usize = 16;

struct BagOfWords;

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "test/bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("unembeddable")) {
            anyhow::bail!("embedding service rejected the batch");
        }
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split_whitespace() {
                    let mut h = DefaultHasher::new();
                    word.to_lowercase().hash(&mut h);
                    v[(h.finish() % DIMS as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct FlakyExtractor;

impl TextExtractor for FlakyExtractor {
    fn extract(&self, path: &Path, bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.contains("corrupt") || bytes.starts_with(b"CORRUPT") {
            return Err(ExtractError::Pdf("corrupt test file".to_string()));
        }
        DefaultExtractor.extract(path, bytes, mime)
    }
}

/// Holds every `extract` call until released and tracks how many run at once.
#[derive(Default)]
struct GatedExtractor {
    released: AtomicBool,
    entered: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedExtractor {
    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl TextExtractor for GatedExtractor {
    fn extract(&self, path: &Path, bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        while !self.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        DefaultExtractor.extract(path, bytes, mime)
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached within 10s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct Harness {
    dir: TempDir,
    keyword: Arc<InMemoryKeywordIndex>,
    vector: Arc<InMemoryVectorIndex>,
    store: Arc<InMemoryFingerprintStore>,
    coordinator: IndexCoordinator,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.indexing.max_workers = 3;
    config.indexing.batch_size = 4;
    config.indexing.shutdown_grace_secs = 5;
    config.chunking.max_tokens = 8;
    config.chunking.overlap_tokens = 1;
    config.retrieval.similarity_threshold = 0.0;
    config.backend.retry_attempts = 2;
    config.backend.retry_base_ms = 1;
    config.backend.retry_max_ms = 2;
    config
}

fn harness_with(config: Config, store: Arc<InMemoryFingerprintStore>) -> Harness {
    harness_from(config, store, Arc::new(FlakyExtractor))
}

fn harness_from(
    config: Config,
    store: Arc<InMemoryFingerprintStore>,
    extractor: Arc<dyn TextExtractor>,
) -> Harness {
    let keyword = Arc::new(InMemoryKeywordIndex::new());
    let vector = Arc::new(InMemoryVectorIndex::new());
    let coordinator = IndexCoordinator::new(
        config,
        Backends {
            keyword: keyword.clone(),
            vector: vector.clone(),
            fingerprints: store.clone(),
            embedder: Some(Arc::new(BagOfWords)),
            extractor,
        },
        Arc::new(NoopObserver),
    )
    .unwrap();
    Harness {
        dir: TempDir::new().unwrap(),
        keyword,
        vector,
        store,
        coordinator,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), Arc::new(InMemoryFingerprintStore::new()))
}

impl Harness {
    fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn root(&self) -> Vec<PathBuf> {
        vec![self.dir.path().to_path_buf()]
    }

    async fn apply(&self, event: FsEvent) {
        self.coordinator.submit_event(event).unwrap();
        self.coordinator.wait_idle().await;
    }
}

#[tokio::test]
async fn test_indexes_both_backends_and_records_fingerprint() {
    let h = harness();
    let path = h.write("alpha.txt", "alpha release notes for the rust indexer");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;

    let key = path_key(&path);
    assert!(h.keyword.contains(&key));
    assert!(!h.vector.chunk_indices(&key).is_empty());
    let meta = h.keyword.metadata(&key).unwrap();
    assert_eq!(meta.filename, "alpha.txt");
    assert!(meta.indexed_time.is_some());
    assert_eq!(
        h.store.get(&key).unwrap().content_hash,
        meta.content_hash,
        "fingerprint persisted after both writes"
    );

    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.state, CoordinatorState::Running);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_unchanged_file_is_not_rewritten() {
    let h = harness();
    let path = h.write("same.txt", "identical content every time");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;
    let keyword_writes = h.keyword.write_count();
    let vector_writes = h.vector.write_count();
    let first_indexed = h.store.get(&path_key(&path)).unwrap().last_indexed_time;

    h.apply(FsEvent::modified(&path)).await;

    assert_eq!(h.keyword.write_count(), keyword_writes);
    assert_eq!(h.vector.write_count(), vector_writes);
    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.files_unchanged, 1);
    assert!(h.store.get(&path_key(&path)).unwrap().last_indexed_time >= first_indexed);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_deleted_file_disappears_from_all_searches() {
    let h = harness();
    let path = h.write("gone.txt", "ephemeral words about ephemeral things");
    let other = h.write("kept.txt", "ephemeral but kept");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;
    h.apply(FsEvent::created(&other)).await;

    fs::remove_file(&path).unwrap();
    h.apply(FsEvent::deleted(&path)).await;

    let key = path_key(&path);
    let by_name = h.coordinator.search_by_filename("gone", 10).await.unwrap();
    assert!(by_name.iter().all(|r| r.path != key));
    let semantic = h
        .coordinator
        .search("ephemeral things", SearchKind::Semantic, 10)
        .await
        .unwrap();
    assert!(semantic.iter().all(|r| r.path != key));
    assert!(semantic.iter().any(|r| r.path == path_key(&other)));
    assert!(h.store.get(&key).is_none());

    // Deleting again is a no-op.
    h.apply(FsEvent::deleted(&path)).await;
    assert_eq!(h.coordinator.get_stats().await.unwrap().last_error_count, 0);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_created_then_deleted_before_processing_is_a_noop() {
    let h = harness();
    let path = h.write("flash.txt", "here and gone");
    // Queue accepts events before start; nothing consumes them yet.
    h.coordinator.submit_event(FsEvent::created(&path)).unwrap();
    h.coordinator.submit_event(FsEvent::deleted(&path)).unwrap();

    h.coordinator.start().await.unwrap();
    h.coordinator.wait_idle().await;

    assert_eq!(h.keyword.write_count(), 0);
    assert_eq!(h.vector.write_count(), 0);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_extraction_failure_is_isolated() {
    let h = harness();
    let bad = h.write("corrupt.txt", "cannot be read");
    let y = h.write("y.txt", "file y content");
    let z = h.write("z.txt", "file z content");
    h.coordinator.start().await.unwrap();
    for p in [&bad, &y, &z] {
        h.coordinator.submit_event(FsEvent::created(p)).unwrap();
    }
    h.coordinator.wait_idle().await;

    assert!(!h.keyword.contains(&path_key(&bad)));
    assert!(h.keyword.contains(&path_key(&y)));
    assert!(h.keyword.contains(&path_key(&z)));
    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.files_processed, 2);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_extraction_keeps_previous_entry() {
    let h = harness();
    let path = h.write("report.txt", "quarterly numbers look good");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;

    h.write("report.txt", "CORRUPT header, unreadable body");
    h.apply(FsEvent::modified(&path)).await;

    let key = path_key(&path);
    assert_eq!(h.keyword.text(&key).unwrap(), "quarterly numbers look good");
    assert!(!h.vector.chunk_indices(&key).is_empty());
    assert_eq!(h.coordinator.get_stats().await.unwrap().files_failed, 1);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_queue_overflow_is_counted_not_fatal() {
    let mut config = test_config();
    config.indexing.queue_capacity = 2;
    let h = harness_with(config, Arc::new(InMemoryFingerprintStore::new()));

    let mut overflowed = 0;
    for i in 0..5 {
        let path = h.write(&format!("f{}.txt", i), "x");
        match h.coordinator.submit_event(FsEvent::created(&path)) {
            Err(IndexError::QueueOverflow { capacity, .. }) => {
                assert_eq!(capacity, 2);
                overflowed += 1;
            }
            other => {
                other.unwrap();
            }
        }
    }
    assert_eq!(overflowed, 3);
    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.dropped_events, 3);
    assert_eq!(stats.queue_depth, 2);

    h.coordinator.start().await.unwrap();
    h.coordinator.wait_idle().await;
    assert_eq!(h.coordinator.get_stats().await.unwrap().total_documents, 2);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_reindex_replaces_all_chunks() {
    let h = harness();
    let long: String = (0..40).map(|i| format!("word{} ", i)).collect();
    let path = h.write("doc.txt", &long);
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;
    let key = path_key(&path);
    let before = h.vector.chunk_indices(&key);
    assert!(before.len() > 2);
    let old_hash = h.store.get(&key).unwrap().content_hash;

    h.write("doc.txt", "short now");
    h.apply(FsEvent::modified(&path)).await;

    assert_eq!(h.vector.chunk_indices(&key), vec![0]);
    assert_ne!(h.store.get(&key).unwrap().content_hash, old_hash);
    assert_eq!(h.keyword.text(&key).unwrap(), "short now");
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_vector_failure_withholds_fingerprint() {
    let h = harness();
    let path = h.write("partial.txt", "needs both indexes");
    h.vector.set_available(false);
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;

    let key = path_key(&path);
    assert!(h.keyword.contains(&key), "keyword update proceeds independently");
    assert!(h.store.get(&key).is_none());
    let stats = h.coordinator.get_stats().await;
    assert!(stats.is_err(), "chunk count unavailable while vector is offline");

    // Once the vector index is back, the same content is indexed again.
    h.vector.set_available(true);
    h.apply(FsEvent::modified(&path)).await;
    assert!(!h.vector.chunk_indices(&key).is_empty());
    assert!(h.store.get(&key).is_some());
    let stats = h.coordinator.get_stats().await.unwrap();
    assert!(stats.last_error_count >= 1);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_move_reindexes_under_new_path() {
    let h = harness();
    let old = h.write("draft.txt", "moving document text");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&old)).await;

    let new = h.dir.path().join("final.txt");
    fs::rename(&old, &new).unwrap();
    h.apply(FsEvent::moved(&old, &new)).await;

    assert!(!h.keyword.contains(&path_key(&old)));
    assert!(h.vector.chunk_indices(&path_key(&old)).is_empty());
    assert!(h.keyword.contains(&path_key(&new)));
    assert!(h.store.get(&path_key(&old)).is_none());
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_hybrid_degrades_to_surviving_backend() {
    let h = harness();
    let path = h.write("topic.txt", "kubernetes deployment guide");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;

    let both = h
        .coordinator
        .search("kubernetes deployment", SearchKind::Hybrid, 5)
        .await
        .unwrap();
    assert_eq!(both[0].search_type, MatchType::Hybrid);
    assert!(both[0].keyword_score.is_some() && both[0].semantic_score.is_some());

    h.vector.set_available(false);
    let keyword_only = h
        .coordinator
        .search("kubernetes", SearchKind::Hybrid, 5)
        .await
        .unwrap();
    assert_eq!(keyword_only[0].search_type, MatchType::Keyword);

    h.keyword.set_available(false);
    let err = h
        .coordinator
        .search("kubernetes", SearchKind::Hybrid, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Query(_)));

    h.vector.set_available(true);
    let semantic_only = h
        .coordinator
        .search("kubernetes deployment", SearchKind::Hybrid, 5)
        .await
        .unwrap();
    assert_eq!(semantic_only[0].search_type, MatchType::Semantic);
    h.keyword.set_available(true);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_state_errors() {
    let h = harness();
    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
    let err = h.coordinator.bulk_index(&h.root()).await.unwrap_err();
    assert!(matches!(err, IndexError::InvalidState { .. }));

    h.coordinator.start().await.unwrap();
    let err = h.coordinator.start().await.unwrap_err();
    assert!(matches!(
        err,
        IndexError::InvalidState {
            state: CoordinatorState::Running,
            ..
        }
    ));

    h.coordinator.stop().await.unwrap();
    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
    // Stop is idempotent and the coordinator can be restarted.
    h.coordinator.stop().await.unwrap();
    h.coordinator.start().await.unwrap();
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_bulk_index_counts_and_resumes() {
    let h = harness();
    h.write("a/one.txt", "first file");
    h.write("a/two.md", "second file");
    h.write("b/three.txt", "third file");
    h.write("b/corrupt.txt", "bad file");
    h.write("b/skip.log", "excluded by extension");
    h.write("node_modules/dep/index.js", "excluded by directory");

    h.coordinator.start().await.unwrap();
    let report = h.coordinator.bulk_index(&h.root()).await.unwrap();
    assert_eq!(report.discovered, 5);
    assert_eq!(report.enqueued, 4);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    h.coordinator.stop().await.unwrap();

    // A fresh coordinator over the same fingerprint store skips unchanged files
    // and removes the entry for a file deleted while it was down.
    fs::remove_file(h.dir.path().join("a/two.md")).unwrap();
    let h2 = Harness {
        dir: h.dir,
        ..harness_with(test_config(), h.store.clone())
    };
    h2.coordinator.start().await.unwrap();
    let report = h2.coordinator.bulk_index(&h2.root()).await.unwrap();
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.enqueued, 1, "only the failed file is retried");
    assert_eq!(report.reconciled, 1);
    assert!(h2
        .store
        .get(&path_key(&h2.dir.path().join("a/two.md")))
        .is_none());
    h2.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_relative_and_absolute_paths_share_one_entry() {
    let h = harness();
    let local = tempfile::Builder::new()
        .prefix("relroot")
        .tempdir_in(".")
        .unwrap();
    let name = local.path().file_name().unwrap().to_owned();
    fs::write(local.path().join("shared.txt"), "relative roots resolve").unwrap();
    let relative_root = Path::new(".").join(&name);
    let absolute = std::env::current_dir().unwrap().join(&name).join("shared.txt");

    h.coordinator.start().await.unwrap();
    let report = h
        .coordinator
        .bulk_index(&[relative_root.clone()])
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(h.keyword.contains(&path_key(&absolute)));

    // A relative event for the same file finds the existing entry.
    h.apply(FsEvent::modified(relative_root.join("shared.txt"))).await;
    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.files_unchanged, 1);

    fs::remove_file(&absolute).unwrap();
    h.apply(FsEvent::deleted(&absolute)).await;
    assert!(h
        .coordinator
        .search_by_filename("shared", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(h.store.get(&path_key(&absolute)).is_none());
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_chunks() {
    let h = harness();
    let long: String = (0..30).map(|i| format!("word{} ", i)).collect();
    let path = h.write("notes.txt", &long);
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;
    let key = path_key(&path);
    let before = h.vector.chunk_indices(&key);
    assert!(before.len() > 1);

    h.write("notes.txt", "unembeddable replacement text");
    h.apply(FsEvent::modified(&path)).await;

    assert_eq!(h.vector.chunk_indices(&key), before);
    assert!(h.store.get(&key).is_none(), "next event retries the file");
    assert_eq!(h.coordinator.get_stats().await.unwrap().files_failed, 1);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_unbounded_limit_is_accepted() {
    let h = harness();
    let path = h.write("limits.txt", "saturating candidate counts");
    h.coordinator.start().await.unwrap();
    h.apply(FsEvent::created(&path)).await;

    for kind in [SearchKind::Keyword, SearchKind::Semantic, SearchKind::Hybrid] {
        let results = h
            .coordinator
            .search("saturating candidate", kind, usize::MAX)
            .await
            .unwrap();
        assert_eq!(results.len(), 1, "{:?}", kind);
    }
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_older_result_does_not_undo_newer_deletion() {
    let gate = Arc::new(GatedExtractor::default());
    let h = harness_from(
        test_config(),
        Arc::new(InMemoryFingerprintStore::new()),
        gate.clone(),
    );
    let path = h.write("racy.txt", "extracted after its own deletion");
    h.coordinator.start().await.unwrap();

    h.coordinator.submit_event(FsEvent::created(&path)).unwrap();
    wait_until(|| gate.entered.load(Ordering::SeqCst) == 1).await;

    // The deletion overtakes the extraction still in progress.
    h.coordinator.submit_event(FsEvent::deleted(&path)).unwrap();
    // Applied once nothing is queued and only the gated job is outstanding.
    loop {
        let stats = h.coordinator.get_stats().await.unwrap();
        if stats.queue_depth == 0 && stats.in_flight == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    gate.release();
    h.coordinator.wait_idle().await;

    let key = path_key(&path);
    assert!(!h.keyword.contains(&key));
    assert!(h.vector.chunk_indices(&key).is_empty());
    assert!(h.store.get(&key).is_none());
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_extractions_never_exceed_max_workers() {
    let gate = Arc::new(GatedExtractor::default());
    let h = harness_from(
        test_config(),
        Arc::new(InMemoryFingerprintStore::new()),
        gate.clone(),
    );
    h.coordinator.start().await.unwrap();
    for i in 0..8 {
        let path = h.write(&format!("w{}.txt", i), &format!("worker file {}", i));
        h.coordinator.submit_event(FsEvent::created(&path)).unwrap();
    }

    wait_until(|| gate.entered.load(Ordering::SeqCst) == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gate.entered.load(Ordering::SeqCst), 3);

    gate.release();
    h.coordinator.wait_idle().await;
    assert_eq!(gate.peak.load(Ordering::SeqCst), 3);
    assert_eq!(h.coordinator.get_stats().await.unwrap().total_documents, 8);
    h.coordinator.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_cancels_pending_and_abandons_stuck_work() {
    let mut config = test_config();
    config.indexing.max_workers = 1;
    config.indexing.shutdown_grace_secs = 1;
    let gate = Arc::new(GatedExtractor::default());
    let h = harness_from(config, Arc::new(InMemoryFingerprintStore::new()), gate.clone());

    h.coordinator.start().await.unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| h.write(&format!("s{}.txt", i), "never finishes"))
        .collect();
    for p in &paths {
        h.coordinator.submit_event(FsEvent::created(p)).unwrap();
    }
    wait_until(|| gate.entered.load(Ordering::SeqCst) == 1).await;

    let started = Instant::now();
    h.coordinator.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4), "stop waited past its grace");

    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
    let stats = h.coordinator.get_stats().await.unwrap();
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.total_documents, 0);
    assert_eq!(gate.entered.load(Ordering::SeqCst), 1);
    gate.release();

    // A restart picks the files up again.
    h.coordinator.start().await.unwrap();
    for p in &paths {
        h.apply(FsEvent::created(p)).await;
    }
    assert_eq!(h.coordinator.get_stats().await.unwrap().total_documents, 4);
    h.coordinator.stop().await.unwrap();
}
