//! Fixed-size extraction worker pool.
//!
//! `submit` runs the cheap checks inline: Deleted jobs, filter rejections
//! and vanished files become results immediately and never occupy a
//! worker. Everything else goes through a bounded channel to `N` workers.
//! A worker reads the file once, hashes it, and only runs the extractor
//! when the hash differs from the fingerprint table. Extraction runs on the
//! blocking pool under a per-file timeout.
//!
//! A timed-out extraction keeps running on its blocking thread, so each
//! extraction holds one of `N` semaphore permits until the extractor
//! itself returns. A worker whose job timed out can pick up the next job,
//! but that job waits for a permit.
//!
//! Results are delivered on an mpsc channel in completion order.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use deepsearch_core::fingerprint::{content_hash, FingerprintTable};
use deepsearch_core::models::{
    path_key, EventKind, ExtractionResult, FileMetadata, IndexingJob,
};

use crate::extract::{detect_mime, TextExtractor};
use crate::filter::FileFilter;

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    pub extraction_timeout: Duration,
    /// Jobs buffered ahead of the workers before `submit` waits.
    pub buffer: usize,
}

struct Worker {
    extractor: Arc<dyn TextExtractor>,
    filter: Arc<FileFilter>,
    fingerprints: Arc<RwLock<FingerprintTable>>,
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    /// One permit per running extractor call.
    extraction_slots: Arc<Semaphore>,
}

pub struct ExtractionPool {
    jobs: Option<mpsc::Sender<IndexingJob>>,
    results: mpsc::Sender<ExtractionResult>,
    filter: Arc<FileFilter>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl ExtractionPool {
    /// Spawn the workers. Returns the pool and the receiving end of the
    /// result channel.
    pub fn start(
        settings: PoolSettings,
        extractor: Arc<dyn TextExtractor>,
        filter: Arc<FileFilter>,
        fingerprints: Arc<RwLock<FingerprintTable>>,
    ) -> (Self, mpsc::Receiver<ExtractionResult>) {
        let workers_n = settings.workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<IndexingJob>(settings.buffer.max(1));
        let (result_tx, result_rx) = mpsc::channel(settings.buffer.max(1) + workers_n);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let worker = Arc::new(Worker {
            extractor,
            filter: Arc::clone(&filter),
            fingerprints,
            timeout: settings.extraction_timeout,
            in_flight: Arc::clone(&in_flight),
            extraction_slots: Arc::new(Semaphore::new(workers_n)),
        });

        let workers = (0..workers_n)
            .map(|_| {
                let worker = Arc::clone(&worker);
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                tokio::spawn(async move {
                    loop {
                        let job = job_rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        worker.in_flight.fetch_add(1, Ordering::SeqCst);
                        let result = worker.process(job).await;
                        worker.in_flight.fetch_sub(1, Ordering::SeqCst);
                        if result_tx.send(result).await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        (
            Self {
                jobs: Some(job_tx),
                results: result_tx,
                filter,
                workers,
                in_flight,
            },
            result_rx,
        )
    }

    /// Hand a job to the pool. Waits only when the job buffer is full.
    pub async fn submit(&self, job: IndexingJob) -> Result<()> {
        if job.event_kind == EventKind::Deleted {
            return self.deliver(ExtractionResult::deletion(job)).await;
        }
        if let Some(reason) = self.filter.path_rejection(&job.path) {
            return self.deliver(ExtractionResult::skipped(job, reason)).await;
        }
        match tokio::fs::metadata(&job.path).await {
            Ok(meta) if !meta.is_file() => {
                return self
                    .deliver(ExtractionResult::skipped(job, "not a regular file"))
                    .await;
            }
            Ok(meta) => {
                if let Some(reason) = self.filter.size_rejection(meta.len()) {
                    return self.deliver(ExtractionResult::skipped(job, reason)).await;
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return self.deliver(ExtractionResult::missing(job)).await;
            }
            Err(e) => {
                let reason = format!("stat failed: {}", e);
                return self.deliver(ExtractionResult::failed(job, reason)).await;
            }
        }

        let Some(jobs) = &self.jobs else {
            anyhow::bail!("extraction pool is shut down");
        };
        jobs.send(job)
            .await
            .map_err(|_| anyhow::anyhow!("extraction workers have exited"))
    }

    async fn deliver(&self, result: ExtractionResult) -> Result<()> {
        self.results
            .send(result)
            .await
            .map_err(|_| anyhow::anyhow!("result channel closed"))
    }

    /// Jobs currently inside a worker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, let buffered and in-flight jobs finish within
    /// `grace`, then abort the rest. Returns the number of aborted workers.
    pub async fn shutdown(&mut self, grace: Duration) -> usize {
        self.jobs = None;
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;
        for mut handle in self.workers.drain(..) {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            tracing::warn!(aborted, "extraction workers abandoned after grace period");
        }
        aborted
    }
}

impl Worker {
    async fn process(&self, job: IndexingJob) -> ExtractionResult {
        let path = job.path.clone();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return ExtractionResult::missing(job),
            Err(e) => return ExtractionResult::failed(job, format!("read failed: {}", e)),
        };
        let fs_meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return ExtractionResult::missing(job),
            Err(e) => return ExtractionResult::failed(job, format!("stat failed: {}", e)),
        };
        // The file may have grown since submit.
        if let Some(reason) = self.filter.size_rejection(bytes.len() as u64) {
            return ExtractionResult::skipped(job, reason);
        }

        let mime_type = detect_mime(&path, &bytes);
        let metadata = file_metadata(&path, &fs_meta, bytes.len() as u64, &bytes, &mime_type);

        let unchanged = {
            let table = self
                .fingerprints
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            table.matches(&metadata.path, &metadata.content_hash)
        };
        if unchanged {
            return ExtractionResult::unchanged(job, metadata);
        }

        let permit = match Arc::clone(&self.extraction_slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return ExtractionResult::failed(job, "extraction pool is shut down"),
        };
        let extractor = Arc::clone(&self.extractor);
        let task = tokio::task::spawn_blocking(move || {
            let out = extractor.extract(&path, &bytes, &mime_type);
            drop(bytes);
            drop(permit);
            out
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(text))) => ExtractionResult::extracted(job, metadata, text),
            Ok(Ok(Err(e))) => ExtractionResult::failed(job, e.to_string()),
            Ok(Err(join)) => ExtractionResult::failed(job, format!("extractor panicked: {}", join)),
            Err(_) => ExtractionResult::failed(
                job,
                format!("extraction timed out after {:?}", self.timeout),
            ),
        }
    }
}

/// Timestamps truncated to microseconds, the precision the stores keep.
pub(crate) fn file_times(meta: &std::fs::Metadata) -> (DateTime<Utc>, DateTime<Utc>) {
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .map(truncate_micros)
        .unwrap_or_default();
    let created = meta
        .created()
        .map(DateTime::<Utc>::from)
        .map(truncate_micros)
        .unwrap_or(modified);
    (modified, created)
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

fn file_metadata(
    path: &Path,
    fs_meta: &std::fs::Metadata,
    size: u64,
    bytes: &[u8],
    mime_type: &str,
) -> FileMetadata {
    let (modified_time, created_time) = file_times(fs_meta);
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    FileMetadata {
        path: path_key(path),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        extension: if ext.is_empty() {
            String::new()
        } else {
            format!(".{}", ext)
        },
        file_type: if ext.is_empty() {
            "unknown".to_string()
        } else {
            ext
        },
        mime_type: mime_type.to_string(),
        size,
        modified_time,
        created_time,
        content_hash: content_hash(bytes),
        indexed_time: None,
    }
}
