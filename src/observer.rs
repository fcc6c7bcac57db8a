//! Pipeline event reporting.
//!
//! The queue, extraction pool and coordinator report per-file outcomes
//! through an injected [`IndexObserver`]. The CLI picks an implementation
//! with `--progress`: human lines via `tracing`, one JSON object per line on
//! **stderr**, or nothing. Stdout stays parseable for scripts.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use deepsearch_core::models::CoordinatorState;
use serde::Serialize;

/// A single pipeline event.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    StateChanged {
        state: CoordinatorState,
    },
    /// Bulk scan started walking a root.
    Discovering {
        root: PathBuf,
    },
    /// Bulk scan enqueued `n` of `total` candidate files.
    Enqueued {
        n: u64,
        total: u64,
    },
    Indexed {
        path: PathBuf,
        chunks: usize,
    },
    Unchanged {
        path: PathBuf,
    },
    Removed {
        path: PathBuf,
    },
    Skipped {
        path: PathBuf,
        reason: String,
    },
    ExtractionFailed {
        path: PathBuf,
        reason: String,
    },
    BackendFailed {
        path: PathBuf,
        backend: &'static str,
        error: String,
    },
    QueueOverflow {
        path: PathBuf,
        capacity: usize,
        dropped_total: u64,
    },
}

/// Receives pipeline events. Implementations must be cheap and non-blocking.
pub trait IndexObserver: Send + Sync {
    fn on_event(&self, event: &IndexEvent);
}

/// Human-readable events through `tracing`.
pub struct TracingObserver;

impl IndexObserver for TracingObserver {
    fn on_event(&self, event: &IndexEvent) {
        match event {
            IndexEvent::StateChanged { state } => tracing::info!(%state, "coordinator state"),
            IndexEvent::Discovering { root } => {
                tracing::info!(root = %root.display(), "discovering files")
            }
            IndexEvent::Enqueued { n, total } => tracing::info!(
                "enqueued {} / {} files",
                format_number(*n),
                format_number(*total)
            ),
            IndexEvent::Indexed { path, chunks } => {
                tracing::info!(path = %path.display(), chunks, "indexed")
            }
            IndexEvent::Unchanged { path } => {
                tracing::debug!(path = %path.display(), "unchanged")
            }
            IndexEvent::Removed { path } => tracing::info!(path = %path.display(), "removed"),
            IndexEvent::Skipped { path, reason } => {
                tracing::debug!(path = %path.display(), %reason, "skipped")
            }
            IndexEvent::ExtractionFailed { path, reason } => {
                tracing::warn!(path = %path.display(), %reason, "extraction failed")
            }
            IndexEvent::BackendFailed {
                path,
                backend,
                error,
            } => tracing::warn!(path = %path.display(), backend, %error, "index update failed"),
            IndexEvent::QueueOverflow {
                path,
                capacity,
                dropped_total,
            } => tracing::warn!(
                path = %path.display(),
                capacity,
                dropped_total,
                "job queue full, event dropped"
            ),
        }
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonObserver;

impl IndexObserver for JsonObserver {
    fn on_event(&self, event: &IndexEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// Discards every event.
pub struct NoopObserver;

impl IndexObserver for NoopObserver {
    fn on_event(&self, _event: &IndexEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human, or JSON.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: {}. Use human, json, or off.", other),
        }
    }

    pub fn observer(&self) -> Arc<dyn IndexObserver> {
        match self {
            ProgressMode::Off => Arc::new(NoopObserver),
            ProgressMode::Human => Arc::new(TracingObserver),
            ProgressMode::Json => Arc::new(JsonObserver),
        }
    }
}
