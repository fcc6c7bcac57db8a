//! Filesystem watcher feeding the job queue.
//!
//! Wraps a recursive `notify` watcher and translates its raw events into
//! [`FsEvent`]s. Paths rejected by the [`FileFilter`] are dropped here so
//! excluded trees never reach the queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};

use deepsearch_core::models::FsEvent;

use crate::filter::FileFilter;

/// Stops watching when dropped.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Watch every root recursively. `sink` is called from the watcher
    /// thread and must not block.
    pub fn start<F>(roots: &[PathBuf], filter: Arc<FileFilter>, sink: F) -> Result<Self>
    where
        F: Fn(FsEvent) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for fs_event in translate(&event, &filter) {
                    sink(fs_event);
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch error"),
        })
        .context("Failed to create filesystem watcher")?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            tracing::info!(root = %root.display(), "watching");
        }

        Ok(Self { _watcher: watcher })
    }
}

/// Map one raw notify event to zero or more queue events.
pub fn translate(event: &Event, filter: &FileFilter) -> Vec<FsEvent> {
    let allowed = |p: &PathBuf| filter.path_rejection(p).is_none();
    let first = event.paths.first();

    let raw = match &event.kind {
        NotifyKind::Create(_) => first.map(FsEvent::created),
        NotifyKind::Remove(_) => first.map(FsEvent::deleted),
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let (from, to) = (&event.paths[0], &event.paths[1]);
            return match (allowed(from), allowed(to)) {
                (true, true) => vec![FsEvent::moved(from, to)],
                (true, false) => vec![FsEvent::deleted(from)],
                (false, true) => vec![FsEvent::created(to)],
                (false, false) => Vec::new(),
            };
        }
        NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => first.map(FsEvent::deleted),
        NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => first.map(FsEvent::created),
        NotifyKind::Modify(ModifyKind::Metadata(_)) => None,
        NotifyKind::Modify(_) => first.map(FsEvent::modified),
        _ => None,
    };

    raw.into_iter().filter(|e| allowed(&e.path)).collect()
}
