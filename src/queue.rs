//! Bounded, coalescing job queue.
//!
//! Holds at most one pending [`IndexingJob`] per path. A new event for a
//! pending path is folded into the existing job:
//!
//! | pending \ incoming | Created / Modified | Deleted | Moved here |
//! |--------------------|--------------------|---------|------------|
//! | Created            | Created            | *cancelled* | Moved  |
//! | Modified           | Modified           | Deleted | Moved      |
//! | Deleted            | Modified           | Deleted | Moved      |
//! | Moved              | Moved              | Deleted (+ Deleted for the old path) | Moved |
//!
//! A Moved event also cancels any pending job for its old path. Folding
//! keeps the job's position (first enqueue time) and stamps it with a new
//! sequence number.
//!
//! [`JobQueue::enqueue`] never blocks: when the queue is full, an event for
//! a path that is not already pending is dropped, the overflow counter is
//! incremented and the observer is told. Pending jobs are never evicted.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;

use deepsearch_core::models::{EventKind, FsEvent, IndexingJob};
use deepsearch_core::IndexError;

use crate::observer::{IndexEvent, IndexObserver};

/// What `enqueue` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was added.
    Queued,
    /// Folded into the pending job for the same path.
    Coalesced,
    /// Cancelled a pending Created job; nothing remains for the path.
    Cancelled,
    /// The queue is closed; the event was ignored.
    Closed,
}

struct Pending {
    job: IndexingJob,
    slot: u64,
}

#[derive(Default)]
struct State {
    /// FIFO of (path, slot). Entries whose slot no longer matches the
    /// pending job are stale and skipped on dequeue.
    order: VecDeque<(PathBuf, u64)>,
    pending: HashMap<PathBuf, Pending>,
    /// Jobs handed out by `dequeue_batch` and not yet marked done.
    outstanding: usize,
    next_slot: u64,
    next_seq: u64,
    closed: bool,
}

impl State {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn push_new(&mut self, path: PathBuf, kind: EventKind, old_path: Option<PathBuf>) {
        self.next_slot += 1;
        let slot = self.next_slot;
        let seq = self.seq();
        self.order.push_back((path.clone(), slot));
        self.pending.insert(
            path.clone(),
            Pending {
                job: IndexingJob {
                    path,
                    event_kind: kind,
                    enqueue_time: Utc::now(),
                    old_path,
                    seq,
                },
                slot,
            },
        );
    }

    fn cancel(&mut self, path: &Path) -> Option<IndexingJob> {
        self.pending.remove(path).map(|p| p.job)
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.outstanding == 0
    }

    fn compact(&mut self) {
        if self.order.len() > 2 * self.pending.len() + 64 {
            let pending = &self.pending;
            self.order
                .retain(|(p, slot)| pending.get(p).is_some_and(|q| q.slot == *slot));
        }
    }
}

pub struct JobQueue {
    state: Mutex<State>,
    capacity: usize,
    available: Notify,
    space: Notify,
    idle: Notify,
    dropped: AtomicU64,
    observer: Arc<dyn IndexObserver>,
}

impl JobQueue {
    pub fn new(capacity: usize, observer: Arc<dyn IndexObserver>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.max(1),
            available: Notify::new(),
            space: Notify::new(),
            idle: Notify::new(),
            dropped: AtomicU64::new(0),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a raw event without blocking.
    ///
    /// Returns [`IndexError::QueueOverflow`] when the event was dropped
    /// because the queue is full.
    pub fn enqueue(&self, event: FsEvent) -> Result<EnqueueOutcome, IndexError> {
        let mut state = self.lock();
        if state.closed {
            return Ok(EnqueueOutcome::Closed);
        }
        if !self.has_room(&state, &event) {
            drop(state);
            return Err(self.overflow(event.path));
        }
        let outcome = self.apply(&mut state, event);
        let idle = state.is_idle();
        drop(state);
        self.available.notify_one();
        if idle {
            self.idle.notify_waiters();
        }
        Ok(outcome)
    }

    /// Like [`enqueue`](Self::enqueue), but waits for room instead of
    /// dropping. Used by bulk indexing, which must not lose files.
    pub async fn enqueue_wait(&self, event: FsEvent) -> EnqueueOutcome {
        loop {
            let space = self.space.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return EnqueueOutcome::Closed;
                }
                if self.has_room(&state, &event) {
                    let outcome = self.apply(&mut state, event);
                    let idle = state.is_idle();
                    drop(state);
                    self.available.notify_one();
                    if idle {
                        self.idle.notify_waiters();
                    }
                    return outcome;
                }
            }
            space.await;
        }
    }

    fn has_room(&self, state: &State, event: &FsEvent) -> bool {
        state.pending.contains_key(&event.path) || state.pending.len() < self.capacity
    }

    fn overflow(&self, path: PathBuf) -> IndexError {
        let dropped_total = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
        self.observer.on_event(&IndexEvent::QueueOverflow {
            path: path.clone(),
            capacity: self.capacity,
            dropped_total,
        });
        IndexError::QueueOverflow {
            path,
            capacity: self.capacity,
        }
    }

    fn apply(&self, state: &mut State, event: FsEvent) -> EnqueueOutcome {
        let FsEvent {
            kind,
            path,
            old_path,
        } = event;

        if kind == EventKind::Moved {
            let mut outcome = EnqueueOutcome::Queued;
            if let Some(old) = &old_path {
                // A pending Moved at the old path still owes a delete for
                // its own source.
                if let Some(prev) = state.cancel(old) {
                    if let Some(origin) = prev.old_path {
                        self.apply_side(state, FsEvent::deleted(origin));
                    }
                }
            }
            if let Some(prev) = state.pending.get_mut(&path) {
                if let Some(origin) = prev.job.old_path.take() {
                    if Some(&origin) != old_path.as_ref() {
                        self.apply_side(state, FsEvent::deleted(origin));
                    }
                }
                outcome = EnqueueOutcome::Coalesced;
            }
            let seq = state.seq();
            match state.pending.get_mut(&path) {
                Some(prev) => {
                    prev.job.event_kind = EventKind::Moved;
                    prev.job.old_path = old_path;
                    prev.job.seq = seq;
                }
                None => state.push_new(path, EventKind::Moved, old_path),
            }
            return outcome;
        }

        let Some(prev_kind) = state.pending.get(&path).map(|p| p.job.event_kind) else {
            state.push_new(path, kind, None);
            return EnqueueOutcome::Queued;
        };

        let (next, orphan) = match (prev_kind, kind) {
            (EventKind::Created, EventKind::Deleted) => {
                state.cancel(&path);
                return EnqueueOutcome::Cancelled;
            }
            (EventKind::Moved, EventKind::Deleted) => {
                let origin = state
                    .pending
                    .get_mut(&path)
                    .and_then(|p| p.job.old_path.take());
                (EventKind::Deleted, origin)
            }
            (_, EventKind::Deleted) => (EventKind::Deleted, None),
            (EventKind::Deleted, _) => (EventKind::Modified, None),
            (prev, _) => (prev, None),
        };

        let seq = state.seq();
        if let Some(p) = state.pending.get_mut(&path) {
            p.job.event_kind = next;
            p.job.seq = seq;
        }
        if let Some(origin) = orphan {
            self.apply_side(state, FsEvent::deleted(origin));
        }
        EnqueueOutcome::Coalesced
    }

    /// Secondary job produced while folding an event. It bypasses the
    /// capacity check: it replaces work that was already pending.
    fn apply_side(&self, state: &mut State, event: FsEvent) {
        self.apply(state, event);
    }

    /// Up to `max` jobs in first-enqueue order. Waits while the queue is
    /// empty; returns `None` once the queue is closed and drained.
    pub async fn dequeue_batch(&self, max: usize) -> Option<Vec<IndexingJob>> {
        let max = max.max(1);
        loop {
            let available = self.available.notified();
            {
                let mut state = self.lock();
                let mut batch = Vec::new();
                while batch.len() < max {
                    let Some((path, slot)) = state.order.pop_front() else {
                        break;
                    };
                    let current = state.pending.get(&path).is_some_and(|p| p.slot == slot);
                    if current {
                        if let Some(p) = state.pending.remove(&path) {
                            batch.push(p.job);
                        }
                    }
                }
                state.compact();
                state.outstanding += batch.len();
                if !batch.is_empty() {
                    drop(state);
                    self.space.notify_waiters();
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }
            available.await;
        }
    }

    /// Stop accepting events. Dequeuers drain what is left, then get `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
        self.available.notify_one();
        self.space.notify_waiters();
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop every pending job. Returns how many were discarded.
    pub fn cancel_pending(&self) -> usize {
        let mut state = self.lock();
        let n = state.pending.len();
        state.pending.clear();
        state.order.clear();
        let idle = state.is_idle();
        drop(state);
        self.space.notify_waiters();
        if idle {
            self.idle.notify_waiters();
        }
        n
    }

    /// Mark `n` dequeued jobs as fully handled.
    pub fn task_done(&self, n: usize) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(n);
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Forget dequeued jobs whose results were abandoned at shutdown.
    pub fn abandon_outstanding(&self) {
        let mut state = self.lock();
        state.outstanding = 0;
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Dequeued jobs not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// True when nothing is pending and every dequeued job is done.
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// Wait until the queue is idle.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.is_idle() {
                return;
            }
            idle.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}
