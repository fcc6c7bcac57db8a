//! # DeepSearch
//!
//! Local file indexing with keyword and semantic search, kept live as files
//! change.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐
//! │ watcher  │──▶│ JobQueue │──▶│ Extraction │──▶│ sequencer │──▶ keyword (FTS5)
//! │ / scan   │   │ coalesce │   │ pool (N)   │   │           │──▶ vector (chunks)
//! └──────────┘   └──────────┘   └────────────┘   └───────────┘
//!                                                       │
//!                         search ─▶ coordinator ─▶ HybridMerger
//! ```
//!
//! Runtime-free logic (data model, fingerprints, chunking, hybrid merge,
//! backend traits) lives in `deepsearch-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`queue`] | Bounded, coalescing job queue |
//! | [`pool`] | Extraction worker pool |
//! | [`coordinator`] | Lifecycle, sequenced index updates, search |
//! | [`extract`] | Text extraction and MIME detection |
//! | [`filter`] | Extension, directory, glob and size filters |
//! | [`keyword_store`] | SQLite FTS5 keyword backend |
//! | [`vector_store`] | SQLite chunk/embedding backend |
//! | [`embedding`] | Embedding providers |
//! | [`watcher`] | Filesystem watcher |
//! | [`observer`] | Pipeline event reporting |

pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod filter;
pub mod keyword_store;
pub mod migrate;
pub mod observer;
pub mod open;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod scan;
pub mod search;
pub mod stats;
pub mod vector_store;
pub mod watcher;
