//! # DeepSearch Core
//!
//! Shared, runtime-free logic for DeepSearch: data models, the error
//! taxonomy, content fingerprints, text chunking, backend traits, and the
//! hybrid ranking algorithm.
//!
//! This crate contains no tokio, sqlx, or filesystem watching. The
//! `deepsearch` application crate wires these pieces into the indexing
//! pipeline and provides the SQLite-backed implementations.

pub mod backend;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod models;

pub use error::{IndexError, Result};
