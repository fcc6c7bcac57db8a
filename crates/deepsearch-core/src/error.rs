//! Error taxonomy for the indexing pipeline.
//!
//! Backends and extractors return `anyhow` errors internally; the
//! coordinator classifies them into [`IndexError`] at its public surface so
//! callers can tell a bad query from an unavailable backend.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::CoordinatorState;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The extractor could not produce text for a file.
    #[error("extraction failed for {path}: {reason}")]
    ExtractionFailure { path: PathBuf, reason: String },

    /// A keyword or vector backend rejected a read or write.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// A lifecycle operation was called in a state that does not allow it.
    #[error("cannot {operation} while coordinator is {state}")]
    InvalidState {
        operation: &'static str,
        state: CoordinatorState,
    },

    /// The job queue was full and an event was dropped.
    #[error("job queue full ({capacity}); dropped event for {path}")]
    QueueOverflow { path: PathBuf, capacity: usize },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A search request could not be served.
    #[error("query error: {0}")]
    Query(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn keyword_backend(err: impl std::fmt::Display) -> Self {
        IndexError::BackendUnavailable {
            backend: "keyword",
            reason: err.to_string(),
        }
    }

    pub fn vector_backend(err: impl std::fmt::Display) -> Self {
        IndexError::BackendUnavailable {
            backend: "vector",
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
