//! Build a coordinator backed by the on-disk stores named in the config.

use std::sync::Arc;

use anyhow::{Context, Result};

use deepsearch_core::backend::memory::InMemoryVectorIndex;
use deepsearch_core::backend::VectorBackend;

use crate::config::Config;
use crate::coordinator::{Backends, IndexCoordinator};
use crate::embedding::create_embedder;
use crate::extract::DefaultExtractor;
use crate::keyword_store::SqliteKeywordIndex;
use crate::observer::IndexObserver;
use crate::vector_store::SqliteVectorIndex;

/// Create the storage directories and both databases. Idempotent.
pub async fn init_storage(config: &Config) -> Result<()> {
    let keyword = open_keyword(config).await?;
    keyword.close().await;
    let vector = open_vector(config).await?;
    vector.close().await;
    Ok(())
}

async fn open_keyword(config: &Config) -> Result<SqliteKeywordIndex> {
    std::fs::create_dir_all(&config.storage.index_dir).with_context(|| {
        format!(
            "Failed to create index directory {}",
            config.storage.index_dir.display()
        )
    })?;
    SqliteKeywordIndex::open(&config.storage.keyword_db()).await
}

async fn open_vector(config: &Config) -> Result<SqliteVectorIndex> {
    std::fs::create_dir_all(&config.storage.vector_db_path).with_context(|| {
        format!(
            "Failed to create vector directory {}",
            config.storage.vector_db_path.display()
        )
    })?;
    SqliteVectorIndex::open(&config.storage.vector_db()).await
}

/// Open the SQLite stores and the configured embedder.
///
/// With the `disabled` embedding provider the vector database is not
/// touched and an empty in-memory index stands in for it.
pub async fn open_coordinator(
    config: &Config,
    observer: Arc<dyn IndexObserver>,
) -> Result<IndexCoordinator> {
    let keyword = Arc::new(open_keyword(config).await?);
    let embedder = create_embedder(&config.embedding)?;
    let vector: Arc<dyn VectorBackend> = if embedder.is_some() {
        Arc::new(open_vector(config).await?)
    } else {
        Arc::new(InMemoryVectorIndex::new())
    };

    let backends = Backends {
        keyword: keyword.clone(),
        vector,
        fingerprints: keyword,
        embedder,
        extractor: Arc::new(DefaultExtractor),
    };
    Ok(IndexCoordinator::new(config.clone(), backends, observer)?)
}
