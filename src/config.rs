//! Configuration loading and validation.
//!
//! DeepSearch reads a single TOML file. Every section and key is optional;
//! missing values take the defaults below. Paths may use `~` and `$VAR`,
//! which are expanded at load time.
//!
//! ```toml
//! [indexing]
//! monitored_paths = ["~/Documents"]
//! max_workers = 4
//!
//! [storage]
//! index_dir = "~/.deepsearch_index"
//!
//! [retrieval]
//! keyword_weight = 0.5
//! semantic_weight = 0.5
//!
//! [embedding]
//! provider = "local"
//! model = "BAAI/bge-small-en-v1.5"
//! dims = 384
//! ```

use anyhow::{Context, Result};
use deepsearch_core::IndexError;
use globset::Glob;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default)]
    pub monitored_paths: Vec<PathBuf>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: BTreeSet<String>,
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: BTreeSet<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            monitored_paths: Vec::new(),
            max_file_size: default_max_file_size(),
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            excluded_extensions: default_excluded_extensions(),
            excluded_dirs: default_excluded_dirs(),
            exclude_globs: Vec::new(),
            extraction_timeout_secs: default_extraction_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            follow_symlinks: false,
        }
    }
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}
fn default_max_workers() -> usize {
    4
}
fn default_batch_size() -> usize {
    100
}
fn default_queue_capacity() -> usize {
    10_000
}
fn default_extraction_timeout() -> u64 {
    60
}
fn default_shutdown_grace() -> u64 {
    10
}

fn default_excluded_extensions() -> BTreeSet<String> {
    [
        ".tmp", ".log", ".cache", ".DS_Store", ".pyc", ".pyo", ".so", ".dylib", ".app",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_dirs() -> BTreeSet<String> {
    [
        ".git",
        "__pycache__",
        "node_modules",
        ".venv",
        ".virtualenv",
        ".tox",
        ".pytest_cache",
        ".mypy_cache",
        "Library",
        "System",
        ".Trash",
        ".npm",
        ".cache",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the keyword index database.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    /// Directory holding the vector database.
    #[serde(default = "default_vector_db_path")]
    pub vector_db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            vector_db_path: default_vector_db_path(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("~/.deepsearch_index")
}
fn default_vector_db_path() -> PathBuf {
    PathBuf::from("~/.deepsearch_vectors")
}

impl StorageConfig {
    pub fn keyword_db(&self) -> PathBuf {
        self.index_dir.join("keyword.db")
    }

    pub fn vector_db(&self) -> PathBuf {
        self.vector_db_path.join("vectors.db")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Candidates fetched per backend = `limit × candidate_multiplier`.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_weight(),
            semantic_weight: default_weight(),
            similarity_threshold: default_similarity_threshold(),
            candidate_multiplier: default_candidate_multiplier(),
            default_limit: default_limit(),
        }
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Retry policy for backend writes.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    100
}
fn default_retry_max_ms() -> u64 {
    2_000
}

fn invalid(msg: impl Into<String>) -> IndexError {
    IndexError::Configuration(msg.into())
}

impl Config {
    /// Reject out-of-range values. Every error names the offending key.
    pub fn validate(&self) -> Result<(), IndexError> {
        let ix = &self.indexing;
        if ix.max_workers < 1 {
            return Err(invalid("indexing.max_workers must be >= 1"));
        }
        if ix.batch_size < 1 {
            return Err(invalid("indexing.batch_size must be >= 1"));
        }
        if ix.queue_capacity < 1 {
            return Err(invalid("indexing.queue_capacity must be >= 1"));
        }
        if ix.extraction_timeout_secs == 0 {
            return Err(invalid("indexing.extraction_timeout_secs must be > 0"));
        }
        for pattern in &ix.exclude_globs {
            Glob::new(pattern).map_err(|e| {
                invalid(format!(
                    "indexing.exclude_globs: invalid pattern '{}': {}",
                    pattern, e
                ))
            })?;
        }

        if self.chunking.max_tokens == 0 {
            return Err(invalid("chunking.max_tokens must be > 0"));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(invalid(
                "chunking.overlap_tokens must be smaller than chunking.max_tokens",
            ));
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.keyword_weight) {
            return Err(invalid("retrieval.keyword_weight must be in [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&r.semantic_weight) {
            return Err(invalid("retrieval.semantic_weight must be in [0.0, 1.0]"));
        }
        if (r.keyword_weight + r.semantic_weight - 1.0).abs() > 1e-6 {
            return Err(invalid(format!(
                "retrieval.keyword_weight + retrieval.semantic_weight must equal 1.0 (got {})",
                r.keyword_weight + r.semantic_weight
            )));
        }
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            return Err(invalid(
                "retrieval.similarity_threshold must be in [0.0, 1.0]",
            ));
        }
        if r.candidate_multiplier < 1 {
            return Err(invalid("retrieval.candidate_multiplier must be >= 1"));
        }
        if r.default_limit < 1 {
            return Err(invalid("retrieval.default_limit must be >= 1"));
        }

        let e = &self.embedding;
        match e.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => {
                return Err(invalid(format!(
                    "embedding.provider: unknown provider '{}'. Must be disabled, openai, ollama, or local.",
                    other
                )))
            }
        }
        if e.is_enabled() {
            if e.dims.is_none() || e.dims == Some(0) {
                return Err(invalid(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    e.provider
                )));
            }
            if e.model.is_none() {
                return Err(invalid(format!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                )));
            }
            if e.batch_size == 0 {
                return Err(invalid("embedding.batch_size must be > 0"));
            }
        }

        if self.backend.retry_attempts < 1 {
            return Err(invalid("backend.retry_attempts must be >= 1"));
        }

        Ok(())
    }

    /// Expand `~` and `$VAR` in every configured path.
    fn expand_paths(&mut self) {
        self.indexing.monitored_paths = self
            .indexing
            .monitored_paths
            .iter()
            .map(|p| expand_path(p))
            .collect();
        self.storage.index_dir = expand_path(&self.storage.index_dir);
        self.storage.vector_db_path = expand_path(&self.storage.vector_db_path);
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.expand_paths();
    config.validate()?;
    Ok(config)
}

/// Expand a leading `~` and any `$VAR` / `${VAR}` references, then make
/// the result absolute.
///
/// Unset variables are left as written.
pub fn expand_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let expanded = expand_vars(&s);
    if expanded == "~" || expanded.starts_with("~/") {
        if let Some(home) = home_dir() {
            return absolute_path(&home.join(expanded.strip_prefix("~/").unwrap_or("")));
        }
    }
    absolute_path(Path::new(&expanded))
}

/// Resolve `path` against the working directory and drop `.` and `..`
/// components lexically. Symlinks are not resolved.
///
/// Index keys are path strings, so every path entering the index goes
/// through here; `./docs/a.txt` and `/home/u/docs/a.txt` must not become
/// two entries.
pub fn absolute_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => return path.to_path_buf(),
        }
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn expand_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
