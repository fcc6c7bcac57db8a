//! # DeepSearch CLI (`deepsearch`)
//!
//! Indexes local files for keyword and semantic search and keeps the index
//! live while files change.
//!
//! ## Usage
//!
//! ```bash
//! deepsearch --config ./config/deepsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deepsearch init` | Create the index databases |
//! | `deepsearch index [PATHS]` | Index the given paths (default: monitored paths) |
//! | `deepsearch watch` | Index, then follow filesystem changes until Ctrl-C |
//! | `deepsearch search "<query>"` | Keyword, semantic or hybrid search |
//! | `deepsearch filename <pattern>` | Match file names |
//! | `deepsearch stats` | Document and chunk counts |
//!
//! Logs go to stderr and honour `RUST_LOG`. Per-file progress is controlled
//! with `--progress human|json|off`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use deepsearch::config;
use deepsearch::observer::ProgressMode;
use deepsearch::open::{init_storage, open_coordinator};
use deepsearch::search::{run_filename_search, run_search, OutputFormat};
use deepsearch::stats::{print_report, run_stats};
use deepsearch::watcher::FsWatcher;
use deepsearch_core::models::{FsEvent, SearchKind};

/// DeepSearch: local file indexing with hybrid keyword and semantic search.
#[derive(Parser)]
#[command(
    name = "deepsearch",
    about = "DeepSearch: local file indexing with hybrid keyword and semantic search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/deepsearch.toml")]
    config: PathBuf,

    /// Per-file progress on stderr: `human`, `json`, or `off`.
    /// Defaults to `human` when stderr is a terminal, otherwise `off`.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the keyword and vector databases. Idempotent.
    Init,

    /// Index files once and exit.
    ///
    /// Walks each path, skips files whose content is unchanged since the
    /// last run, and removes index entries for files that no longer exist.
    Index {
        /// Paths to index. Defaults to `[indexing].monitored_paths`.
        paths: Vec<PathBuf>,
    },

    /// Keep the index in sync with the monitored paths until interrupted.
    Watch {
        /// Skip the initial scan of the monitored paths.
        #[arg(long)]
        no_bulk: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// Search mode: `keyword`, `semantic`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results. Defaults to `[retrieval].default_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Find files by name (case-insensitive substring).
    Filename {
        pattern: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn format_for(json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let progress = match cli.progress.as_deref() {
        Some(mode) => ProgressMode::parse(mode)?,
        None => ProgressMode::default_for_tty(),
    };
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            init_storage(&cfg).await?;
            println!("Index initialized successfully.");
        }
        Commands::Index { paths } => {
            let paths = if paths.is_empty() {
                cfg.indexing.monitored_paths.clone()
            } else {
                paths.iter().map(|p| config::expand_path(p)).collect()
            };
            if paths.is_empty() {
                anyhow::bail!(
                    "Nothing to index: pass paths or set [indexing].monitored_paths in {}",
                    cli.config.display()
                );
            }
            let coordinator = open_coordinator(&cfg, progress.observer()).await?;
            coordinator.start().await?;
            let report = coordinator.bulk_index(&paths).await;
            coordinator.stop().await?;
            print_report(&report?);
        }
        Commands::Watch { no_bulk } => {
            if cfg.indexing.monitored_paths.is_empty() {
                anyhow::bail!(
                    "No [indexing].monitored_paths configured in {}",
                    cli.config.display()
                );
            }
            let coordinator = Arc::new(open_coordinator(&cfg, progress.observer()).await?);
            if no_bulk {
                coordinator.start().await?;
            } else {
                let report = coordinator.start_with_scan().await?;
                tracing::info!(
                    enqueued = report.enqueued,
                    unchanged = report.unchanged,
                    reconciled = report.reconciled,
                    "initial scan queued"
                );
            }

            let sink = {
                let coordinator = Arc::clone(&coordinator);
                move |event: FsEvent| {
                    if let Err(e) = coordinator.submit_event(event) {
                        tracing::debug!(error = %e, "event not queued");
                    }
                }
            };
            let watcher = FsWatcher::start(
                &cfg.indexing.monitored_paths,
                Arc::new(deepsearch::filter::FileFilter::from_config(&cfg.indexing)?),
                sink,
            )?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupt received, shutting down");
            drop(watcher);
            coordinator.stop().await?;
        }
        Commands::Search {
            query,
            mode,
            limit,
            json,
        } => {
            let kind: SearchKind = mode.parse().map_err(anyhow::Error::msg)?;
            let coordinator = open_coordinator(&cfg, progress.observer()).await?;
            let limit = limit.unwrap_or(cfg.retrieval.default_limit);
            run_search(&coordinator, &query, kind, limit, format_for(json)).await?;
        }
        Commands::Filename {
            pattern,
            limit,
            json,
        } => {
            let coordinator = open_coordinator(&cfg, progress.observer()).await?;
            let limit = limit.unwrap_or(cfg.retrieval.default_limit);
            run_filename_search(&coordinator, &pattern, limit, format_for(json)).await?;
        }
        Commands::Stats { json } => {
            let coordinator = open_coordinator(&cfg, progress.observer()).await?;
            run_stats(&coordinator, &cfg, json).await?;
        }
    }

    Ok(())
}
