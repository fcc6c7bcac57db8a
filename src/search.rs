//! `deepsearch search` and `deepsearch filename` output.

use anyhow::Result;

use deepsearch_core::models::{SearchKind, SearchResult};

use crate::coordinator::IndexCoordinator;

/// Output format for result listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn run_search(
    coordinator: &IndexCoordinator,
    query: &str,
    kind: SearchKind,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    if kind != SearchKind::Keyword && !coordinator.vector_enabled() {
        tracing::warn!(
            mode = ?kind,
            "no embedding provider configured; semantic results unavailable"
        );
    }
    let results = coordinator.search(query, kind, limit).await?;
    print_results(&results, format)
}

pub async fn run_filename_search(
    coordinator: &IndexCoordinator,
    pattern: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let results = coordinator.search_by_filename(pattern, limit).await?;
    print_results(&results, format)
}

fn print_results(results: &[SearchResult], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.combined_score,
            result.filename,
            result.search_type
        );
        println!("    path: {}", result.path);
        if let Some(score) = result.keyword_score {
            println!("    keyword: {:.3}", score);
        }
        if let Some(score) = result.semantic_score {
            println!("    semantic: {:.3}", score);
        }
        if let Some(snippet) = &result.snippet {
            println!("    excerpt: \"{}\"", snippet.replace('\n', " ").trim());
        }
        println!();
    }
    Ok(())
}
