//! Index statistics.
//!
//! `deepsearch stats` prints document and chunk counts together with the
//! on-disk size of each store, so it is quick to confirm that indexing is
//! doing what it should.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::coordinator::IndexCoordinator;
use crate::observer::format_number;

pub async fn run_stats(coordinator: &IndexCoordinator, config: &Config, json: bool) -> Result<()> {
    let stats = coordinator.get_stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let keyword_db = config.storage.keyword_db();
    let vector_db = config.storage.vector_db();

    println!("DeepSearch Index Stats");
    println!("======================");
    println!();
    println!(
        "  Keyword index: {} ({})",
        keyword_db.display(),
        format_bytes(file_size(&keyword_db))
    );
    if stats.vector_enabled {
        println!(
            "  Vector index:  {} ({})",
            vector_db.display(),
            format_bytes(file_size(&vector_db))
        );
    } else {
        println!("  Vector index:  disabled");
    }
    println!();
    println!("  Documents:   {}", format_number(stats.total_documents));
    println!("  Chunks:      {}", format_number(stats.total_chunks));
    println!("  State:       {}", stats.state);
    println!("  Queue depth: {}", stats.queue_depth);
    println!();
    Ok(())
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// One-paragraph summary of an indexing run, printed by `index` and `watch`.
pub fn print_report(report: &deepsearch_core::models::BulkIndexReport) {
    println!(
        "Indexed {} files: {} updated, {} unchanged, {} skipped, {} failed, {} removed.",
        format_number(report.discovered),
        format_number(report.processed),
        format_number(report.unchanged),
        format_number(report.skipped),
        format_number(report.failed),
        format_number(report.reconciled),
    );
}
