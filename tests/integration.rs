//! End-to-end tests for the `deepsearch` binary.
//!
//! Each test writes a config into a temp dir that points storage and the
//! monitored path at that dir, then drives the CLI as a user would.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn deepsearch_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("deepsearch");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::create_dir_all(files_dir.join(".git")).unwrap();

    let config_content = format!(
        r#"[indexing]
monitored_paths = ["{root}/files"]
max_workers = 2

[storage]
index_dir = "{root}/data"
vector_db_path = "{root}/data/vectors"

[chunking]
max_tokens = 64
overlap_tokens = 8

[retrieval]
default_limit = 5
"#,
        root = root.display()
    );
    fs::write(root.join("config").join("deepsearch.toml"), config_content).unwrap();

    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is about Rust programming and systems design.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta document covering deployment pipelines and release notes.",
    )
    .unwrap();
    fs::write(
        files_dir.join("nested").join("gamma.md"),
        "# Gamma\n\nNested notes about Rust borrow checking.",
    )
    .unwrap();
    fs::write(files_dir.join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
    fs::write(files_dir.join("scratch.tmp"), "temporary scratch data").unwrap();

    (tmp, root.join("config").join("deepsearch.toml"))
}

fn run_deepsearch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(deepsearch_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run deepsearch: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_init_creates_databases() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_deepsearch(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Index initialized successfully"));
    assert!(tmp.path().join("data").join("keyword.db").exists());
    assert!(tmp.path().join("data").join("vectors").join("vectors.db").exists());

    // Running init again is harmless.
    let (_, stderr, success) = run_deepsearch(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_deepsearch(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "got: {}", stderr);
}

#[test]
fn test_index_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_deepsearch(&config_path, &["index"]);
    assert!(success, "index failed: {}", stderr);
    // scratch.tmp is discovered but rejected; .git is never walked.
    assert!(
        stdout.contains("Indexed 4 files: 3 updated, 0 unchanged, 1 skipped, 0 failed, 0 removed."),
        "unexpected report: {}",
        stdout
    );
}

#[test]
fn test_reindex_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, _, success) = run_deepsearch(&config_path, &["index"]);
    assert!(success);
    assert!(
        stdout.contains("0 updated, 3 unchanged"),
        "second run should skip unchanged files: {}",
        stdout
    );

    let (stats, _, _) = run_deepsearch(&config_path, &["stats", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(parsed["total_documents"], 3);
}

#[test]
fn test_reindex_picks_up_changes_and_removals() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let dir = files_dir(&config_path);
    fs::write(dir.join("alpha.md"), "# Alpha\n\nNow about gardening.").unwrap();
    fs::remove_file(dir.join("beta.txt")).unwrap();

    let (stdout, _, success) = run_deepsearch(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("1 updated"), "got: {}", stdout);
    assert!(stdout.contains("1 removed"), "got: {}", stdout);

    let (out, _, _) = run_deepsearch(&config_path, &["search", "gardening"]);
    assert!(out.contains("alpha.md"), "modified content not indexed: {}", out);
    let (out, _, _) = run_deepsearch(&config_path, &["search", "systems design"]);
    assert!(out.contains("No results."), "stale content still indexed: {}", out);
    let (out, _, _) = run_deepsearch(&config_path, &["filename", "beta"]);
    assert!(out.contains("No results."), "deleted file still indexed: {}", out);
}

#[test]
fn test_index_explicit_path() {
    let (_tmp, config_path) = setup_test_env();
    let nested = files_dir(&config_path).join("nested");
    let (stdout, stderr, success) =
        run_deepsearch(&config_path, &["index", nested.to_str().unwrap()]);
    assert!(success, "index failed: {}", stderr);
    assert!(stdout.contains("Indexed 1 files: 1 updated"), "got: {}", stdout);

    let (out, _, _) = run_deepsearch(&config_path, &["filename", "alpha"]);
    assert!(out.contains("No results."));
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, _, success) =
        run_deepsearch(&config_path, &["search", "Rust programming", "--mode", "keyword"]);
    assert!(success, "search failed");
    assert!(stdout.contains("alpha.md"), "expected alpha.md, got: {}", stdout);
    assert!(stdout.contains("(keyword)"));
    assert!(!stdout.contains("beta.txt"));
}

#[test]
fn test_hybrid_search_without_embeddings_uses_keywords() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, stderr, success) = run_deepsearch(&config_path, &["search", "Rust"]);
    assert!(success, "hybrid search failed: {}", stderr);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("gamma.md"));
}

#[test]
fn test_semantic_search_without_embeddings_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["init"]);

    let (_, stderr, success) =
        run_deepsearch(&config_path, &["search", "Rust", "--mode", "semantic"]);
    assert!(!success);
    assert!(stderr.contains("vector backend unavailable"), "got: {}", stderr);
}

#[test]
fn test_search_json_output() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, _, success) = run_deepsearch(
        &config_path,
        &["search", "deployment", "--mode", "keyword", "--json"],
    );
    assert!(success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let arr = results.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["filename"], "beta.txt");
    assert!(arr[0]["combined_score"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["init"]);
    let (stdout, _, success) = run_deepsearch(&config_path, &["search", ""]);
    assert!(success, "Empty query should not fail");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);
    let (stdout, _, success) = run_deepsearch(&config_path, &["search", "xyznonexistent"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_invalid_mode() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_deepsearch(&config_path, &["search", "x", "--mode", "fuzzy"]);
    assert!(!success);
    assert!(stderr.contains("fuzzy"), "got: {}", stderr);
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);
    let (first, _, _) = run_deepsearch(&config_path, &["search", "document"]);
    let (second, _, _) = run_deepsearch(&config_path, &["search", "document"]);
    assert_eq!(first, second);
}

#[test]
fn test_filename_search() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, _, success) = run_deepsearch(&config_path, &["filename", "GAMMA"]);
    assert!(success);
    assert!(stdout.contains("gamma.md"));
    assert!(stdout.contains("(filename)"));

    let (stdout, _, _) = run_deepsearch(&config_path, &["filename", ".md"]);
    assert!(stdout.contains("alpha.md") && stdout.contains("gamma.md"));
    assert!(!stdout.contains("beta.txt"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_deepsearch(&config_path, &["index"]);

    let (stdout, _, success) = run_deepsearch(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("DeepSearch Index Stats"));
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Vector index:  disabled"));
    assert!(stdout.contains("State:       stopped"));
}

#[test]
fn test_index_without_paths_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("deepsearch.toml");
    fs::write(
        &config_path,
        format!("[storage]\nindex_dir = \"{}/data\"\n", tmp.path().display()),
    )
    .unwrap();
    let (_, stderr, success) = run_deepsearch(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("Nothing to index"), "got: {}", stderr);
}
