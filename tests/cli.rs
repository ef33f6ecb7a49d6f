use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hba_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hba");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("chunks.json"),
        r#"[
  {"url": "https://handbook.example/merge-requests", "title": "Merge Requests",
   "content": "Merge requests are approved by a reviewer after the checks pass.",
   "headings": [{"level": "h2", "text": "Approval"}], "word_count": 11, "chunk_id": 0},
  {"url": "https://handbook.example/travel", "title": "Travel",
   "content": "Book flights through the travel portal and file expenses within a month.",
   "headings": [], "word_count": 12, "chunk_id": 0},
  {"url": "https://handbook.example/security", "title": "Security",
   "content": "Rotate credentials every quarter and report incidents immediately.",
   "headings": [], "word_count": 8, "chunk_id": 0}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/hba.sqlite"

[corpus]
path = "{root}/data/chunks.json"

[retrieval]
top_k = 3

[chat]
min_request_interval_ms = 0
retry_backoff_ms = 0
"#,
        root = root.display()
    );

    let config_path = config_dir.join("hba.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_hba(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hba_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hba binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hba(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/hba.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_hba(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_hba(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_hba(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ask_template_answer() {
    let (_tmp, config_path) = setup_test_env();
    run_hba(&config_path, &["init"]);

    let (stdout, stderr, success) = run_hba(&config_path, &["ask", "What is GitLab?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("GitLab is a complete DevOps platform"));
    assert!(!stdout.contains("Tokens:"));
}

#[test]
fn test_ask_without_generator_apologizes() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_hba(&config_path, &["ask", "How do merge requests get approved?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("I apologize"));
}

#[test]
fn test_ask_rejects_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_hba(&config_path, &["ask", "   "]);
    assert!(success);
    assert!(stdout.contains("Please provide a valid question."));
}

#[test]
fn test_search_keyword_channel() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hba(&config_path, &["search", "merge requests"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("Merge Requests"));
    assert!(stdout.contains("url: https://handbook.example/merge-requests"));
    assert!(!stdout.contains("Travel"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_hba(&config_path, &["search", "zebra migration"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_semantic_only_without_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) =
        run_hba(&config_path, &["search", "merge requests", "--semantic-only"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_cache_stats_and_clear() {
    let (_tmp, config_path) = setup_test_env();
    run_hba(&config_path, &["ask", "What is GitLab?"]);

    let (stdout, stderr, success) = run_hba(&config_path, &["cache", "stats"]);
    assert!(success, "cache stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Exact tier:      1 / 500 entries"));
    assert!(stdout.contains("Fuzzy tier:      1 / 1000 entries"));
    assert!(stdout.contains("Stored rows:"));
    assert!(stdout.contains("cache_exact"));

    let (stdout, _, success) = run_hba(&config_path, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cache cleared (1 exact, 1 fuzzy entries removed)."));

    let (stdout, _, _) = run_hba(&config_path, &["cache", "stats"]);
    assert!(stdout.contains("Exact tier:      0 / 500 entries"));
}

#[test]
fn test_second_ask_is_cache_hit() {
    let (_tmp, config_path) = setup_test_env();
    run_hba(&config_path, &["ask", "What is GitLab?"]);
    run_hba(&config_path, &["ask", "what is   GITLAB?"]);

    let (stdout, stderr, success) = run_hba(&config_path, &["metrics"]);
    assert!(success, "metrics failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Queries:         2"));
    assert!(stdout.contains("(1 hits, 1 misses)"));
    assert!(stdout.contains("GitLab"));
}

#[test]
fn test_metrics_empty() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_hba(&config_path, &["metrics"]);
    assert!(success);
    assert!(stdout.contains("Status:          no_data"));
    assert!(stdout.contains("Queries:         0"));
}
