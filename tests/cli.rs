//! Integration tests for the `fnx` binary.
//!
//! Each test indexes its own temp directory into its own catalog file, so
//! nothing touches the user's app data directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    catalog: PathBuf,
}

/// A small tree indexed into a catalog next to it
fn indexed_fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("notes.txt"), b"notes").unwrap();
    fs::write(root.join("report2.pdf"), vec![0u8; 2048]).unwrap();
    fs::write(root.join("report10.pdf"), vec![0u8; 4096]).unwrap();
    fs::write(root.join("docs").join("readme.md"), b"# readme").unwrap();
    let catalog = dir.path().join("catalog.json");

    let (stdout, stderr, ok) = run_fnx(&["index", root.to_str().unwrap()], &catalog);
    assert!(ok, "index failed: {stderr}");
    assert!(stdout.contains("Indexed 4 files"), "unexpected output: {stdout}");
    assert!(catalog.exists());

    Fixture {
        root: root.canonicalize().unwrap(),
        _dir: dir,
        catalog,
    }
}

fn run_fnx(args: &[&str], catalog: &Path) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_fnx"))
        .args(args)
        .arg("--catalog")
        .arg(catalog)
        .env("FNX_LOG", "off")
        .output()
        .expect("Failed to run fnx");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn file_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| Path::new(line).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .collect()
}

#[test]
fn test_search_prints_full_paths_in_natural_order() {
    let fixture = indexed_fixture();
    let (stdout, stderr, ok) = run_fnx(&["search", "report", "ext:pdf"], &fixture.catalog);
    assert!(ok, "search failed: {stderr}");
    assert_eq!(file_names(&stdout), vec!["report2.pdf", "report10.pdf"]);
    assert!(stdout.lines().all(|line| line.starts_with(fixture.root.to_str().unwrap())));
    assert!(stderr.contains("2 of 2 matches"));
}

#[test]
fn test_search_sort_and_viewport() {
    let fixture = indexed_fixture();
    let (stdout, _, ok) = run_fnx(&["search", "*.pdf", "--sort", "size", "--desc"], &fixture.catalog);
    assert!(ok);
    assert_eq!(file_names(&stdout), vec!["report10.pdf", "report2.pdf"]);

    let (stdout, stderr, ok) = run_fnx(&["search", "*.pdf", "--offset", "1", "-n", "1"], &fixture.catalog);
    assert!(ok);
    assert_eq!(file_names(&stdout), vec!["report10.pdf"]);
    assert!(stderr.contains("1 of 2 matches"));
}

#[test]
fn test_count_command() {
    let fixture = indexed_fixture();
    let (stdout, _, ok) = run_fnx(&["count", "files:"], &fixture.catalog);
    assert!(ok);
    assert_eq!(stdout.trim(), "4");

    let (stdout, _, ok) = run_fnx(&["count", "folder:", "docs"], &fixture.catalog);
    assert!(ok);
    assert_eq!(stdout.trim(), "1");
}

#[test]
fn test_syntax_error_exits_with_failure() {
    let fixture = indexed_fixture();
    let (_, stderr, ok) = run_fnx(&["search", "(notes"], &fixture.catalog);
    assert!(!ok);
    assert!(stderr.contains("syntax error"), "unexpected stderr: {stderr}");
}

#[test]
fn test_stats_json() {
    let fixture = indexed_fixture();
    let (stdout, _, ok) = run_fnx(&["stats", "--json"], &fixture.catalog);
    assert!(ok);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["files"], 4);
    // data/ and docs/
    assert_eq!(stats["folders"], 2);
}

#[test]
fn test_missing_catalog_is_reported() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, ok) = run_fnx(&["count", "*"], &dir.path().join("missing.json"));
    assert!(!ok);
    assert!(stderr.contains("No catalog found"));
}
