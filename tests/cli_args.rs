//! Integration tests for CLI argument handling
//!
//! Only offline subcommands are exercised here; nothing touches the network.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use apicache::cache::{derive_cache_path, Parameters};

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_apicache"))
        .args(args)
        .output()
        .expect("Failed to execute apicache")
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = stdout_of(&output);
    assert!(stdout.contains("apicache"), "Help should mention apicache");
    assert!(stdout.contains("inspect"), "Help should mention inspect");
    assert!(stdout.contains("get"), "Help should mention get");
}

#[test]
fn test_key_is_independent_of_parameter_order() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let a = run_cli(&["--cache-dir", dir, "key", "char/Sheet.xml", "-p", "id=5", "-p", "key=abc"]);
    let b = run_cli(&["--cache-dir", dir, "key", "char/Sheet.xml", "-p", "key=abc", "-p", "id=5"]);

    assert!(a.status.success(), "stderr: {}", String::from_utf8_lossy(&a.stderr));
    assert!(b.status.success());
    assert_eq!(stdout_of(&a), stdout_of(&b));

    let line = stdout_of(&a);
    let name = line.trim().rsplit(['/', '\\']).next().unwrap_or_default().to_string();
    assert!(name.starts_with("char.Sheet."), "Unexpected file name {}", name);
    assert!(name.ends_with(".xml"));
    assert_eq!(name.len(), "char.Sheet.".len() + 32 + ".xml".len());
}

#[test]
fn test_key_differs_by_parameter_value() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let a = run_cli(&["--cache-dir", dir, "key", "char/Sheet.xml", "-p", "id=5"]);
    let b = run_cli(&["--cache-dir", dir, "key", "char/Sheet.xml", "-p", "id=6"]);

    assert_ne!(stdout_of(&a), stdout_of(&b));
}

#[test]
fn test_invalid_parameter_prints_error_and_exits() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let output = run_cli(&["--cache-dir", dir, "key", "a.xml", "-p", "novalue"]);
    assert!(!output.status.success(), "Expected invalid parameter to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid parameter"),
        "Should print error message about the parameter: {}",
        stderr
    );
}

#[test]
fn test_inspect_reports_missing_then_fresh() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let output = run_cli(&["--cache-dir", dir, "inspect", "a/b.xml", "--ttl", "3600"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("state: missing"));

    let key = run_cli(&["--cache-dir", dir, "key", "a/b.xml"]);
    fs::write(stdout_of(&key).trim(), "<b/>").expect("Should write cache file");

    let output = run_cli(&["--cache-dir", dir, "inspect", "a/b.xml", "--ttl", "3600"]);
    assert!(stdout_of(&output).contains("state: fresh"));

    let output = run_cli(&["--cache-dir", dir, "inspect", "a/b.xml", "--ttl", "0"]);
    assert!(stdout_of(&output).contains("state: stale"));
}

#[test]
fn test_invalid_method_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let output = run_cli(&[
        "--cache-dir",
        dir,
        "get",
        "--base-url",
        "http://127.0.0.1:9/",
        "--method",
        "put",
        "a.xml",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid method"));
}

#[test]
fn test_key_matches_library_derivation_with_suffix_stripped() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("UTF-8 temp path");

    let output = run_cli(&["--cache-dir", dir, "key", "/char/Sheet.xml.aspx", "-p", "id=5"]);
    assert!(output.status.success());

    let expected = derive_cache_path(
        temp_dir.path(),
        "/char/Sheet.xml.aspx",
        &Parameters::from([("id", "5")]),
        &[".aspx".to_string()],
    )
    .expect("Derivation should succeed");
    assert_eq!(stdout_of(&output).trim(), expected.to_str().unwrap());
}
