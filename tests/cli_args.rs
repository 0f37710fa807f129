//! Integration tests for the repocache binary
//!
//! Runs the built binary against temporary cache directories.

use std::process::Command;

use repocache::{CacheKey, Driver, Entity, FileDriver, Keyspace};
use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_repocache"))
        .args(args)
        .output()
        .expect("Failed to execute repocache")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("repocache"), "Help should mention repocache");
    assert!(stdout.contains("show"), "Help should mention the show command");
    assert!(stdout.contains("clear"), "Help should mention the clear command");
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_show_missing_entry_prints_error_and_exits() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_string_lossy().into_owned();

    let output = run_cli(&["--dir", &dir, "show", "weather", r#"["kitsilano"]"#]);

    assert!(!output.status.success(), "Expected a miss to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("No cached entry"),
        "Should explain the miss: {}",
        stderr
    );
}

#[test]
fn test_show_invalid_json_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_string_lossy().into_owned();

    let output = run_cli(&["--dir", &dir, "show", "weather", "[unterminated"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid arguments JSON"), "{}", stderr);
}

#[test]
fn test_clear_on_empty_directory_succeeds() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_string_lossy().into_owned();

    let output = run_cli(&["--dir", &dir, "clear", "weather"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cleared keyspace weather"));
}

#[tokio::test]
async fn test_show_then_delete_stored_entry() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_string_lossy().into_owned();
    let driver = FileDriver::with_dir(temp_dir.path());
    let key = CacheKey::new(&Keyspace::new("tides"), &("point_atkinson", 7735)).unwrap();
    driver
        .set(&key, Entity::new(serde_json::json!({"height": 4.1})))
        .await
        .unwrap();

    let output = run_cli(&["--dir", &dir, "show", "tides", r#"["point_atkinson", 7735]"#]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"height\": 4.1"), "{}", stdout);

    let output = run_cli(&["--dir", &dir, "delete", "tides", r#"["point_atkinson",7735]"#]);
    assert!(output.status.success());
    assert!(!driver.get(&key).await.unwrap().is_hit());
}
