//! End-to-end workflow: curate (against an empty knowledge store) then
//! status, exercised through the `poetiq-synth` binary directly so the
//! test covers argument parsing, config loading, and JSON output together.
//!
//! These subcommands never touch the inference backend, so the test runs
//! without a live network dependency.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("poetiq-synth.toml");
    let data_dir = dir.path().join("data");
    let workspace_root = dir.path().join("sandbox");
    std::fs::write(
        &config_path,
        format!("data_dir = \"{}\"\nworkspace_root = \"{}\"\n", data_dir.display(), workspace_root.display()),
    )
    .unwrap();
    config_path
}

#[test]
fn status_before_any_checkpoint_fails_with_a_clear_message() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    Command::cargo_bin("poetiq-synth")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no checkpoint"));
}

#[test]
fn curate_on_an_empty_store_reports_zero_promotions_and_writes_nothing_destructive() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    Command::cargo_bin("poetiq-synth")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "--format", "json", "curate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"promotions\""));
}

#[test]
fn curate_output_is_valid_json_with_zero_lifetime_runs_on_first_invocation() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    let output = Command::cargo_bin("poetiq-synth")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "--format", "json", "curate"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["duplicate_candidates_found"], 0);
    assert_eq!(parsed["promotions"].as_array().unwrap().len(), 0);
}
