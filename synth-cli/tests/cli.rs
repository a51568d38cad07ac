//! Smoke tests for the `poetiq-synth` binary's argument parsing and
//! status/curate error paths, independent of a live inference backend.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_every_subcommand() {
    Command::cargo_bin("poetiq-synth")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-task"))
        .stdout(predicate::str::contains("loop"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("curate"));
}

#[test]
fn status_without_a_checkpoint_fails_with_a_clear_message() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("poetiq-synth.toml");
    std::fs::write(&config_path, format!("data_dir = \"{}\"\n", dir.path().join("data").display())).unwrap();

    Command::cargo_bin("poetiq-synth")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no checkpoint"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    Command::cargo_bin("poetiq-synth").unwrap().arg("bogus-command").assert().failure();
}
