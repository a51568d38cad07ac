//! End-to-end coverage of the CLI's config discovery order: an explicit
//! `--config` flag beats `POETIQ_SYNTH_CONFIG`, which beats the default
//! search path, which falls back to built-in defaults. Exercised through
//! the `curate` subcommand (no network dependency) reading back its own
//! `data_dir` from the resolved settings.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use serial_test::serial;
use tempfile::TempDir;

fn config_pointing_at(dir: &TempDir, label: &str) -> std::path::PathBuf {
    let config_path = dir.path().join(format!("{label}.toml"));
    let data_dir = dir.path().join(format!("data-{label}"));
    std::fs::write(&config_path, format!("data_dir = \"{}\"\n", data_dir.display())).unwrap();
    config_path
}

#[test]
#[serial]
fn explicit_config_flag_overrides_environment_variable() {
    let dir = TempDir::new().unwrap();
    let flag_config = config_pointing_at(&dir, "flag");
    let env_config = config_pointing_at(&dir, "env");

    Command::cargo_bin("poetiq-synth")
        .unwrap()
        .env("POETIQ_SYNTH_CONFIG", env_config.to_str().unwrap())
        .args(["--config", flag_config.to_str().unwrap(), "--format", "json", "curate"])
        .assert()
        .success();

    assert!(dir.path().join("data-flag").exists(), "the flag-named data_dir should have been created");
    assert!(!dir.path().join("data-env").exists(), "the env-named data_dir should not have been touched");
}

#[test]
#[serial]
fn default_search_path_is_used_when_no_flag_or_env_var_is_set() {
    let dir = TempDir::new().unwrap();
    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    // SAFETY: test-only env var manipulation, serialized via `#[serial]`.
    unsafe {
        std::env::remove_var("POETIQ_SYNTH_CONFIG");
    }

    std::fs::write(dir.path().join("poetiq-synth.toml"), "data_dir = \"data-default\"\n").unwrap();

    let result = Command::cargo_bin("poetiq-synth").unwrap().args(["--format", "json", "curate"]).assert().success();

    std::env::set_current_dir(original).unwrap();
    drop(result);

    assert!(dir.path().join("data-default").exists());
}
