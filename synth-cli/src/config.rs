//! Configuration loading: file formats, default search locations, and the
//! `POETIQ_SYNTH_CONFIG` environment override, mirroring the dispatch the
//! rest of this workspace's CLIs use for their own settings files.
//!
//! Per-field environment overrides (`POETIQ_SYNTH_BACKEND_URL`, etc.) are
//! applied afterwards by [`poetiq_synth_core::Settings::with_env_overrides`];
//! this module only resolves *which file* to read and in *which format*.

use std::path::{Path, PathBuf};

use anyhow::Context;
use poetiq_synth_core::Settings;

const DEFAULT_PATHS: &[&str] =
    &["poetiq-synth.toml", "poetiq-synth.json", "poetiq-synth.yaml", ".poetiq-synth.toml", ".poetiq-synth.json", ".poetiq-synth.yaml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

fn detect_format(path: &Path) -> anyhow::Result<ConfigFormat> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => Ok(ConfigFormat::Toml),
        Some("json") => Ok(ConfigFormat::Json),
        Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
        other => anyhow::bail!("unsupported config file extension: {other:?}"),
    }
}

fn parse_content(format: ConfigFormat, content: &str) -> anyhow::Result<Settings> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).context("failed to parse TOML config"),
        ConfigFormat::Json => serde_json::from_str(content).context("failed to parse JSON config"),
        ConfigFormat::Yaml => serde_yaml::from_str(content).context("failed to parse YAML config"),
    }
}

fn load_from_path(path: &Path) -> anyhow::Result<Settings> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config file: {}", path.display()))?;
    let format = detect_format(path)?;
    parse_content(format, &content)
}

/// Try `POETIQ_SYNTH_CONFIG`, then each of [`DEFAULT_PATHS`] in order.
fn discover_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("POETIQ_SYNTH_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "POETIQ_SYNTH_CONFIG points to a non-existent file");
    }
    DEFAULT_PATHS.iter().map(Path::new).find(|p| p.exists()).map(Path::to_path_buf)
}

/// Load settings from `path`, or (when `path` is `None`) from
/// `POETIQ_SYNTH_CONFIG` or a default search path, falling back to
/// [`Settings::default`] if nothing is found. Per-field `POETIQ_SYNTH_*`
/// environment overrides are always applied last.
///
/// # Errors
/// Propagates a read or parse failure for an explicitly-named or
/// discovered config file. A missing default file is not an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => load_from_path(path)?,
        None => match discover_path() {
            Some(path) => load_from_path(&path)?,
            None => Settings::default(),
        },
    };
    Ok(settings.with_env_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_path_is_an_error() {
        assert!(load_from_path(Path::new("/nonexistent/poetiq-synth.toml")).is_err());
    }

    #[test]
    fn toml_round_trip_overrides_backend_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "backend_url = \"http://example.invalid:9000\"\n").unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.backend_url, "http://example.invalid:9000");
    }

    #[test]
    #[serial_test::serial]
    fn no_path_and_no_default_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        // SAFETY: test-only env var manipulation, serialized via `#[serial]`.
        unsafe {
            std::env::remove_var("POETIQ_SYNTH_CONFIG");
        }
        let settings = load_settings(None).unwrap();
        std::env::set_current_dir(original).unwrap();
        assert_eq!(settings.backend_url, Settings::default().backend_url);
    }
}
