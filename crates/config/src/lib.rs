//! Shared config directory for smartreply binaries
//!
//! Files live in `~/.config/smartreply/`, or in `$SMARTREPLY_CONFIG_DIR`
//! when set (handy on devices without a home directory).
//!
//! Call [`init`] at startup to create the directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

const DIR_NAME: &str = "smartreply";
const DIR_OVERRIDE_VAR: &str = "SMARTREPLY_CONFIG_DIR";

/// Create the config directory if needed and return it
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

pub fn config_dir() -> Option<PathBuf> {
    match std::env::var_os(DIR_OVERRIDE_VAR) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|p| p.join(DIR_NAME)),
    }
}

pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Parse a JSON file at any path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.is_file())
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Write `value` as pretty JSON into the config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let path = ensure_config_dir()?.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let Some(path) = config_path("engine.json") else {
            return;
        };
        assert!(path.ends_with("engine.json"));
        if std::env::var_os(DIR_OVERRIDE_VAR).is_none() {
            assert!(path.parent().unwrap().ends_with(DIR_NAME));
        }
    }

    #[test]
    fn test_load_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_json_file::<serde_json::Value>(&missing).is_err());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        let err = load_json_file::<serde_json::Value>(&broken).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
