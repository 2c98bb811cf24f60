//! Engine configuration
//!
//! Tunables load from `smartreply.json` in the shared config directory; every
//! field has a default. The device's own number, used when the telephony
//! layer reports none, is taken from (in order of priority):
//! 1. Compile-time `SMARTREPLY_SELF_NUMBER` (for device-specific builds)
//! 2. The `self_number_fallback` field of the JSON file
//! 3. Runtime `SMARTREPLY_SELF_NUMBER` environment variable

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::query::{DEFAULT_MERGED_LIMIT, DEFAULT_PROVIDER_CONTEXT_LIMIT, TimelineLimits};
use crate::threads::DEFAULT_HISTORY_LIMIT;

/// Config filename in the shared config directory
const CONFIG_FILE: &str = "smartreply.json";

const SELF_NUMBER_VAR: &str = "SMARTREPLY_SELF_NUMBER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a thread listing is served from cache
    pub thread_cache_ttl_secs: u64,
    /// Messages read per thread
    pub history_limit: usize,
    /// Messages kept in a merged cross-thread history
    pub merged_limit: usize,
    /// Stored messages kept ahead of scraped ones in a timeline
    pub provider_context_limit: usize,
    pub self_number_fallback: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_cache_ttl_secs: 30,
            history_limit: DEFAULT_HISTORY_LIMIT,
            merged_limit: DEFAULT_MERGED_LIMIT,
            provider_context_limit: DEFAULT_PROVIDER_CONTEXT_LIMIT,
            self_number_fallback: None,
        }
    }
}

impl EngineConfig {
    /// Load from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let base = if ::config::config_exists(CONFIG_FILE) {
            ::config::load_json(CONFIG_FILE)?
        } else {
            Self::default()
        };
        Ok(base.with_self_number_sources())
    }

    /// Load from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let base: Self = ::config::load_json_file(path)?;
        Ok(base.with_self_number_sources())
    }

    /// Parse a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let base: Self = serde_json::from_str(json).context("Failed to parse engine config JSON")?;
        Ok(base.with_self_number_sources())
    }

    /// Self number embedded at build time
    pub fn self_number_from_compile_time() -> Option<String> {
        option_env!("SMARTREPLY_SELF_NUMBER")
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
    }

    fn self_number_from_env() -> Option<String> {
        std::env::var(SELF_NUMBER_VAR)
            .ok()
            .filter(|n| !n.trim().is_empty())
    }

    fn with_self_number_sources(mut self) -> Self {
        let from_file = self
            .self_number_fallback
            .take()
            .filter(|n| !n.trim().is_empty());
        self.self_number_fallback = Self::self_number_from_compile_time()
            .or(from_file)
            .or_else(Self::self_number_from_env);
        self
    }

    pub fn thread_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.thread_cache_ttl_secs)
    }

    pub fn timeline_limits(&self) -> TimelineLimits {
        TimelineLimits::from(self)
    }

    /// Path of the config file (~/.config/smartreply/smartreply.json)
    pub fn default_path() -> Option<PathBuf> {
        ::config::config_path(CONFIG_FILE)
    }

    /// Write the current values to the config directory
    pub fn save(&self) -> Result<()> {
        ::config::save_json(CONFIG_FILE, self)
    }
}

impl From<&EngineConfig> for TimelineLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            merged: config.merged_limit,
            provider_context: config.provider_context_limit,
        }
    }
}
