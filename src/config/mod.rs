//! Engine configuration.
//!
//! Tuning knobs for behavior the source system treated as UX policy:
//! whether the first error also navigates the editor, whether message
//! text is echoed into the parent console, and the recency threshold of
//! the build eviction heuristic. Persisted as TOML at an explicit path;
//! the embedder decides where that lives.

use crate::error::{BuildVisError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the aggregation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the first-error selection also asks the presenter to
    /// navigate to the error's file position.
    pub navigate_to_first_error: bool,

    /// Whether a message's rendered text is echoed (with a newline) into
    /// its parent's console when the parent is not the build-progress
    /// root.
    pub echo_to_parent: bool,

    /// How recently a build must have finished to be considered "just
    /// finished" by the eviction policy (milliseconds).
    pub recent_finish_threshold_ms: u64,

    /// Override for the user home directory used when relativizing
    /// message file paths. Falls back to `$HOME` / `%USERPROFILE%`.
    pub home_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            navigate_to_first_error: false,
            echo_to_parent: true,
            recent_finish_threshold_ms: 1_000,
            home_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent_finish_threshold(&self) -> Duration {
        Duration::from_millis(self.recent_finish_threshold_ms)
    }

    /// The user home directory used for path relativization.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir.clone().or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
        })
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| BuildVisError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text =
            toml::to_string_pretty(self).map_err(|e| BuildVisError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
