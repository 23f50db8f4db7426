//! Build descriptors.

use crate::model::id::BuildId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Describes one tracked build: identity, title and the working directory
/// used for message path-grouping and the eviction policy. Process
/// handles, execution filters and restart actions stay with the owning
/// presentation layer; the engine never touches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub id: BuildId,
    /// Human-readable title, applied to the build-progress root.
    pub title: String,
    /// Working directory of the build process.
    pub working_dir: PathBuf,
    /// Epoch milliseconds when the build was launched.
    pub start_time_ms: i64,
}

impl BuildDescriptor {
    pub fn new(
        id: impl Into<BuildId>,
        title: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            working_dir: working_dir.into(),
            start_time_ms: 0,
        }
    }

    pub fn at(mut self, start_time_ms: i64) -> Self {
        self.start_time_ms = start_time_ms;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
