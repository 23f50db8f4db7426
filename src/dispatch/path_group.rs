//! File path grouping for message events.
//!
//! A message with a file position is not attached directly under its
//! parent: the engine materializes a chain of synthetic grouping nodes,
//! one per path segment, so diagnostics cluster by folder and file in
//! the tree. Paths render relative to the build's working directory,
//! falling back to the user home (as `~`), then to the absolute path.
//!
//! Each segment is keyed by the absolute path prefix it represents, and
//! the keys go through the tree's regular event-id map, which is what
//! makes chain reuse for repeated messages in the same file a plain
//! lookup.

use std::path::{Component, Path, PathBuf};

/// One link of a grouping chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSegment {
    /// Absolute path prefix, used as the synthetic node's event id.
    pub key: String,
    /// Display name of the segment (`~` for the user home).
    pub name: String,
    /// True for the final, file-level segment.
    pub is_file: bool,
}

/// Computes grouping chains for one build's working directory.
#[derive(Debug, Clone)]
pub struct PathGrouper {
    working_dir: PathBuf,
    home_dir: Option<PathBuf>,
}

impl PathGrouper {
    pub fn new(working_dir: impl Into<PathBuf>, home_dir: Option<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            home_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The grouping chain for `file`, outermost segment first.
    ///
    /// Returns `None` when the message should attach directly to its
    /// parent: the position is malformed (relative or empty path, no
    /// file name) or the file is the working directory itself.
    pub fn segments(&self, file: &Path) -> Option<Vec<GroupSegment>> {
        if file.as_os_str().is_empty() || !file.is_absolute() || file.file_name().is_none() {
            return None;
        }
        if file == self.working_dir {
            return None;
        }

        if !self.working_dir.as_os_str().is_empty() {
            if let Ok(rel) = file.strip_prefix(&self.working_dir) {
                return Some(Self::chain(self.working_dir.clone(), rel, None));
            }
        }
        if let Some(home) = &self.home_dir {
            if let Ok(rel) = file.strip_prefix(home) {
                return Some(Self::chain(home.clone(), rel, Some("~")));
            }
        }
        // Absolute fallback: chain from the filesystem root.
        let rel: PathBuf = file
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        Some(Self::chain(PathBuf::from("/"), &rel, Some("/")))
    }

    fn chain(base: PathBuf, rel: &Path, base_name: Option<&str>) -> Vec<GroupSegment> {
        let mut segments = Vec::new();
        if let Some(name) = base_name {
            segments.push(GroupSegment {
                key: base.to_string_lossy().into_owned(),
                name: name.to_string(),
                is_file: false,
            });
        }
        let mut acc = base;
        for component in rel.components() {
            acc.push(component);
            segments.push(GroupSegment {
                key: acc.to_string_lossy().into_owned(),
                name: component.as_os_str().to_string_lossy().into_owned(),
                is_file: false,
            });
        }
        if let Some(last) = segments.last_mut() {
            last.is_file = true;
        }
        segments
    }
}
