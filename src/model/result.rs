//! Finish results, failures and navigation targets.
//!
//! `EventResult` is what a `Finish` event carries; `NodeResult` is what a
//! node ends up storing. The two differ in exactly one place: `Derived`
//! exists only on the wire and is resolved against the node's subtree at
//! finish time, and message nodes store their severity as their result.

use crate::model::event::MessageSeverity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A position inside a file, doubling as the navigation target the
/// presentation layer is handed on selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePosition {
    /// Absolute path of the file.
    pub file: PathBuf,
    /// Zero-based start line, negative when unknown.
    pub line: i64,
    /// Zero-based start column, negative when unknown.
    pub column: i64,
}

impl FilePosition {
    pub fn new(file: impl Into<PathBuf>, line: i64, column: i64) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Position pointing at a file without a known line.
    pub fn file_only(file: impl Into<PathBuf>) -> Self {
        Self::new(file, -1, -1)
    }
}

/// One failure record attached to a `Failure` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Short message, preferred for the node title.
    pub message: Option<String>,
    /// Longer description, used when no message is present.
    pub description: Option<String>,
    /// Rendered underlying error, if any.
    pub error: Option<String>,
    /// Where to navigate to, if the failure is file-scoped.
    pub file_position: Option<FilePosition>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: FilePosition) -> Self {
        self.file_position = Some(position);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The title a failure node is displayed (and deduplicated) under:
    /// first line of message, else description, else the underlying
    /// error, else the supplied fallback.
    pub fn title(&self, fallback: &str) -> String {
        let text = self
            .message
            .as_deref()
            .or(self.description.as_deref())
            .or(self.error.as_deref())
            .unwrap_or(fallback);
        first_line(text).to_string()
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text).trim_end()
}

/// Result carried by a `Finish`/`FinishBuild` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventResult {
    Success,
    Skipped,
    Failure(Vec<Failure>),
    /// Resolved at finish time: `Failure` if any descendant is failed at
    /// that moment, else `Success`.
    Derived,
}

impl EventResult {
    pub fn failure(failures: impl Into<Vec<Failure>>) -> Self {
        Self::Failure(failures.into())
    }
}

/// Result stored on an execution node once it stops running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeResult {
    Success,
    Skipped,
    Failure(Vec<Failure>),
    /// Message nodes record their severity as their result.
    Message(MessageSeverity),
}

impl NodeResult {
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeResult::Failure(_))
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeResult::Skipped)
    }
}

impl fmt::Display for NodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeResult::Success => f.write_str("success"),
            NodeResult::Skipped => f.write_str("skipped"),
            NodeResult::Failure(failures) => write!(f, "failed ({})", failures.len()),
            NodeResult::Message(severity) => write!(f, "{severity:?}"),
        }
    }
}
